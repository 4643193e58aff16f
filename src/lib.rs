//! # Quiver
//!
//! Term dictionary machinery for full-text search: finite automata over
//! Unicode code points, a minimal finite state transducer, a frame of
//! reference postings codec and a block-tree terms dictionary that can be
//! walked in order, seeked, or intersected with an automaton.
//!
//! ```
//! use std::sync::Arc;
//!
//! use quiver::automaton::CompiledAutomaton;
//! use quiver::codec::blocktree::BlockTreeTermsReader;
//! use quiver::config::CodecConfig;
//! use quiver::index::inverted::InvertedIndex;
//! use quiver::index::{Terms, collect_terms};
//! use quiver::storage::memory::MemoryStorage;
//!
//! let config = CodecConfig::default();
//! let storage = Arc::new(MemoryStorage::default());
//!
//! let mut index = InvertedIndex::new();
//! index.add_document(0, ["quick", "brown", "fox"]).unwrap();
//! index.add_document(1, ["quiet", "fox"]).unwrap();
//! index.write_segment(storage.clone(), "_0", &config.block_tree).unwrap();
//!
//! let reader = BlockTreeTermsReader::open(storage.as_ref(), "_0").unwrap();
//! let pattern = CompiledAutomaton::from_regex("qui.*", 10_000).unwrap();
//! let mut matches = reader.intersect(&pattern, None).unwrap();
//! let terms: Vec<String> = collect_terms(matches.as_mut())
//!     .unwrap()
//!     .into_iter()
//!     .map(|t| t.term_lossy())
//!     .collect();
//! assert_eq!(terms, ["quick", "quiet"]);
//! ```

pub mod automaton;
pub mod cli;
pub mod codec;
pub mod config;
pub mod error;
pub mod fst;
pub mod index;
pub mod storage;
pub mod util;

pub mod prelude {
    pub use crate::automaton::{Automaton, CompiledAutomaton};
    pub use crate::codec::blocktree::{BlockTreeTermsReader, BlockTreeTermsWriter};
    pub use crate::config::CodecConfig;
    pub use crate::error::{QuiverError, Result};
    pub use crate::fst::{Fst, FstBuilder};
    pub use crate::index::{PostingsEnum, Terms, TermsEnum};
    pub use crate::storage::Storage;
}

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
