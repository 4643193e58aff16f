//! On-disk formats.
//!
//! - [`codec_util`]: versioned headers and checksum footers.
//! - [`for_util`]: bit packing of fixed-size integer blocks.
//! - [`postings`]: document/frequency lists built on [`for_util`].
//! - [`blocktree`]: the block-tree term dictionary with an FST prefix index.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::QuiverError;

pub mod blocktree;
pub mod codec_util;
pub mod for_util;
pub mod postings;

/// Postings encodings understood by the term dictionary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostingsFormat {
    /// Doc deltas and freqs bit-packed in blocks of 128, vint tail.
    #[default]
    Block,
}

impl PostingsFormat {
    pub fn name(&self) -> &'static str {
        match self {
            PostingsFormat::Block => "QuiverBlockPostings",
        }
    }
}

impl fmt::Display for PostingsFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PostingsFormat {
    type Err = QuiverError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "QuiverBlockPostings" => Ok(PostingsFormat::Block),
            other => Err(QuiverError::corruption(
                "postings format",
                format!("unknown postings format {other}"),
            )),
        }
    }
}
