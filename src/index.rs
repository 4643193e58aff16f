//! Term dictionary and postings access traits.
//!
//! A segment exposes its dictionary as [`Terms`]. Cursors over the terms
//! implement [`TermsEnum`]; the documents of one term are read through a
//! [`PostingsEnum`]. The BlockTree codec in [`crate::codec::blocktree`] is
//! the on-disk implementation; [`inverted::InvertedIndex`] buffers documents
//! in memory until they are flushed to a segment, and [`merge`] combines
//! segments.

use std::fmt::Debug;

use serde::{Deserialize, Serialize};

use crate::automaton::CompiledAutomaton;
use crate::error::Result;

pub mod inverted;
pub mod merge;

/// Returned by [`PostingsEnum`] once the documents are exhausted.
pub const NO_MORE_DOCS: u32 = u32::MAX;

/// Iterates the documents of one term in increasing id order.
pub trait PostingsEnum: Send + Debug {
    /// The current document, `NO_MORE_DOCS` after exhaustion. Undefined
    /// before the first call to [`PostingsEnum::next_doc`] or
    /// [`PostingsEnum::advance`].
    fn doc_id(&self) -> u32;

    /// Occurrences of the term in the current document.
    fn freq(&self) -> u32;

    /// Move to the next document.
    fn next_doc(&mut self) -> Result<u32>;

    /// Move to the first document `>= target`.
    fn advance(&mut self, target: u32) -> Result<u32>;

    /// Upper bound on the number of documents.
    fn cost(&self) -> u64;
}

/// Result of [`TermsEnum::seek_ceil`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekStatus {
    /// The enum is on the target term.
    Found,
    /// The enum is on the smallest term greater than the target.
    NotFound,
    /// Every term is smaller than the target.
    End,
}

/// A term with its statistics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermStats {
    pub term: Vec<u8>,
    pub doc_freq: u32,
    pub total_term_freq: u64,
}

impl TermStats {
    /// The term as text, with invalid UTF-8 replaced.
    pub fn term_lossy(&self) -> String {
        String::from_utf8_lossy(&self.term).into_owned()
    }
}

/// A cursor over terms in byte order.
pub trait TermsEnum {
    /// Advance to the next term; `None` once exhausted.
    fn next(&mut self) -> Result<Option<&[u8]>>;

    /// Position on the smallest term `>= target`.
    fn seek_ceil(&mut self, target: &[u8]) -> Result<SeekStatus>;

    /// Position on `target` if it exists. On `false` the position is
    /// unspecified.
    fn seek_exact(&mut self, target: &[u8]) -> Result<bool>;

    /// The current term.
    fn term(&self) -> &[u8];

    fn doc_freq(&self) -> u32;

    fn total_term_freq(&self) -> u64;

    /// Documents of the current term.
    fn postings(&self) -> Result<Box<dyn PostingsEnum>>;

    fn term_stats(&self) -> TermStats {
        TermStats {
            term: self.term().to_vec(),
            doc_freq: self.doc_freq(),
            total_term_freq: self.total_term_freq(),
        }
    }
}

/// The terms of one segment.
pub trait Terms {
    /// A cursor over every term.
    fn iterator(&self) -> Result<Box<dyn TermsEnum + '_>>;

    /// A cursor over the terms accepted by `compiled` that sort after
    /// `start_term` (exclusive).
    fn intersect(
        &self,
        compiled: &CompiledAutomaton,
        start_term: Option<&[u8]>,
    ) -> Result<Box<dyn TermsEnum + '_>>;

    /// Number of distinct terms.
    fn size(&self) -> u64;

    fn sum_doc_freq(&self) -> u64;

    fn sum_total_term_freq(&self) -> u64;

    /// Number of documents with at least one term.
    fn doc_count(&self) -> u32;
}

/// Collect every term of `terms_enum` with its statistics.
pub fn collect_terms(terms_enum: &mut dyn TermsEnum) -> Result<Vec<TermStats>> {
    let mut out = Vec::new();
    while terms_enum.next()?.is_some() {
        out.push(terms_enum.term_stats());
    }
    Ok(out)
}

/// Collect `(doc, freq)` pairs of a postings cursor.
pub fn collect_postings(postings: &mut dyn PostingsEnum) -> Result<Vec<(u32, u32)>> {
    let mut out = Vec::new();
    loop {
        let doc = postings.next_doc()?;
        if doc == NO_MORE_DOCS {
            return Ok(out);
        }
        out.push((doc, postings.freq()));
    }
}

/// A [`TermsEnum`] with no terms.
#[derive(Debug, Default)]
pub struct EmptyTermsEnum;

impl TermsEnum for EmptyTermsEnum {
    fn next(&mut self) -> Result<Option<&[u8]>> {
        Ok(None)
    }

    fn seek_ceil(&mut self, _target: &[u8]) -> Result<SeekStatus> {
        Ok(SeekStatus::End)
    }

    fn seek_exact(&mut self, _target: &[u8]) -> Result<bool> {
        Ok(false)
    }

    fn term(&self) -> &[u8] {
        &[]
    }

    fn doc_freq(&self) -> u32 {
        0
    }

    fn total_term_freq(&self) -> u64 {
        0
    }

    fn postings(&self) -> Result<Box<dyn PostingsEnum>> {
        Ok(Box::new(SlicePostingsEnum::new(Vec::new())))
    }
}

/// Postings held in memory.
#[derive(Debug, Clone)]
pub struct SlicePostingsEnum {
    postings: Vec<(u32, u32)>,
    // index of the current posting; len when exhausted
    idx: Option<usize>,
}

impl SlicePostingsEnum {
    /// `postings` must be sorted by doc id.
    pub fn new(postings: Vec<(u32, u32)>) -> Self {
        SlicePostingsEnum { postings, idx: None }
    }
}

impl PostingsEnum for SlicePostingsEnum {
    fn doc_id(&self) -> u32 {
        match self.idx {
            Some(i) => self.postings.get(i).map_or(NO_MORE_DOCS, |p| p.0),
            None => 0,
        }
    }

    fn freq(&self) -> u32 {
        self.idx
            .and_then(|i| self.postings.get(i))
            .map_or(0, |p| p.1)
    }

    fn next_doc(&mut self) -> Result<u32> {
        let next = self.idx.map_or(0, |i| (i + 1).min(self.postings.len()));
        self.idx = Some(next);
        Ok(self.doc_id())
    }

    fn advance(&mut self, target: u32) -> Result<u32> {
        let from = match self.idx {
            Some(_) if self.doc_id() >= target => return Ok(self.doc_id()),
            Some(i) => i + 1,
            None => 0,
        };
        let from = from.min(self.postings.len());
        let skip = self.postings[from..].partition_point(|p| p.0 < target);
        self.idx = Some(from + skip);
        Ok(self.doc_id())
    }

    fn cost(&self) -> u64 {
        self.postings.len() as u64
    }
}
