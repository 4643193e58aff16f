//! In-memory inverted index.
//!
//! Documents are buffered as term -> posting list maps and flushed to a
//! block-tree segment with [`InvertedIndex::write_segment`]. The buffer also
//! implements [`Terms`] directly, which makes it a convenient reference when
//! checking an on-disk segment.

use std::sync::Arc;

use ahash::AHashMap;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::automaton::CompiledAutomaton;
use crate::codec::blocktree::{BlockTreeTermsWriter, TermsMeta};
use crate::config::BlockTreeConfig;
use crate::error::{QuiverError, Result};
use crate::index::{NO_MORE_DOCS, PostingsEnum, SeekStatus, SlicePostingsEnum, Terms, TermsEnum};
use crate::storage::Storage;

/// A single posting in a posting list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Posting {
    pub doc_id: u32,
    /// Occurrences of the term in the document.
    pub freq: u32,
}

/// Postings of one term, sorted by document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostingList {
    pub term: Vec<u8>,
    pub postings: Vec<Posting>,
    pub total_term_freq: u64,
}

impl PostingList {
    pub fn new(term: Vec<u8>) -> Self {
        PostingList {
            term,
            postings: Vec::new(),
            total_term_freq: 0,
        }
    }

    /// Add a posting, merging it into an existing one for the same
    /// document.
    pub fn add_posting(&mut self, posting: Posting) {
        self.total_term_freq += posting.freq as u64;
        match self
            .postings
            .binary_search_by_key(&posting.doc_id, |p| p.doc_id)
        {
            Ok(pos) => self.postings[pos].freq += posting.freq,
            Err(pos) => self.postings.insert(pos, posting),
        }
    }

    pub fn doc_freq(&self) -> u32 {
        self.postings.len() as u32
    }

    pub fn len(&self) -> usize {
        self.postings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.postings.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Posting> {
        self.postings.iter()
    }

    fn pairs(&self) -> Vec<(u32, u32)> {
        self.postings.iter().map(|p| (p.doc_id, p.freq)).collect()
    }
}

/// Buffered documents of a segment under construction.
#[derive(Debug, Default)]
pub struct InvertedIndex {
    terms: AHashMap<Vec<u8>, PostingList>,
    max_doc: u32,
    docs: u32,
}

impl InvertedIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `freq` occurrences of `term` in `doc_id`.
    pub fn add_posting(&mut self, term: &[u8], doc_id: u32, freq: u32) -> Result<()> {
        if freq == 0 {
            return Err(QuiverError::invalid_operation(format!(
                "posting for doc {doc_id} has frequency 0"
            )));
        }
        check_doc_id(doc_id)?;
        match self.terms.get_mut(term) {
            Some(list) => list.add_posting(Posting { doc_id, freq }),
            None => {
                let mut list = PostingList::new(term.to_vec());
                list.add_posting(Posting { doc_id, freq });
                self.terms.insert(term.to_vec(), list);
            }
        }
        self.max_doc = self.max_doc.max(doc_id + 1);
        Ok(())
    }

    /// Index the tokens of one document; repeated tokens raise the
    /// frequency.
    pub fn add_document<I, T>(&mut self, doc_id: u32, tokens: I) -> Result<()>
    where
        I: IntoIterator<Item = T>,
        T: AsRef<[u8]>,
    {
        check_doc_id(doc_id)?;
        let mut freqs: AHashMap<Vec<u8>, u32> = AHashMap::new();
        for token in tokens {
            *freqs.entry(token.as_ref().to_vec()).or_insert(0) += 1;
        }
        for (term, freq) in freqs {
            self.add_posting(&term, doc_id, freq)?;
        }
        self.max_doc = self.max_doc.max(doc_id + 1);
        self.docs += 1;
        Ok(())
    }

    pub fn get(&self, term: &[u8]) -> Option<&PostingList> {
        self.terms.get(term)
    }

    pub fn term_count(&self) -> usize {
        self.terms.len()
    }

    /// One past the largest document id seen.
    pub fn max_doc(&self) -> u32 {
        self.max_doc
    }

    /// Documents added through [`InvertedIndex::add_document`].
    pub fn num_docs(&self) -> u32 {
        self.docs
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Posting lists in term order.
    pub fn sorted_lists(&self) -> Vec<&PostingList> {
        let mut lists: Vec<&PostingList> = self.terms.values().collect();
        lists.sort_unstable_by(|a, b| a.term.cmp(&b.term));
        lists
    }

    /// Flush the buffer as segment `segment`.
    pub fn write_segment(
        &self,
        storage: Arc<dyn Storage>,
        segment: &str,
        config: &BlockTreeConfig,
    ) -> Result<TermsMeta> {
        let mut writer = BlockTreeTermsWriter::new(storage, segment, self.max_doc, config)?;
        for list in self.sorted_lists() {
            writer.start_term(&list.term)?;
            for posting in list.iter() {
                writer.add_doc(posting.doc_id, posting.freq)?;
            }
            writer.finish_term()?;
        }
        let meta = writer.finish()?;
        debug!(
            "flushed {} terms of {} docs to segment {segment}",
            meta.num_terms, self.max_doc
        );
        Ok(meta)
    }
}

impl Terms for InvertedIndex {
    fn iterator(&self) -> Result<Box<dyn TermsEnum + '_>> {
        Ok(Box::new(MemoryTermsEnum::new(self.sorted_lists())))
    }

    fn intersect(
        &self,
        compiled: &CompiledAutomaton,
        start_term: Option<&[u8]>,
    ) -> Result<Box<dyn TermsEnum + '_>> {
        let lists = self
            .sorted_lists()
            .into_iter()
            .filter(|l| start_term.is_none_or(|start| l.term.as_slice() > start))
            .filter(|l| compiled.matches(&l.term))
            .collect();
        Ok(Box::new(MemoryTermsEnum::new(lists)))
    }

    fn size(&self) -> u64 {
        self.terms.len() as u64
    }

    fn sum_doc_freq(&self) -> u64 {
        self.terms.values().map(|l| l.len() as u64).sum()
    }

    fn sum_total_term_freq(&self) -> u64 {
        self.terms.values().map(|l| l.total_term_freq).sum()
    }

    fn doc_count(&self) -> u32 {
        let mut docs: Vec<u32> = self
            .terms
            .values()
            .flat_map(|l| l.iter().map(|p| p.doc_id))
            .collect();
        docs.sort_unstable();
        docs.dedup();
        docs.len() as u32
    }
}

/// Cursor over a sorted slice of posting lists.
#[derive(Debug)]
pub struct MemoryTermsEnum<'a> {
    lists: Vec<&'a PostingList>,
    pos: Option<usize>,
}

impl<'a> MemoryTermsEnum<'a> {
    fn new(lists: Vec<&'a PostingList>) -> Self {
        MemoryTermsEnum { lists, pos: None }
    }

    fn current(&self) -> Option<&'a PostingList> {
        self.pos.and_then(|i| self.lists.get(i).copied())
    }
}

impl TermsEnum for MemoryTermsEnum<'_> {
    fn next(&mut self) -> Result<Option<&[u8]>> {
        let next = self.pos.map_or(0, |i| (i + 1).min(self.lists.len()));
        self.pos = Some(next);
        Ok(self.current().map(|l| l.term.as_slice()))
    }

    fn seek_ceil(&mut self, target: &[u8]) -> Result<SeekStatus> {
        let idx = self.lists.partition_point(|l| l.term.as_slice() < target);
        self.pos = Some(idx);
        Ok(match self.lists.get(idx) {
            Some(l) if l.term == target => SeekStatus::Found,
            Some(_) => SeekStatus::NotFound,
            None => SeekStatus::End,
        })
    }

    fn seek_exact(&mut self, target: &[u8]) -> Result<bool> {
        Ok(self.seek_ceil(target)? == SeekStatus::Found)
    }

    fn term(&self) -> &[u8] {
        self.current().map(|l| l.term.as_slice()).unwrap_or_default()
    }

    fn doc_freq(&self) -> u32 {
        self.current().map_or(0, PostingList::doc_freq)
    }

    fn total_term_freq(&self) -> u64 {
        self.current().map_or(0, |l| l.total_term_freq)
    }

    fn postings(&self) -> Result<Box<dyn PostingsEnum>> {
        let list = self
            .current()
            .ok_or_else(|| QuiverError::invalid_operation("terms enum is not positioned on a term"))?;
        Ok(Box::new(SlicePostingsEnum::new(list.pairs())))
    }
}

fn check_doc_id(doc_id: u32) -> Result<()> {
    if doc_id == NO_MORE_DOCS {
        return Err(QuiverError::invalid_operation(format!("doc id {doc_id} is reserved")));
    }
    Ok(())
}
