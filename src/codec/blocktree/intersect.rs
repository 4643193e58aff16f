//! Enumerating the terms of a dictionary accepted by an automaton.

use std::borrow::Cow;

use crate::automaton::ByteRunAutomaton;
use crate::codec::blocktree::reader::BlockTreeTermsEnum;
use crate::codec::blocktree::{Block, BlockEntry, BlockTreeTermsReader, FloorBlock};
use crate::codec::postings::TermMeta;
use crate::error::{QuiverError, Result};
use crate::index::{PostingsEnum, SeekStatus, TermsEnum};

/// What an [`IntersectTermsEnum`] accepts.
#[derive(Debug, Clone)]
pub enum Matcher<'a> {
    /// Every term.
    All,
    /// Terms the run automaton accepts.
    Run(Cow<'a, ByteRunAutomaton>),
}

impl<'a> Matcher<'a> {
    pub fn run(automaton: &'a ByteRunAutomaton) -> Self {
        Matcher::Run(Cow::Borrowed(automaton))
    }

    fn initial_state(&self) -> Option<usize> {
        match self {
            Matcher::All => Some(0),
            Matcher::Run(r) => {
                let s = r.initial_state();
                (r.num_states() > 0 && r.is_live(s)).then_some(s)
            }
        }
    }

    /// Live state after reading `bytes` from `state`.
    fn step(&self, state: usize, bytes: &[u8]) -> Option<usize> {
        match self {
            Matcher::All => Some(state),
            Matcher::Run(r) => r.run_from(state, bytes).filter(|&s| r.is_live(s)),
        }
    }

    fn is_accept(&self, state: usize) -> bool {
        match self {
            Matcher::All => true,
            Matcher::Run(r) => r.is_accept(state),
        }
    }

    /// Smallest byte `>= from` that keeps the automaton alive.
    fn next_live_label(&self, state: usize, from: u8) -> Option<u8> {
        match self {
            Matcher::All => Some(from),
            Matcher::Run(r) => r.next_live_label(state, from as u32),
        }
    }
}

#[derive(Debug)]
struct Frame {
    prefix_len: usize,
    /// Automaton state after the frame's prefix.
    state: usize,
    block: Block,
    next: usize,
    floor: Vec<FloorBlock>,
    /// Index into `floor` of the loaded block; `None` for the first block.
    floor_idx: Option<usize>,
}

/// Terms of a dictionary accepted by a deterministic byte automaton, in
/// order.
///
/// The walk follows the block tree depth first and feeds each suffix to the
/// automaton from the state reached by the block's prefix. Sub-blocks whose
/// prefix leaves the automaton dead are never read, and floor blocks whose
/// lead byte range has no live transition are skipped.
#[derive(Debug)]
pub struct IntersectTermsEnum<'a> {
    reader: &'a BlockTreeTermsReader,
    matcher: Matcher<'a>,
    start_term: Option<Vec<u8>>,
    stack: Vec<Frame>,
    term: Vec<u8>,
    meta: TermMeta,
    started: bool,
    positioned: bool,
}

impl<'a> IntersectTermsEnum<'a> {
    /// Terms matching `matcher` that sort after `start_term`.
    pub fn new(
        reader: &'a BlockTreeTermsReader,
        matcher: Matcher<'a>,
        start_term: Option<&[u8]>,
    ) -> Self {
        IntersectTermsEnum {
            reader,
            matcher,
            start_term: start_term.map(<[u8]>::to_vec),
            stack: Vec::new(),
            term: Vec::new(),
            meta: TermMeta::default(),
            started: false,
            positioned: false,
        }
    }

    /// Intersect with an arbitrary automaton, which must be deterministic.
    pub fn from_automaton(
        reader: &'a BlockTreeTermsReader,
        automaton: &crate::automaton::Automaton,
        start_term: Option<&[u8]>,
    ) -> Result<Self> {
        let run = ByteRunAutomaton::new(automaton)?;
        Ok(Self::new(reader, Matcher::Run(Cow::Owned(run)), start_term))
    }

    /// Push the group whose first block is at `fp`.
    fn push_group(&mut self, prefix_len: usize, state: usize, fp: u64) -> Result<()> {
        let block = self.reader.block(fp)?;
        let floor = if block.is_last_in_floor {
            Vec::new()
        } else {
            let output = self.reader.block_output(&self.term[..prefix_len])?;
            if output.floor.is_empty() || output.fp != fp {
                return Err(QuiverError::corruption(
                    self.reader.segment(),
                    format!("floor block at {fp} has no matching index entry"),
                ));
            }
            output.floor
        };
        self.stack.push(Frame {
            prefix_len,
            state,
            block,
            next: 0,
            floor,
            floor_idx: None,
        });
        Ok(())
    }

    /// Load the next floor block of the top frame the automaton can enter.
    fn next_floor_block(&mut self) -> Result<bool> {
        let reader = self.reader;
        let Some(top) = self.stack.last_mut() else {
            return Ok(false);
        };
        let from = top.floor_idx.map_or(0, |i| i + 1);
        let Some(first) = top.floor.get(from) else {
            return Ok(false);
        };
        let Some(label) = self.matcher.next_live_label(top.state, first.lead) else {
            return Ok(false);
        };
        // jump to the block whose lead range holds the label
        let k = from + top.floor[from..].partition_point(|f| f.lead <= label).saturating_sub(1);
        top.block = reader.block(top.floor[k].fp)?;
        top.floor_idx = Some(k);
        top.next = 0;
        Ok(true)
    }

    /// Whether no term below `prefix` can sort after the start term.
    fn before_start(&self, prefix: &[u8]) -> bool {
        self.start_term
            .as_deref()
            .is_some_and(|start| prefix < start && !start.starts_with(prefix))
    }
}

impl TermsEnum for IntersectTermsEnum<'_> {
    fn next(&mut self) -> Result<Option<&[u8]>> {
        if !self.started {
            self.started = true;
            let reader = self.reader;
            if let (Some(root), Some(state)) = (reader.root(), self.matcher.initial_state()) {
                self.term.clear();
                self.push_group(0, state, root.fp)?;
            }
        }
        loop {
            let Some(top) = self.stack.last_mut() else {
                self.term.clear();
                self.positioned = false;
                return Ok(None);
            };
            if top.next == top.block.entries.len() {
                if !self.next_floor_block()? {
                    self.stack.pop();
                }
                continue;
            }
            let idx = top.next;
            top.next += 1;
            let entry = &top.block.entries[idx];
            let Some(state) = self.matcher.step(top.state, entry.suffix()) else {
                continue;
            };
            self.term.truncate(top.prefix_len);
            self.term.extend_from_slice(entry.suffix());
            match entry {
                BlockEntry::Term { meta, .. } => {
                    if !self.matcher.is_accept(state) {
                        continue;
                    }
                    if let Some(start) = &self.start_term
                        && self.term.as_slice() <= start.as_slice()
                    {
                        continue;
                    }
                    self.meta = *meta;
                    self.positioned = true;
                    return Ok(Some(&self.term));
                }
                BlockEntry::Block { fp, .. } => {
                    let fp = *fp;
                    if self.before_start(&self.term) {
                        continue;
                    }
                    let len = self.term.len();
                    self.push_group(len, state, fp)?;
                }
            }
        }
    }

    fn seek_ceil(&mut self, _target: &[u8]) -> Result<SeekStatus> {
        Err(QuiverError::invalid_operation("intersect enums cannot seek"))
    }

    fn seek_exact(&mut self, _target: &[u8]) -> Result<bool> {
        Err(QuiverError::invalid_operation("intersect enums cannot seek"))
    }

    fn term(&self) -> &[u8] {
        &self.term
    }

    fn doc_freq(&self) -> u32 {
        self.meta.doc_freq
    }

    fn total_term_freq(&self) -> u64 {
        self.meta.total_term_freq
    }

    fn postings(&self) -> Result<Box<dyn PostingsEnum>> {
        if !self.positioned {
            return Err(QuiverError::invalid_operation("terms enum is not positioned on a term"));
        }
        Ok(Box::new(self.reader.postings_reader().postings(&self.meta)?))
    }
}

/// The one term of a single-string automaton, found by exact lookup.
#[derive(Debug)]
pub struct SingleTermsEnum<'a> {
    inner: BlockTreeTermsEnum<'a>,
    target: Vec<u8>,
    start_term: Option<Vec<u8>>,
    done: bool,
}

impl<'a> SingleTermsEnum<'a> {
    pub fn new(reader: &'a BlockTreeTermsReader, term: &[u8], start_term: Option<&[u8]>) -> Self {
        SingleTermsEnum {
            inner: reader.terms_enum(),
            target: term.to_vec(),
            start_term: start_term.map(<[u8]>::to_vec),
            done: false,
        }
    }
}

impl TermsEnum for SingleTermsEnum<'_> {
    fn next(&mut self) -> Result<Option<&[u8]>> {
        if self.done {
            return Ok(None);
        }
        self.done = true;
        if self
            .start_term
            .as_deref()
            .is_some_and(|start| self.target.as_slice() <= start)
        {
            return Ok(None);
        }
        if self.inner.seek_exact(&self.target)? {
            Ok(Some(self.inner.term()))
        } else {
            Ok(None)
        }
    }

    fn seek_ceil(&mut self, _target: &[u8]) -> Result<SeekStatus> {
        Err(QuiverError::invalid_operation("intersect enums cannot seek"))
    }

    fn seek_exact(&mut self, _target: &[u8]) -> Result<bool> {
        Err(QuiverError::invalid_operation("intersect enums cannot seek"))
    }

    fn term(&self) -> &[u8] {
        self.inner.term()
    }

    fn doc_freq(&self) -> u32 {
        self.inner.doc_freq()
    }

    fn total_term_freq(&self) -> u64 {
        self.inner.total_term_freq()
    }

    fn postings(&self) -> Result<Box<dyn PostingsEnum>> {
        self.inner.postings()
    }
}
