//! Reading a block-tree dictionary.

use std::borrow::Cow;
use std::sync::Arc;

use log::debug;

use crate::automaton::{AutomatonKind, ByteRunAutomaton, CompiledAutomaton};
use crate::codec::blocktree::intersect::{IntersectTermsEnum, Matcher, SingleTermsEnum};
use crate::codec::blocktree::{
    Block, BlockEntry, BlockOutput, INDEX_CODEC, INDEX_EXTENSION, META_CODEC, META_EXTENSION,
    TERMS_CODEC, TERMS_EXTENSION, TermsMeta, VERSION, file_name, read_block,
};
use crate::codec::codec_util::{self, FOOTER_LENGTH};
use crate::codec::postings::{DOC_EXTENSION, PostingsReader, TermMeta};
use crate::error::{QuiverError, Result};
use crate::fst::Fst;
use crate::index::{EmptyTermsEnum, PostingsEnum, SeekStatus, TermStats, Terms, TermsEnum};
use crate::storage::{Storage, read_file};

/// An opened segment dictionary. Cheap to share between threads; every
/// cursor reads the same immutable buffers.
#[derive(Debug)]
pub struct BlockTreeTermsReader {
    segment: String,
    terms_name: String,
    terms: Arc<[u8]>,
    index: Fst<Vec<u8>>,
    postings: PostingsReader,
    meta: TermsMeta,
    root: Option<BlockOutput>,
}

impl BlockTreeTermsReader {
    /// Open and verify the files of `segment`.
    pub fn open(storage: &dyn Storage, segment: &str) -> Result<Self> {
        let meta_name = file_name(segment, META_EXTENSION);
        let meta_data = read_file(storage, &meta_name)?;
        let (_, mut body) =
            codec_util::open_checked(&meta_data, &meta_name, META_CODEC, VERSION, VERSION)?;
        let meta = TermsMeta::read_from(&mut body)?;

        let index_name = file_name(segment, INDEX_EXTENSION);
        let index_data = read_file(storage, &index_name)?;
        let (_, mut body) =
            codec_util::open_checked(&index_data, &index_name, INDEX_CODEC, VERSION, VERSION)?;
        let index = Fst::<Vec<u8>>::read_from(&mut body)?;

        let terms_name = file_name(segment, TERMS_EXTENSION);
        let terms = read_file(storage, &terms_name)?;
        codec_util::open_checked(&terms, &terms_name, TERMS_CODEC, VERSION, VERSION)?;

        let postings = PostingsReader::open(storage, &file_name(segment, DOC_EXTENSION))?;

        let root = if meta.num_terms > 0 {
            let root = BlockOutput::decode(&meta.root_code, &meta_name)?;
            if index.get(b"")?.as_deref() != Some(meta.root_code.as_slice()) {
                return Err(QuiverError::corruption(
                    &index_name,
                    "root block pointer disagrees with metadata",
                ));
            }
            Some(root)
        } else {
            None
        };
        debug!(
            "opened segment {segment}: {} terms, {} index keys",
            meta.num_terms,
            index.len()
        );
        Ok(BlockTreeTermsReader {
            segment: segment.to_string(),
            terms_name,
            terms,
            index,
            postings,
            meta,
            root,
        })
    }

    pub fn segment(&self) -> &str {
        &self.segment
    }

    pub fn meta(&self) -> &TermsMeta {
        &self.meta
    }

    /// The prefix index.
    pub fn index(&self) -> &Fst<Vec<u8>> {
        &self.index
    }

    /// Like [`Terms::intersect`], borrowing the run automaton instead of
    /// copying it.
    pub fn intersect_run<'a>(
        &'a self,
        run: &'a ByteRunAutomaton,
        start_term: Option<&[u8]>,
    ) -> IntersectTermsEnum<'a> {
        IntersectTermsEnum::new(self, Matcher::run(run), start_term)
    }

    pub fn terms_enum(&self) -> BlockTreeTermsEnum<'_> {
        BlockTreeTermsEnum::new(self)
    }

    /// Statistics of `term`, if present.
    pub fn get(&self, term: &[u8]) -> Result<Option<TermStats>> {
        let mut terms_enum = self.terms_enum();
        Ok(if terms_enum.seek_exact(term)? {
            Some(terms_enum.term_stats())
        } else {
            None
        })
    }

    /// Postings of `term`, if present.
    pub fn postings_for(&self, term: &[u8]) -> Result<Option<Box<dyn PostingsEnum>>> {
        let mut terms_enum = self.terms_enum();
        if terms_enum.seek_exact(term)? {
            Ok(Some(terms_enum.postings()?))
        } else {
            Ok(None)
        }
    }

    pub(crate) fn root(&self) -> Option<&BlockOutput> {
        self.root.as_ref()
    }

    pub(crate) fn block(&self, fp: u64) -> Result<Block> {
        let body = &self.terms[..self.terms.len() - FOOTER_LENGTH];
        read_block(body, fp, &self.terms_name)
    }

    /// Index entry of a block prefix.
    pub(crate) fn block_output(&self, prefix: &[u8]) -> Result<BlockOutput> {
        match self.index.get(prefix)? {
            Some(code) => BlockOutput::decode(&code, &self.terms_name),
            None => Err(QuiverError::corruption(
                &self.terms_name,
                format!(
                    "block prefix {:?} missing from index",
                    String::from_utf8_lossy(prefix)
                ),
            )),
        }
    }

    pub(crate) fn postings_reader(&self) -> &PostingsReader {
        &self.postings
    }
}

impl Terms for BlockTreeTermsReader {
    fn iterator(&self) -> Result<Box<dyn TermsEnum + '_>> {
        Ok(Box::new(self.terms_enum()))
    }

    fn intersect(
        &self,
        compiled: &CompiledAutomaton,
        start_term: Option<&[u8]>,
    ) -> Result<Box<dyn TermsEnum + '_>> {
        Ok(match compiled.kind() {
            AutomatonKind::None => Box::new(EmptyTermsEnum),
            AutomatonKind::All => Box::new(IntersectTermsEnum::new(self, Matcher::All, start_term)),
            AutomatonKind::Single(term) => Box::new(SingleTermsEnum::new(self, term, start_term)),
            // the boxed enum may outlive `compiled`
            AutomatonKind::Normal(run) => Box::new(IntersectTermsEnum::new(
                self,
                Matcher::Run(Cow::Owned(run.clone())),
                start_term,
            )),
        })
    }

    fn size(&self) -> u64 {
        self.meta.num_terms
    }

    fn sum_doc_freq(&self) -> u64 {
        self.meta.sum_doc_freq
    }

    fn sum_total_term_freq(&self) -> u64 {
        self.meta.sum_total_term_freq
    }

    fn doc_count(&self) -> u32 {
        self.meta.doc_count
    }
}

#[derive(Debug)]
struct Frame {
    prefix_len: usize,
    block: Block,
    next: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Position {
    Unpositioned,
    OnTerm,
    /// On a term found by `seek_exact`, without the frames to continue from.
    Detached,
    Exhausted,
}

/// Cursor over all terms of a [`BlockTreeTermsReader`].
#[derive(Debug)]
pub struct BlockTreeTermsEnum<'a> {
    reader: &'a BlockTreeTermsReader,
    stack: Vec<Frame>,
    term: Vec<u8>,
    meta: TermMeta,
    position: Position,
}

impl<'a> BlockTreeTermsEnum<'a> {
    fn new(reader: &'a BlockTreeTermsReader) -> Self {
        BlockTreeTermsEnum {
            reader,
            stack: Vec::new(),
            term: Vec::new(),
            meta: TermMeta::default(),
            position: Position::Unpositioned,
        }
    }

    fn exhaust(&mut self) {
        self.stack.clear();
        self.term.clear();
        self.meta = TermMeta::default();
        self.position = Position::Exhausted;
    }

    /// Push the block of the group at `output` that may hold `target`.
    fn push_group(&mut self, prefix_len: usize, output: &BlockOutput, target: &[u8]) -> Result<()> {
        let (fp, _) = output.select(target.get(prefix_len).copied());
        let block = self.reader.block(fp)?;
        self.stack.push(Frame {
            prefix_len,
            block,
            next: 0,
        });
        Ok(())
    }

    /// Depth-first step to the next term after everything consumed so far.
    fn advance(&mut self) -> Result<Option<&[u8]>> {
        let reader = self.reader;
        loop {
            let Some(top) = self.stack.last_mut() else {
                self.exhaust();
                return Ok(None);
            };
            if top.next < top.block.entries.len() {
                let idx = top.next;
                top.next += 1;
                self.term.truncate(top.prefix_len);
                match &top.block.entries[idx] {
                    BlockEntry::Term { suffix, meta } => {
                        self.term.extend_from_slice(suffix);
                        self.meta = *meta;
                        self.position = Position::OnTerm;
                        return Ok(Some(&self.term));
                    }
                    BlockEntry::Block { suffix, fp } => {
                        self.term.extend_from_slice(suffix);
                        let block = reader.block(*fp)?;
                        self.stack.push(Frame {
                            prefix_len: self.term.len(),
                            block,
                            next: 0,
                        });
                    }
                }
            } else if !top.block.is_last_in_floor {
                top.block = reader.block(top.block.end_fp)?;
                top.next = 0;
            } else {
                self.stack.pop();
            }
        }
    }
}

impl TermsEnum for BlockTreeTermsEnum<'_> {
    fn next(&mut self) -> Result<Option<&[u8]>> {
        match self.position {
            Position::Exhausted => return Ok(None),
            Position::Unpositioned => {
                let reader = self.reader;
                self.stack.clear();
                self.term.clear();
                match reader.root() {
                    Some(root) => self.push_group(0, root, &[])?,
                    None => {
                        self.exhaust();
                        return Ok(None);
                    }
                }
            }
            Position::Detached => {
                let target = std::mem::take(&mut self.term);
                self.seek_ceil(&target)?;
            }
            Position::OnTerm => {}
        }
        self.advance()
    }

    fn seek_ceil(&mut self, target: &[u8]) -> Result<SeekStatus> {
        let reader = self.reader;
        self.stack.clear();
        self.term.clear();
        let Some(root) = reader.root() else {
            self.exhaust();
            return Ok(SeekStatus::End);
        };
        self.push_group(0, root, target)?;
        loop {
            let Some(top) = self.stack.last_mut() else {
                self.exhaust();
                return Ok(SeekStatus::End);
            };
            let Some(entry) = top.block.entries.get(top.next) else {
                // everything left sorts after the target
                return Ok(match self.advance()? {
                    Some(_) => SeekStatus::NotFound,
                    None => SeekStatus::End,
                });
            };
            let prefix_len = top.prefix_len;
            let rest = &target[prefix_len..];
            match entry {
                BlockEntry::Term { suffix, meta } => {
                    let ord = suffix.as_slice().cmp(rest);
                    top.next += 1;
                    if ord.is_lt() {
                        continue;
                    }
                    self.term.truncate(prefix_len);
                    self.term.extend_from_slice(suffix);
                    self.meta = *meta;
                    self.position = Position::OnTerm;
                    return Ok(if ord.is_eq() {
                        SeekStatus::Found
                    } else {
                        SeekStatus::NotFound
                    });
                }
                BlockEntry::Block { suffix, fp } => {
                    if rest.starts_with(suffix) {
                        let fp = *fp;
                        top.next += 1;
                        self.term.truncate(prefix_len);
                        self.term.extend_from_slice(suffix);
                        let output = reader.block_output(&self.term)?;
                        if output.fp != fp {
                            return Err(QuiverError::corruption(
                                &reader.terms_name,
                                format!("sub-block pointer {fp} disagrees with index {}", output.fp),
                            ));
                        }
                        let len = self.term.len();
                        self.push_group(len, &output, target)?;
                    } else if suffix.as_slice() < rest {
                        top.next += 1;
                    } else {
                        // the sub-block's first term is the ceiling
                        return Ok(match self.advance()? {
                            Some(_) => SeekStatus::NotFound,
                            None => SeekStatus::End,
                        });
                    }
                }
            }
        }
    }

    fn seek_exact(&mut self, target: &[u8]) -> Result<bool> {
        let reader = self.reader;
        self.stack.clear();
        self.position = Position::Unpositioned;
        let Some((len, code)) = reader.index.longest_prefix(target)? else {
            self.term.clear();
            return Ok(false);
        };
        let output = BlockOutput::decode(&code, &reader.terms_name)?;
        let (fp, has_terms) = output.select(target.get(len).copied());
        if has_terms {
            let block = reader.block(fp)?;
            let rest = &target[len..];
            for entry in &block.entries {
                let BlockEntry::Term { suffix, meta } = entry else {
                    continue;
                };
                match suffix.as_slice().cmp(rest) {
                    std::cmp::Ordering::Less => continue,
                    std::cmp::Ordering::Equal => {
                        self.term.clear();
                        self.term.extend_from_slice(target);
                        self.meta = *meta;
                        self.position = Position::Detached;
                        return Ok(true);
                    }
                    std::cmp::Ordering::Greater => break,
                }
            }
        }
        self.term.clear();
        Ok(false)
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
        if !matches!(self.position, Position::OnTerm | Position::Detached) {
            return Err(QuiverError::invalid_operation("terms enum is not positioned on a term"));
        }
        Ok(Box::new(self.reader.postings.postings(&self.meta)?))
    }
}
