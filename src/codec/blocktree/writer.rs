//! Writing a block-tree dictionary.

use std::sync::Arc;

use bit_vec::BitVec;
use log::{debug, trace};

use crate::codec::PostingsFormat;
use crate::codec::blocktree::floor::{BlockSpan, FloorSplitter};
use crate::codec::blocktree::{
    BlockOutput, FloorBlock, INDEX_CODEC, INDEX_EXTENSION, META_CODEC, META_EXTENSION,
    TERMS_CODEC, TERMS_EXTENSION, TermsMeta, VERSION, file_name,
};
use crate::codec::codec_util;
use crate::codec::postings::{DOC_EXTENSION, PostingsWriter, TermMeta};
use crate::config::BlockTreeConfig;
use crate::error::{QuiverError, Result};
use crate::fst::FstBuilder;
use crate::storage::structured::StructWriter;
use crate::storage::{Storage, StorageOutput};
use crate::util::varint;

#[derive(Debug)]
struct PendingTerm {
    term: Vec<u8>,
    meta: TermMeta,
}

#[derive(Debug)]
struct PendingBlock {
    prefix: Vec<u8>,
    fp: u64,
}

#[derive(Debug)]
enum PendingEntry {
    Term(PendingTerm),
    Block(PendingBlock),
}

impl PendingEntry {
    /// First byte after `prefix_len`, `None` when nothing follows.
    fn lead_label(&self, prefix_len: usize) -> Option<u8> {
        match self {
            PendingEntry::Term(t) => t.term.get(prefix_len).copied(),
            PendingEntry::Block(b) => b.prefix.get(prefix_len).copied(),
        }
    }
}

/// Streams sorted terms and their postings into a segment.
///
/// ```
/// use std::sync::Arc;
///
/// use quiver::codec::blocktree::{BlockTreeTermsReader, BlockTreeTermsWriter};
/// use quiver::config::BlockTreeConfig;
/// use quiver::storage::memory::MemoryStorage;
///
/// # fn main() -> quiver::error::Result<()> {
/// let storage = Arc::new(MemoryStorage::default());
/// let mut writer = BlockTreeTermsWriter::new(storage.clone(), "_0", 10, &BlockTreeConfig::default())?;
/// writer.add_term(b"apple", &[(0, 1), (3, 2)])?;
/// writer.add_term(b"banana", &[(1, 1)])?;
/// writer.finish()?;
///
/// let reader = BlockTreeTermsReader::open(storage.as_ref(), "_0")?;
/// assert_eq!(reader.get(b"apple")?.map(|s| s.doc_freq), Some(2));
/// # Ok(())
/// # }
/// ```
pub struct BlockTreeTermsWriter {
    storage: Arc<dyn Storage>,
    segment: String,
    config: BlockTreeConfig,
    terms_out: StructWriter<Box<dyn StorageOutput>>,
    postings: PostingsWriter<Box<dyn StorageOutput>>,
    pending: Vec<PendingEntry>,
    // pending index where the entries sharing last_term[..=i] start
    prefix_starts: Vec<usize>,
    last_term: Vec<u8>,
    current: Option<Vec<u8>>,
    previous: Option<Vec<u8>>,
    index_entries: Vec<(Vec<u8>, Vec<u8>)>,
    docs_seen: BitVec,
    max_doc: u32,
    num_terms: u64,
    sum_doc_freq: u64,
    sum_total_term_freq: u64,
    min_term: Option<Vec<u8>>,
    block_count: u64,
    floor_group_count: u64,
}

impl BlockTreeTermsWriter {
    /// Create the segment files. Document ids must stay below `max_doc`.
    pub fn new(
        storage: Arc<dyn Storage>,
        segment: &str,
        max_doc: u32,
        config: &BlockTreeConfig,
    ) -> Result<Self> {
        config.validate()?;
        let mut terms_out =
            StructWriter::new(storage.create_output(&file_name(segment, TERMS_EXTENSION))?);
        codec_util::write_header(&mut terms_out, TERMS_CODEC, VERSION)?;
        let postings = PostingsWriter::new(StructWriter::new(
            storage.create_output(&file_name(segment, DOC_EXTENSION))?,
        ))?;
        Ok(BlockTreeTermsWriter {
            storage,
            segment: segment.to_string(),
            config: *config,
            terms_out,
            postings,
            pending: Vec::new(),
            prefix_starts: Vec::new(),
            last_term: Vec::new(),
            current: None,
            previous: None,
            index_entries: Vec::new(),
            docs_seen: BitVec::from_elem(max_doc as usize, false),
            max_doc,
            num_terms: 0,
            sum_doc_freq: 0,
            sum_total_term_freq: 0,
            min_term: None,
            block_count: 0,
            floor_group_count: 0,
        })
    }

    pub fn segment(&self) -> &str {
        &self.segment
    }

    /// Begin a term. Terms must arrive in strictly increasing byte order.
    pub fn start_term(&mut self, term: &[u8]) -> Result<()> {
        if self.current.is_some() {
            return Err(QuiverError::invalid_operation(
                "start_term called before the previous term was finished",
            ));
        }
        if let Some(previous) = &self.previous
            && term <= previous.as_slice()
        {
            return Err(QuiverError::invalid_operation(format!(
                "terms out of order: {:?} after {:?}",
                String::from_utf8_lossy(term),
                String::from_utf8_lossy(previous)
            )));
        }
        self.postings.start_term();
        self.current = Some(term.to_vec());
        Ok(())
    }

    /// Add a document to the current term.
    pub fn add_doc(&mut self, doc: u32, freq: u32) -> Result<()> {
        if doc >= self.max_doc {
            return Err(QuiverError::invalid_operation(format!(
                "doc {doc} outside of segment with max_doc {}",
                self.max_doc
            )));
        }
        self.postings.start_doc(doc, freq)?;
        self.docs_seen.set(doc as usize, true);
        Ok(())
    }

    /// Close the current term. A term needs at least one document.
    pub fn finish_term(&mut self) -> Result<()> {
        let Some(term) = self.current.take() else {
            return Err(QuiverError::invalid_operation("finish_term without start_term"));
        };
        let meta = self.postings.finish_term()?;
        self.push_term(&term)?;
        self.num_terms += 1;
        self.sum_doc_freq += meta.doc_freq as u64;
        self.sum_total_term_freq += meta.total_term_freq;
        if self.min_term.is_none() {
            self.min_term = Some(term.clone());
        }
        self.previous = Some(term.clone());
        self.pending.push(PendingEntry::Term(PendingTerm { term, meta }));
        Ok(())
    }

    /// Add a whole term with its `(doc, freq)` postings.
    pub fn add_term(&mut self, term: &[u8], postings: &[(u32, u32)]) -> Result<()> {
        self.start_term(term)?;
        for &(doc, freq) in postings {
            self.add_doc(doc, freq)?;
        }
        self.finish_term()
    }

    /// Close the groups of `last_term` that `text` does not share and write
    /// those holding enough entries.
    fn push_term(&mut self, text: &[u8]) -> Result<()> {
        let limit = self.last_term.len().min(text.len());
        let pos = (0..limit)
            .find(|&i| self.last_term[i] != text[i])
            .unwrap_or(limit);

        for i in (pos..self.last_term.len()).rev() {
            let top_size = self.pending.len() - self.prefix_starts[i];
            if top_size >= self.config.min_items_in_block {
                self.write_blocks(i + 1, top_size)?;
                self.prefix_starts[i] -= top_size - 1;
            }
        }

        if self.prefix_starts.len() < text.len() {
            self.prefix_starts.resize(text.len(), 0);
        }
        for start in &mut self.prefix_starts[pos..text.len()] {
            *start = self.pending.len();
        }
        self.last_term.clear();
        self.last_term.extend_from_slice(text);
        Ok(())
    }

    /// Replace the top `count` pending entries, which share the prefix
    /// `last_term[..prefix_len]`, by one (possibly floor) block.
    fn write_blocks(&mut self, prefix_len: usize, count: usize) -> Result<()> {
        let end = self.pending.len();
        let start = end - count;
        let mut splitter = FloorSplitter::new(
            self.config.min_items_in_block,
            self.config.max_items_in_block,
            start,
            end,
        );
        for (i, entry) in self.pending[start..end].iter().enumerate() {
            splitter.push(start + i, entry.lead_label(prefix_len));
        }
        let spans = splitter.finish();

        let prefix = self.last_term[..prefix_len].to_vec();
        let mut written = Vec::with_capacity(spans.len());
        for span in &spans {
            written.push(self.write_block(prefix_len, span, span.end == end)?);
        }
        let (fp, has_terms) = written[0];
        let floor: Vec<FloorBlock> = spans
            .iter()
            .zip(&written)
            .skip(1)
            .filter_map(|(span, &(fp, has_terms))| {
                span.lead.map(|lead| FloorBlock {
                    lead,
                    fp,
                    has_terms,
                })
            })
            .collect();
        if !floor.is_empty() {
            self.floor_group_count += 1;
        }
        trace!(
            "prefix {:?}: {count} entries in {} block(s) at {fp}",
            String::from_utf8_lossy(&prefix),
            spans.len()
        );
        let output = BlockOutput {
            fp,
            has_terms,
            floor,
        };
        self.index_entries.push((prefix.clone(), output.encode()));

        self.pending.truncate(start);
        self.pending.push(PendingEntry::Block(PendingBlock { prefix, fp }));
        Ok(())
    }

    /// Write the entries of `span` as one block; returns its pointer and
    /// whether it holds terms.
    fn write_block(&mut self, prefix_len: usize, span: &BlockSpan, is_last: bool) -> Result<(u64, bool)> {
        let fp = self.terms_out.position();
        let entries = &self.pending[span.start..span.end];
        let is_leaf = entries.iter().all(|e| matches!(e, PendingEntry::Term(_)));
        let has_terms = entries.iter().any(|e| matches!(e, PendingEntry::Term(_)));

        let mut suffixes = Vec::new();
        let mut stats = Vec::new();
        let mut metas = Vec::new();
        let mut last_doc_fp = None;
        for entry in entries {
            match entry {
                PendingEntry::Term(t) => {
                    let suffix = &t.term[prefix_len..];
                    if is_leaf {
                        varint::push_u64(&mut suffixes, suffix.len() as u64);
                    } else {
                        varint::push_u64(&mut suffixes, (suffix.len() as u64) << 1);
                    }
                    suffixes.extend_from_slice(suffix);
                    varint::push_u32(&mut stats, t.meta.doc_freq);
                    varint::push_u64(&mut stats, t.meta.total_term_freq - t.meta.doc_freq as u64);
                    let doc_fp = t.meta.doc_start_fp;
                    varint::push_u64(&mut metas, doc_fp - last_doc_fp.unwrap_or(0));
                    last_doc_fp = Some(doc_fp);
                }
                PendingEntry::Block(b) => {
                    let suffix = &b.prefix[prefix_len..];
                    varint::push_u64(&mut suffixes, ((suffix.len() as u64) << 1) | 1);
                    suffixes.extend_from_slice(suffix);
                    varint::push_u64(&mut suffixes, fp - b.fp);
                }
            }
        }

        let count = (span.end - span.start) as u64;
        self.terms_out.write_varint((count << 1) | is_last as u64)?;
        self.terms_out
            .write_varint(((suffixes.len() as u64) << 1) | is_leaf as u64)?;
        self.terms_out.write_raw(&suffixes)?;
        self.terms_out.write_bytes(&stats)?;
        self.terms_out.write_bytes(&metas)?;
        self.block_count += 1;
        Ok((fp, has_terms))
    }

    /// Flush the remaining blocks and write the index, metadata and footers.
    pub fn finish(mut self) -> Result<TermsMeta> {
        if self.current.is_some() {
            return Err(QuiverError::invalid_operation("unfinished term at finish"));
        }
        let mut root_code = Vec::new();
        if self.num_terms > 0 {
            // the empty term closes every open prefix
            self.push_term(&[])?;
            self.write_blocks(0, self.pending.len())?;
            if let Some((prefix, code)) = self.index_entries.last()
                && prefix.is_empty()
            {
                root_code = code.clone();
            }
        }

        codec_util::write_footer(&mut self.terms_out)?;
        self.terms_out.close()?;
        self.postings.finish()?;

        let mut entries = std::mem::take(&mut self.index_entries);
        entries.sort_unstable_by(|a, b| a.0.cmp(&b.0));
        let mut builder = FstBuilder::<Vec<u8>>::new();
        for (prefix, code) in entries {
            builder.insert(&prefix, code)?;
        }
        let index = builder.finish()?;
        let mut index_out = StructWriter::new(
            self.storage
                .create_output(&file_name(&self.segment, INDEX_EXTENSION))?,
        );
        codec_util::write_header(&mut index_out, INDEX_CODEC, VERSION)?;
        index.write_to(&mut index_out)?;
        codec_util::write_footer(&mut index_out)?;
        index_out.close()?;

        let meta = TermsMeta {
            postings_format: PostingsFormat::Block,
            block_tree: self.config,
            num_terms: self.num_terms,
            sum_doc_freq: self.sum_doc_freq,
            sum_total_term_freq: self.sum_total_term_freq,
            doc_count: self.docs_seen.iter().filter(|&seen| seen).count() as u32,
            max_doc: self.max_doc,
            min_term: self.min_term.take(),
            max_term: self.previous.take(),
            block_count: self.block_count,
            floor_group_count: self.floor_group_count,
            root_code,
        };
        let mut meta_out = StructWriter::new(
            self.storage
                .create_output(&file_name(&self.segment, META_EXTENSION))?,
        );
        codec_util::write_header(&mut meta_out, META_CODEC, VERSION)?;
        meta.write_to(&mut meta_out)?;
        codec_util::write_footer(&mut meta_out)?;
        meta_out.close()?;

        debug!(
            "wrote segment {}: {} terms, {} blocks ({} floor groups), {} index nodes",
            self.segment,
            meta.num_terms,
            meta.block_count,
            meta.floor_group_count,
            index.node_count()
        );
        Ok(meta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::MemoryStorage;

    #[test]
    fn test_rejects_misuse() {
        let storage = Arc::new(MemoryStorage::default());
        let config = BlockTreeConfig::default();
        let mut writer = BlockTreeTermsWriter::new(storage.clone(), "_0", 4, &config).unwrap();
        writer.add_term(b"b", &[(0, 1)]).unwrap();
        assert!(matches!(
            writer.add_term(b"a", &[(1, 1)]),
            Err(QuiverError::InvalidOperation(_))
        ));
        assert!(writer.add_term(b"b", &[(1, 1)]).is_err());

        let mut writer = BlockTreeTermsWriter::new(storage.clone(), "_1", 4, &config).unwrap();
        assert!(writer.add_term(b"x", &[(4, 1)]).is_err());

        let mut writer = BlockTreeTermsWriter::new(storage.clone(), "_2", 4, &config).unwrap();
        writer.start_term(b"x").unwrap();
        assert!(writer.finish_term().is_err());

        let mut writer = BlockTreeTermsWriter::new(storage, "_3", 4, &config).unwrap();
        writer.start_term(b"x").unwrap();
        writer.add_doc(0, 1).unwrap();
        assert!(writer.finish().is_err());
    }

    #[test]
    fn test_writes_all_files() {
        let storage = Arc::new(MemoryStorage::default());
        let mut writer =
            BlockTreeTermsWriter::new(storage.clone(), "seg", 3, &BlockTreeConfig::default())
                .unwrap();
        writer.add_term(b"", &[(2, 1)]).unwrap();
        writer.add_term(b"x", &[(0, 3), (2, 1)]).unwrap();
        let meta = writer.finish().unwrap();
        assert_eq!(meta.num_terms, 2);
        assert_eq!(meta.sum_doc_freq, 3);
        assert_eq!(meta.sum_total_term_freq, 5);
        assert_eq!(meta.doc_count, 2);
        assert_eq!(meta.min_term.as_deref(), Some(&b""[..]));
        assert_eq!(meta.max_term.as_deref(), Some(&b"x"[..]));
        assert_eq!(meta.block_count, 1);
        for ext in ["tim", "tip", "tmd", "doc"] {
            assert!(storage.file_exists(&file_name("seg", ext)), "missing {ext}");
        }
    }

    #[test]
    fn test_empty_dictionary() {
        let storage = Arc::new(MemoryStorage::default());
        let writer =
            BlockTreeTermsWriter::new(storage, "empty", 0, &BlockTreeConfig::default()).unwrap();
        let meta = writer.finish().unwrap();
        assert_eq!(meta.num_terms, 0);
        assert_eq!(meta.block_count, 0);
        assert!(meta.min_term.is_none());
    }
}
