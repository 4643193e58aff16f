//! Block-tree term dictionary.
//!
//! Terms are grouped into blocks that share a byte prefix. Each block stores
//! only the suffixes of its entries; an entry is either a term or a pointer
//! to a sub-block holding every term with a longer prefix. When one prefix
//! has too many entries for a single block, they are cut into consecutive
//! floor blocks keyed by the first suffix byte (the lead byte).
//!
//! An FST maps every block prefix to the file pointer of its block and, for
//! floor groups, the lead byte and pointer of each floor block. A lookup
//! follows the longest prefix of the target in that FST and scans one block.
//!
//! Files of segment `s`:
//!
//! ```text
//! s.tim  block := vint(count << 1 | last_in_floor)
//!                 vint(suffix_len << 1 | is_leaf) suffixes
//!                 vint(stats_len) stats
//!                 vint(meta_len) meta
//! s.tip  FST<prefix -> vlong(fp << 2 | has_terms << 1 | is_floor)
//!                      [vint(n) (u8 lead, vlong((fp_i - fp) << 1 | has_terms))*n]>
//! s.tmd  counts, min and max term, root block pointer
//! s.doc  postings
//! ```
//!
//! Leaf blocks store `vint(len) bytes` per suffix; inner blocks store
//! `vint(len << 1 | is_block) bytes` followed by `vlong(block_fp - sub_fp)`
//! for sub-blocks. Stats are `vint(doc_freq) vlong(total_term_freq -
//! doc_freq)` per term and meta is the postings pointer, delta coded within
//! the block.

use serde::{Deserialize, Serialize};

use crate::codec::PostingsFormat;
use crate::codec::postings::TermMeta;
use crate::config::BlockTreeConfig;
use crate::error::{QuiverError, Result};
use crate::storage::StorageOutput;
use crate::storage::structured::{ByteReader, StructWriter};
use crate::util::varint;

pub mod floor;
pub mod intersect;
pub mod reader;
pub mod stats;
pub mod writer;

pub use intersect::{IntersectTermsEnum, SingleTermsEnum};
pub use reader::{BlockTreeTermsEnum, BlockTreeTermsReader};
pub use stats::Stats;
pub use writer::BlockTreeTermsWriter;

pub const TERMS_CODEC: &str = "QuiverBlockTreeTerms";
pub const INDEX_CODEC: &str = "QuiverBlockTreeIndex";
pub const META_CODEC: &str = "QuiverBlockTreeMeta";
pub const VERSION: u32 = 1;

pub const TERMS_EXTENSION: &str = "tim";
pub const INDEX_EXTENSION: &str = "tip";
pub const META_EXTENSION: &str = "tmd";

/// Name of a segment file.
pub fn file_name(segment: &str, extension: &str) -> String {
    format!("{segment}.{extension}")
}

/// Summary of a written dictionary, persisted in the `.tmd` file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermsMeta {
    pub postings_format: PostingsFormat,
    pub block_tree: BlockTreeConfig,
    pub num_terms: u64,
    pub sum_doc_freq: u64,
    pub sum_total_term_freq: u64,
    /// Documents with at least one term.
    pub doc_count: u32,
    /// Exclusive upper bound of document ids.
    pub max_doc: u32,
    pub min_term: Option<Vec<u8>>,
    pub max_term: Option<Vec<u8>>,
    /// Blocks written, floor blocks included.
    pub block_count: u64,
    /// Prefixes whose entries were split into floor blocks.
    pub floor_group_count: u64,
    #[serde(skip)]
    pub(crate) root_code: Vec<u8>,
}

impl TermsMeta {
    pub(crate) fn write_to<W: StorageOutput>(&self, out: &mut StructWriter<W>) -> Result<()> {
        out.write_string(self.postings_format.name())?;
        out.write_varint(self.block_tree.min_items_in_block as u64)?;
        out.write_varint(self.block_tree.max_items_in_block as u64)?;
        out.write_varint(self.num_terms)?;
        out.write_varint(self.sum_doc_freq)?;
        out.write_varint(self.sum_total_term_freq)?;
        out.write_varint(self.doc_count as u64)?;
        out.write_varint(self.max_doc as u64)?;
        out.write_varint(self.block_count)?;
        out.write_varint(self.floor_group_count)?;
        if self.num_terms > 0 {
            out.write_bytes(self.min_term.as_deref().unwrap_or_default())?;
            out.write_bytes(self.max_term.as_deref().unwrap_or_default())?;
            out.write_bytes(&self.root_code)?;
        }
        Ok(())
    }

    pub(crate) fn read_from(input: &mut ByteReader<'_>) -> Result<Self> {
        let postings_format = input.read_string()?.parse()?;
        let block_tree = BlockTreeConfig {
            min_items_in_block: input.read_len()?,
            max_items_in_block: input.read_len()?,
        };
        let mut meta = TermsMeta {
            postings_format,
            block_tree,
            num_terms: input.read_varint()?,
            sum_doc_freq: input.read_varint()?,
            sum_total_term_freq: input.read_varint()?,
            doc_count: input.read_varint_u32()?,
            max_doc: input.read_varint_u32()?,
            block_count: input.read_varint()?,
            floor_group_count: input.read_varint()?,
            ..Default::default()
        };
        if meta.num_terms > 0 {
            meta.min_term = Some(input.read_bytes()?.to_vec());
            meta.max_term = Some(input.read_bytes()?.to_vec());
            meta.root_code = input.read_bytes()?.to_vec();
        }
        if meta.doc_count > meta.max_doc || meta.sum_doc_freq > meta.sum_total_term_freq {
            return Err(QuiverError::corruption(
                input.resource(),
                format!(
                    "inconsistent counts: doc_count {} max_doc {} sum_doc_freq {} sum_total_term_freq {}",
                    meta.doc_count, meta.max_doc, meta.sum_doc_freq, meta.sum_total_term_freq
                ),
            ));
        }
        Ok(meta)
    }
}

/// One block of a floor group other than the first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct FloorBlock {
    /// First suffix byte of the block's first entry.
    pub lead: u8,
    pub fp: u64,
    pub has_terms: bool,
}

/// Index output for a block prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct BlockOutput {
    /// Pointer to the first block of the group.
    pub fp: u64,
    pub has_terms: bool,
    /// Empty unless the prefix was split into floor blocks.
    pub floor: Vec<FloorBlock>,
}

impl BlockOutput {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        let is_floor = !self.floor.is_empty();
        varint::push_u64(
            &mut buf,
            (self.fp << 2) | ((self.has_terms as u64) << 1) | is_floor as u64,
        );
        if is_floor {
            varint::push_u64(&mut buf, self.floor.len() as u64);
            for block in &self.floor {
                buf.push(block.lead);
                varint::push_u64(&mut buf, ((block.fp - self.fp) << 1) | block.has_terms as u64);
            }
        }
        buf
    }

    pub fn decode(bytes: &[u8], resource: &str) -> Result<Self> {
        let mut input = ByteReader::new(bytes, resource);
        let code = input.read_varint()?;
        let fp = code >> 2;
        let mut floor = Vec::new();
        if code & 1 == 1 {
            let n = input.read_len()?;
            if n == 0 {
                return Err(QuiverError::corruption(resource, "floor group without floor blocks"));
            }
            floor.reserve(n);
            for _ in 0..n {
                let lead = input.read_u8()?;
                let code = input.read_varint()?;
                if floor.last().is_some_and(|prev: &FloorBlock| prev.lead >= lead) {
                    return Err(QuiverError::corruption(resource, "floor lead bytes out of order"));
                }
                floor.push(FloorBlock {
                    lead,
                    fp: fp + (code >> 1),
                    has_terms: code & 1 == 1,
                });
            }
        }
        if !input.is_eof() {
            return Err(QuiverError::corruption(resource, "trailing bytes in block index output"));
        }
        Ok(BlockOutput {
            fp,
            has_terms: code & 2 == 2,
            floor,
        })
    }

    /// Pointer and `has_terms` of the block holding entries whose first
    /// suffix byte is `lead`; `None` selects the first block.
    pub fn select(&self, lead: Option<u8>) -> (u64, bool) {
        lead.and_then(|lead| self.floor.iter().rev().find(|b| b.lead <= lead))
            .map_or((self.fp, self.has_terms), |b| (b.fp, b.has_terms))
    }
}

/// A decoded entry of a term block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum BlockEntry {
    Term { suffix: Vec<u8>, meta: TermMeta },
    Block { suffix: Vec<u8>, fp: u64 },
}

impl BlockEntry {
    pub fn suffix(&self) -> &[u8] {
        match self {
            BlockEntry::Term { suffix, .. } | BlockEntry::Block { suffix, .. } => suffix,
        }
    }
}

/// A decoded term block.
#[derive(Debug, Clone)]
pub(crate) struct Block {
    pub fp: u64,
    /// Pointer just past this block; the next floor block starts here.
    pub end_fp: u64,
    pub is_last_in_floor: bool,
    pub is_leaf: bool,
    pub entries: Vec<BlockEntry>,
    pub suffix_bytes: usize,
    pub stats_bytes: usize,
}

impl Block {
    pub fn term_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| matches!(e, BlockEntry::Term { .. }))
            .count()
    }
}

/// Decode the block at `fp`. `data` is the `.tim` file without its footer.
pub(crate) fn read_block(data: &[u8], fp: u64, resource: &str) -> Result<Block> {
    let start = usize::try_from(fp)
        .map_err(|_| QuiverError::corruption(resource, format!("block pointer {fp} out of range")))?;
    let mut input = ByteReader::at(data, start, resource)?;
    let code = input.read_varint()?;
    let count = (code >> 1) as usize;
    if count == 0 {
        return Err(QuiverError::corruption(resource, format!("empty block at {fp}")));
    }
    let suffix_code = input.read_varint()?;
    let is_leaf = suffix_code & 1 == 1;
    let suffixes = input.read_slice((suffix_code >> 1) as usize)?;
    let stats = input.read_bytes()?;
    let meta = input.read_bytes()?;
    let end_fp = input.position() as u64;

    let mut suffix_in = ByteReader::new(suffixes, resource);
    let mut stats_in = ByteReader::new(stats, resource);
    let mut meta_in = ByteReader::new(meta, resource);
    let mut entries = Vec::with_capacity(count.min(suffixes.len()));
    let mut last_doc_fp: Option<u64> = None;
    for _ in 0..count {
        let (len, is_block) = if is_leaf {
            (suffix_in.read_len()?, false)
        } else {
            let code = suffix_in.read_varint()?;
            ((code >> 1) as usize, code & 1 == 1)
        };
        let suffix = suffix_in.read_slice(len)?.to_vec();
        if is_block {
            let delta = suffix_in.read_varint()?;
            if delta == 0 || delta > fp {
                return Err(QuiverError::corruption(
                    resource,
                    format!("sub-block delta {delta} invalid in block at {fp}"),
                ));
            }
            entries.push(BlockEntry::Block {
                suffix,
                fp: fp - delta,
            });
        } else {
            let doc_freq = stats_in.read_varint_u32()?;
            let extra = stats_in.read_varint()?;
            let delta = meta_in.read_varint()?;
            let doc_start_fp = match last_doc_fp {
                None => delta,
                Some(last) => last.checked_add(delta).ok_or_else(|| {
                    QuiverError::corruption(resource, "postings pointer overflow")
                })?,
            };
            last_doc_fp = Some(doc_start_fp);
            entries.push(BlockEntry::Term {
                suffix,
                meta: TermMeta {
                    doc_freq,
                    total_term_freq: doc_freq as u64 + extra,
                    doc_start_fp,
                },
            });
        }
    }
    if !suffix_in.is_eof() || !stats_in.is_eof() || !meta_in.is_eof() {
        return Err(QuiverError::corruption(
            resource,
            format!("block at {fp} has trailing bytes"),
        ));
    }
    Ok(Block {
        fp,
        end_fp,
        is_last_in_floor: code & 1 == 1,
        is_leaf,
        entries,
        suffix_bytes: suffixes.len(),
        stats_bytes: stats.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_output_select() {
        let output = BlockOutput {
            fp: 100,
            has_terms: true,
            floor: vec![
                FloorBlock {
                    lead: b'g',
                    fp: 180,
                    has_terms: false,
                },
                FloorBlock {
                    lead: b'p',
                    fp: 260,
                    has_terms: true,
                },
            ],
        };
        let decoded = BlockOutput::decode(&output.encode(), "test").unwrap();
        assert_eq!(decoded, output);
        assert_eq!(output.select(None), (100, true));
        assert_eq!(output.select(Some(b'a')), (100, true));
        assert_eq!(output.select(Some(b'g')), (180, false));
        assert_eq!(output.select(Some(b'o')), (180, false));
        assert_eq!(output.select(Some(b'z')), (260, true));

        let single = BlockOutput {
            fp: 7,
            has_terms: false,
            floor: Vec::new(),
        };
        assert_eq!(BlockOutput::decode(&single.encode(), "test").unwrap(), single);
        assert_eq!(single.select(Some(b'x')), (7, false));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let mut bytes = BlockOutput {
            fp: 3,
            has_terms: true,
            floor: Vec::new(),
        }
        .encode();
        bytes.push(0);
        assert!(BlockOutput::decode(&bytes, "test").unwrap_err().is_corruption());
        // count 0 block
        assert!(read_block(&[0, 0, 0, 0], 0, "test").unwrap_err().is_corruption());
    }
}
