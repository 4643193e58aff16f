//! Block statistics of a written dictionary.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::codec::blocktree::{Block, BlockEntry, BlockTreeTermsReader};
use crate::error::{QuiverError, Result};

/// Shape of the on-disk block tree, gathered by walking every block.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    pub segment: String,
    /// Bytes of the FST prefix index.
    pub index_num_bytes: u64,
    pub index_node_count: u64,
    pub index_arc_count: u64,
    pub total_term_count: u64,
    pub total_term_bytes: u64,
    /// Blocks that are the only block of their prefix.
    pub non_floor_block_count: u64,
    /// Prefixes split into floor blocks.
    pub floor_block_count: u64,
    /// Blocks belonging to a floor group.
    pub floor_sub_block_count: u64,
    pub mixed_block_count: u64,
    pub terms_only_block_count: u64,
    pub sub_blocks_only_block_count: u64,
    pub total_block_count: u64,
    /// `block_count_by_prefix_len[n]` blocks have an `n` byte prefix.
    pub block_count_by_prefix_len: Vec<u64>,
    pub total_block_suffix_bytes: u64,
    pub total_block_stats_bytes: u64,
    /// Block bytes other than suffixes and stats: headers and postings
    /// pointers.
    pub total_block_other_bytes: u64,
}

impl Stats {
    fn start_block(&mut self, block: &Block, prefix_len: usize, is_floor: bool, is_first: bool) {
        self.total_block_count += 1;
        if is_floor {
            if is_first {
                self.floor_block_count += 1;
            }
            self.floor_sub_block_count += 1;
        } else {
            self.non_floor_block_count += 1;
        }
        if self.block_count_by_prefix_len.len() <= prefix_len {
            self.block_count_by_prefix_len.resize(prefix_len + 1, 0);
        }
        self.block_count_by_prefix_len[prefix_len] += 1;
        self.total_block_suffix_bytes += block.suffix_bytes as u64;
        self.total_block_stats_bytes += block.stats_bytes as u64;
    }

    fn end_block(&mut self, block: &Block) -> Result<()> {
        let term_count = block.term_count();
        let sub_block_count = block.entries.len() - term_count;
        self.total_term_count += term_count as u64;
        match (term_count > 0, sub_block_count > 0) {
            (true, true) => self.mixed_block_count += 1,
            (true, false) => self.terms_only_block_count += 1,
            (false, true) => self.sub_blocks_only_block_count += 1,
            (false, false) => {
                return Err(QuiverError::corruption(
                    &self.segment,
                    format!("block at {} has no entries", block.fp),
                ));
            }
        }
        let other = (block.end_fp - block.fp)
            .saturating_sub((block.suffix_bytes + block.stats_bytes) as u64);
        self.total_block_other_bytes += other;
        Ok(())
    }
}

impl BlockTreeTermsReader {
    /// Walk every block of the dictionary.
    pub fn compute_stats(&self) -> Result<Stats> {
        let index = self.index();
        let mut stats = Stats {
            segment: self.segment().to_string(),
            index_num_bytes: index.size_bytes() as u64,
            index_node_count: index.node_count() as u64,
            index_arc_count: index.arc_count() as u64,
            ..Default::default()
        };
        let Some(root) = self.root() else {
            return Ok(stats);
        };
        // (first block of a group, prefix length)
        let mut groups = vec![(root.fp, 0usize)];
        while let Some((fp, prefix_len)) = groups.pop() {
            let mut block = self.block(fp)?;
            let is_floor = !block.is_last_in_floor;
            let mut is_first = true;
            loop {
                stats.start_block(&block, prefix_len, is_floor, is_first);
                for entry in &block.entries {
                    match entry {
                        BlockEntry::Term { suffix, .. } => {
                            stats.total_term_bytes += (prefix_len + suffix.len()) as u64;
                        }
                        BlockEntry::Block { suffix, fp } => {
                            groups.push((*fp, prefix_len + suffix.len()));
                        }
                    }
                }
                stats.end_block(&block)?;
                if block.is_last_in_floor {
                    break;
                }
                block = self.block(block.end_fp)?;
                is_first = false;
            }
        }
        Ok(stats)
    }
}

impl fmt::Display for Stats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "segment {}:", self.segment)?;
        writeln!(
            f,
            "  index FST: {} bytes, {} nodes, {} arcs",
            self.index_num_bytes, self.index_node_count, self.index_arc_count
        )?;
        writeln!(f, "  terms: {} ({} bytes)", self.total_term_count, self.total_term_bytes)?;
        if self.total_term_count > 0 {
            writeln!(
                f,
                "    {:.1} bytes/term",
                self.total_term_bytes as f64 / self.total_term_count as f64
            )?;
        }
        writeln!(f, "  blocks: {}", self.total_block_count)?;
        writeln!(f, "    {} non-floor blocks", self.non_floor_block_count)?;
        writeln!(
            f,
            "    {} floor blocks ({} floor sub-blocks)",
            self.floor_block_count, self.floor_sub_block_count
        )?;
        writeln!(
            f,
            "    {} terms-only, {} sub-blocks-only, {} mixed",
            self.terms_only_block_count, self.sub_blocks_only_block_count, self.mixed_block_count
        )?;
        writeln!(f, "  by prefix length:")?;
        for (len, count) in self.block_count_by_prefix_len.iter().enumerate() {
            if *count > 0 {
                writeln!(f, "    {len:>3}: {count}")?;
            }
        }
        let total = self.total_block_suffix_bytes
            + self.total_block_stats_bytes
            + self.total_block_other_bytes;
        write!(
            f,
            "  block bytes: {total} ({} suffix, {} stats, {} other)",
            self.total_block_suffix_bytes, self.total_block_stats_bytes, self.total_block_other_bytes
        )
    }
}
