//! Block postings format.
//!
//! For each term the `.doc` file holds its document ids as deltas and the
//! per-document frequencies:
//!
//! ```text
//! term   := full_block* tail
//! full   := vint(last_doc - previous_last_doc) vlong(payload_len)
//!           packed_block(doc_deltas) packed_block(freqs)
//! tail   := (vint(delta << 1 | freq == 1) [vint(freq)])*     (< 128 docs)
//! ```
//!
//! The header in front of each full block lets a reader skip the block
//! without decoding it when advancing to a target document.

use std::sync::Arc;

use log::trace;

use crate::codec::codec_util;
use crate::codec::for_util::{self, BLOCK_SIZE, MAX_ENCODED_WORDS};
use crate::error::{QuiverError, Result};
use crate::index::{NO_MORE_DOCS, PostingsEnum};
use crate::storage::structured::{ByteReader, StructWriter};
use crate::storage::{Storage, StorageOutput, read_file};

pub const DOC_CODEC: &str = "QuiverPostingsDoc";
pub const DOC_VERSION: u32 = 1;
pub const DOC_EXTENSION: &str = "doc";

/// Where a term's postings live and how many there are.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TermMeta {
    pub doc_freq: u32,
    pub total_term_freq: u64,
    /// Absolute offset of the term's first block in the `.doc` file.
    pub doc_start_fp: u64,
}

/// Streams postings of consecutive terms into a `.doc` file.
pub struct PostingsWriter<W: StorageOutput> {
    out: StructWriter<W>,
    doc_deltas: [u32; BLOCK_SIZE],
    freqs: [u32; BLOCK_SIZE],
    buffered: usize,
    last_doc: Option<u32>,
    block_base: u32,
    doc_freq: u32,
    total_term_freq: u64,
    doc_start_fp: u64,
    scratch: Box<[u32; MAX_ENCODED_WORDS]>,
    block_buf: Vec<u8>,
    in_term: bool,
}

impl<W: StorageOutput> PostingsWriter<W> {
    /// Write the file header and get ready for the first term.
    pub fn new(mut out: StructWriter<W>) -> Result<Self> {
        codec_util::write_header(&mut out, DOC_CODEC, DOC_VERSION)?;
        Ok(PostingsWriter {
            out,
            doc_deltas: [0; BLOCK_SIZE],
            freqs: [0; BLOCK_SIZE],
            buffered: 0,
            last_doc: None,
            block_base: 0,
            doc_freq: 0,
            total_term_freq: 0,
            doc_start_fp: 0,
            scratch: Box::new([0; MAX_ENCODED_WORDS]),
            block_buf: Vec::new(),
            in_term: false,
        })
    }

    pub fn start_term(&mut self) {
        self.buffered = 0;
        self.last_doc = None;
        self.block_base = 0;
        self.doc_freq = 0;
        self.total_term_freq = 0;
        self.doc_start_fp = self.out.position();
        self.in_term = true;
    }

    /// Add a document to the current term. Documents must be strictly
    /// increasing and `freq` at least 1.
    pub fn start_doc(&mut self, doc: u32, freq: u32) -> Result<()> {
        if !self.in_term {
            return Err(QuiverError::invalid_operation("start_doc called outside of a term"));
        }
        if freq == 0 {
            return Err(QuiverError::invalid_operation(format!(
                "doc {doc} has frequency 0"
            )));
        }
        if doc == NO_MORE_DOCS {
            return Err(QuiverError::invalid_operation(format!(
                "doc id {doc} is reserved"
            )));
        }
        if let Some(last) = self.last_doc
            && doc <= last
        {
            return Err(QuiverError::invalid_operation(format!(
                "docs out of order: {doc} after {last}"
            )));
        }
        let prev = self.last_doc.unwrap_or(0);
        self.doc_deltas[self.buffered] = doc - prev;
        self.freqs[self.buffered] = freq;
        self.buffered += 1;
        self.last_doc = Some(doc);
        self.doc_freq += 1;
        self.total_term_freq += freq as u64;
        if self.buffered == BLOCK_SIZE {
            self.flush_block(doc)?;
        }
        Ok(())
    }

    fn flush_block(&mut self, last_doc: u32) -> Result<()> {
        self.block_buf.clear();
        for_util::write_block(&self.doc_deltas, &mut self.scratch, &mut self.block_buf)?;
        for_util::write_block(&self.freqs, &mut self.scratch, &mut self.block_buf)?;
        self.out.write_varint((last_doc - self.block_base) as u64)?;
        self.out.write_varint(self.block_buf.len() as u64)?;
        self.out.write_raw(&self.block_buf)?;
        self.block_base = last_doc;
        self.buffered = 0;
        Ok(())
    }

    /// Write the tail of the current term and return its metadata.
    pub fn finish_term(&mut self) -> Result<TermMeta> {
        if !self.in_term || self.doc_freq == 0 {
            return Err(QuiverError::invalid_operation("term has no postings"));
        }
        for i in 0..self.buffered {
            let (delta, freq) = (self.doc_deltas[i], self.freqs[i]);
            if freq == 1 {
                self.out.write_varint(((delta as u64) << 1) | 1)?;
            } else {
                self.out.write_varint((delta as u64) << 1)?;
                self.out.write_varint(freq as u64)?;
            }
        }
        self.buffered = 0;
        self.in_term = false;
        Ok(TermMeta {
            doc_freq: self.doc_freq,
            total_term_freq: self.total_term_freq,
            doc_start_fp: self.doc_start_fp,
        })
    }

    /// Bytes written so far, header included.
    pub fn position(&self) -> u64 {
        self.out.position()
    }

    /// Write the footer and close the file.
    pub fn finish(mut self) -> Result<()> {
        if self.in_term {
            return Err(QuiverError::invalid_operation("unfinished term in postings writer"));
        }
        codec_util::write_footer(&mut self.out)?;
        self.out.close()
    }
}

/// A verified `.doc` file.
#[derive(Debug, Clone)]
pub struct PostingsReader {
    data: Arc<[u8]>,
    name: Arc<str>,
}

impl PostingsReader {
    pub fn open(storage: &dyn Storage, name: &str) -> Result<Self> {
        let data = read_file(storage, name)?;
        codec_util::open_checked(&data, name, DOC_CODEC, DOC_VERSION, DOC_VERSION)?;
        trace!("opened postings {name}: {} bytes", data.len());
        Ok(PostingsReader {
            data,
            name: Arc::from(name),
        })
    }

    /// Postings of the term described by `meta`.
    pub fn postings(&self, meta: &TermMeta) -> Result<BlockPostingsEnum> {
        let limit = self.data.len() - codec_util::FOOTER_LENGTH;
        if meta.doc_start_fp as usize > limit {
            return Err(QuiverError::corruption(
                self.name.as_ref(),
                format!("postings pointer {} beyond file end", meta.doc_start_fp),
            ));
        }
        Ok(BlockPostingsEnum::new(self.data.clone(), self.name.clone(), meta))
    }
}

/// Iterates one term's postings, decoding a block at a time.
#[derive(Debug)]
pub struct BlockPostingsEnum {
    data: Arc<[u8]>,
    name: Arc<str>,
    pos: usize,
    doc_freq: u32,
    docs_read: u32,
    block_base: u32,
    docs: [u32; BLOCK_SIZE],
    freqs: [u32; BLOCK_SIZE],
    buffer_len: usize,
    buffer_idx: usize,
    doc: u32,
    freq: u32,
    started: bool,
    scratch: Box<[u32; MAX_ENCODED_WORDS]>,
}

impl BlockPostingsEnum {
    fn new(data: Arc<[u8]>, name: Arc<str>, meta: &TermMeta) -> Self {
        BlockPostingsEnum {
            data,
            name,
            pos: meta.doc_start_fp as usize,
            doc_freq: meta.doc_freq,
            docs_read: 0,
            block_base: 0,
            docs: [0; BLOCK_SIZE],
            freqs: [0; BLOCK_SIZE],
            buffer_len: 0,
            buffer_idx: 0,
            doc: NO_MORE_DOCS,
            freq: 0,
            started: false,
            scratch: Box::new([0; MAX_ENCODED_WORDS]),
        }
    }

    fn corrupt(&self, reason: String) -> QuiverError {
        QuiverError::corruption(self.name.as_ref(), reason)
    }

    fn refill(&mut self) -> Result<()> {
        let mut reader = ByteReader::at(&self.data, self.pos, &self.name)?;
        let remaining = self.doc_freq - self.docs_read;
        if remaining as usize >= BLOCK_SIZE {
            reader.read_varint()?;
            reader.read_varint()?;
            let mut deltas = [0u32; BLOCK_SIZE];
            for_util::read_block(&mut reader, &mut self.scratch, &mut deltas)?;
            for_util::read_block(&mut reader, &mut self.scratch, &mut self.freqs)?;
            let mut doc = self.block_base;
            for (slot, &delta) in self.docs.iter_mut().zip(deltas.iter()) {
                doc = doc
                    .checked_add(delta)
                    .ok_or_else(|| QuiverError::corruption(reader.resource(), "doc id overflow"))?;
                *slot = doc;
            }
            self.block_base = doc;
            self.buffer_len = BLOCK_SIZE;
        } else {
            let mut doc = self.block_base;
            for i in 0..remaining as usize {
                let code = reader.read_varint_u32()?;
                doc = doc
                    .checked_add(code >> 1)
                    .ok_or_else(|| QuiverError::corruption(reader.resource(), "doc id overflow"))?;
                self.docs[i] = doc;
                self.freqs[i] = if code & 1 == 1 {
                    1
                } else {
                    reader.read_varint_u32()?
                };
            }
            self.block_base = doc;
            self.buffer_len = remaining as usize;
        }
        self.docs_read += self.buffer_len as u32;
        self.buffer_idx = 0;
        self.pos = reader.position();
        Ok(())
    }

    /// Skip whole blocks whose last document is below `target`.
    fn skip_blocks(&mut self, target: u32) -> Result<()> {
        let mut skipped = 0;
        while (self.doc_freq - self.docs_read) as usize >= BLOCK_SIZE {
            let mut reader = ByteReader::at(&self.data, self.pos, &self.name)?;
            let last_delta = reader.read_varint_u32()?;
            let len = reader.read_len()?;
            let last = self.block_base.checked_add(last_delta).ok_or_else(|| {
                self.corrupt(format!("block skip overflows at offset {}", self.pos))
            })?;
            if last >= target {
                break;
            }
            reader.skip(len)?;
            self.pos = reader.position();
            self.block_base = last;
            self.docs_read += BLOCK_SIZE as u32;
            skipped += 1;
        }
        if skipped > 0 {
            trace!("skipped {skipped} postings blocks advancing to {target}");
        }
        Ok(())
    }
}

impl PostingsEnum for BlockPostingsEnum {
    fn doc_id(&self) -> u32 {
        self.doc
    }

    fn freq(&self) -> u32 {
        self.freq
    }

    fn next_doc(&mut self) -> Result<u32> {
        self.started = true;
        if self.buffer_idx == self.buffer_len {
            if self.docs_read == self.doc_freq {
                self.doc = NO_MORE_DOCS;
                self.freq = 0;
                return Ok(NO_MORE_DOCS);
            }
            self.refill()?;
        }
        self.doc = self.docs[self.buffer_idx];
        self.freq = self.freqs[self.buffer_idx];
        self.buffer_idx += 1;
        Ok(self.doc)
    }

    fn advance(&mut self, target: u32) -> Result<u32> {
        if self.started && self.doc >= target {
            return Ok(self.doc);
        }
        if self.buffer_idx < self.buffer_len && self.docs[self.buffer_len - 1] < target {
            self.buffer_idx = self.buffer_len;
        }
        if self.buffer_idx == self.buffer_len {
            self.skip_blocks(target)?;
        }
        loop {
            let doc = self.next_doc()?;
            if doc >= target {
                return Ok(doc);
            }
        }
    }

    fn cost(&self) -> u64 {
        self.doc_freq as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::MemoryStorage;
    use rand::{Rng, SeedableRng, rngs::StdRng};

    fn write_terms(storage: &MemoryStorage, terms: &[Vec<(u32, u32)>]) -> Vec<TermMeta> {
        let out = StructWriter::new(storage.create_output("_0.doc").unwrap());
        let mut writer = PostingsWriter::new(out).unwrap();
        let mut metas = Vec::new();
        for postings in terms {
            writer.start_term();
            for &(doc, freq) in postings {
                writer.start_doc(doc, freq).unwrap();
            }
            metas.push(writer.finish_term().unwrap());
        }
        writer.finish().unwrap();
        metas
    }

    fn random_postings(rng: &mut StdRng, n: usize) -> Vec<(u32, u32)> {
        let mut doc = 0u32;
        (0..n)
            .map(|i| {
                doc += if i == 0 { rng.random_range(0..5) } else { rng.random_range(1..20) };
                let freq = if rng.random_bool(0.6) { 1 } else { rng.random_range(1..50) };
                (doc, freq)
            })
            .collect()
    }

    #[test]
    fn test_round_trip_across_blocks() {
        let mut rng = StdRng::seed_from_u64(11);
        let terms: Vec<Vec<(u32, u32)>> = [1, 127, 128, 129, 300, 5]
            .iter()
            .map(|&n| random_postings(&mut rng, n))
            .collect();
        let storage = MemoryStorage::default();
        let metas = write_terms(&storage, &terms);
        let reader = PostingsReader::open(&storage, "_0.doc").unwrap();

        for (postings, meta) in terms.iter().zip(&metas) {
            assert_eq!(meta.doc_freq as usize, postings.len());
            assert_eq!(
                meta.total_term_freq,
                postings.iter().map(|&(_, f)| f as u64).sum::<u64>()
            );
            let mut e = reader.postings(meta).unwrap();
            for &(doc, freq) in postings {
                assert_eq!(e.next_doc().unwrap(), doc);
                assert_eq!(e.freq(), freq);
            }
            assert_eq!(e.next_doc().unwrap(), NO_MORE_DOCS);
            assert_eq!(e.next_doc().unwrap(), NO_MORE_DOCS);
        }
    }

    #[test]
    fn test_advance_skips_blocks() {
        let docs: Vec<(u32, u32)> = (0..1000u32).map(|i| (i * 3, 1 + i % 4)).collect();
        let storage = MemoryStorage::default();
        let metas = write_terms(&storage, std::slice::from_ref(&docs));
        let reader = PostingsReader::open(&storage, "_0.doc").unwrap();

        let mut e = reader.postings(&metas[0]).unwrap();
        assert_eq!(e.advance(0).unwrap(), 0);
        // already there
        assert_eq!(e.advance(0).unwrap(), 0);
        assert_eq!(e.advance(1).unwrap(), 3);
        assert_eq!(e.advance(1000).unwrap(), 1002);
        assert_eq!(e.freq(), 1 + 334 % 4);
        assert_eq!(e.next_doc().unwrap(), 1005);
        assert_eq!(e.advance(2997).unwrap(), 2997);
        assert_eq!(e.advance(2998).unwrap(), NO_MORE_DOCS);
        assert_eq!(e.cost(), 1000);

        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..50 {
            let mut e = reader.postings(&metas[0]).unwrap();
            let mut target = 0u32;
            loop {
                target += rng.random_range(1..400);
                let got = e.advance(target).unwrap();
                let expected = docs
                    .iter()
                    .map(|&(d, _)| d)
                    .find(|&d| d >= target)
                    .unwrap_or(NO_MORE_DOCS);
                assert_eq!(got, expected);
                if got == NO_MORE_DOCS {
                    break;
                }
                target = got;
            }
        }
    }

    #[test]
    fn test_writer_misuse() {
        let storage = MemoryStorage::default();
        let out = StructWriter::new(storage.create_output("x.doc").unwrap());
        let mut writer = PostingsWriter::new(out).unwrap();
        assert!(writer.start_doc(1, 1).is_err());
        writer.start_term();
        writer.start_doc(5, 1).unwrap();
        assert!(writer.start_doc(5, 1).is_err());
        assert!(writer.start_doc(6, 0).is_err());
        writer.finish_term().unwrap();
        writer.start_term();
        assert!(writer.finish_term().is_err());
    }

    #[test]
    fn test_corrupt_file_rejected() {
        let storage = MemoryStorage::default();
        write_terms(&storage, &[vec![(1, 1), (2, 2)]]);
        let mut bytes = storage.get_file("_0.doc").unwrap().to_vec();
        let last = bytes.len() - 1;
        bytes[last] ^= 1;
        storage.put_file("_0.doc", bytes);
        assert!(PostingsReader::open(&storage, "_0.doc").unwrap_err().is_corruption());
    }
}
