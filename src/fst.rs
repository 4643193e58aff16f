//! Finite state transducers over byte keys.
//!
//! An [`Fst`] maps a sorted set of byte strings to [`Output`] values. It is
//! built once with an [`FstBuilder`] and is immutable afterwards: the frozen
//! nodes live in one shared byte buffer and are decoded on the fly, so a
//! loaded FST needs no deserialization before lookups.
//!
//! ```
//! use quiver::fst::FstBuilder;
//!
//! # fn main() -> quiver::error::Result<()> {
//! let mut builder = FstBuilder::<u64>::new();
//! builder.insert(b"mon", 1)?;
//! builder.insert(b"tue", 2)?;
//! let fst = builder.finish()?;
//! assert_eq!(fst.get(b"tue")?, Some(2));
//! assert_eq!(fst.get(b"wed")?, None);
//! # Ok(())
//! # }
//! ```

use std::marker::PhantomData;
use std::sync::Arc;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::codec::codec_util;
use crate::error::{QuiverError, Result};
use crate::storage::structured::{ByteReader, StructWriter};
use crate::storage::{Storage, StorageOutput, read_file};

pub mod builder;
pub mod enumerator;
pub mod intersect;
pub mod node;
pub mod outputs;

pub use builder::FstBuilder;
pub use enumerator::FstEnum;
pub use node::{Node, Transition};
pub use outputs::Output;

/// Codec name written in the header of a standalone FST file.
pub const FST_CODEC: &str = "QuiverFST";

/// Current FST file version.
pub const FST_VERSION: u32 = 1;

/// Size figures of a frozen FST.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FstStats {
    pub num_keys: usize,
    pub node_count: usize,
    pub arc_count: usize,
    pub size_bytes: usize,
}

/// An immutable transducer.
#[derive(Debug, Clone)]
pub struct Fst<O: Output> {
    data: Arc<[u8]>,
    root: usize,
    len: usize,
    node_count: usize,
    arc_count: usize,
    _output: PhantomData<O>,
}

impl<O: Output> Fst<O> {
    pub(crate) fn from_parts(
        data: Arc<[u8]>,
        root: usize,
        len: usize,
        node_count: usize,
        arc_count: usize,
    ) -> Self {
        Fst {
            data,
            root,
            len,
            node_count,
            arc_count,
            _output: PhantomData,
        }
    }

    /// Number of keys.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn node_count(&self) -> usize {
        self.node_count
    }

    pub fn arc_count(&self) -> usize {
        self.arc_count
    }

    /// Size of the node arena in bytes.
    pub fn size_bytes(&self) -> usize {
        self.data.len()
    }

    pub fn stats(&self) -> FstStats {
        FstStats {
            num_keys: self.len,
            node_count: self.node_count,
            arc_count: self.arc_count,
            size_bytes: self.data.len(),
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn root(&self) -> Result<Node<O>> {
        Node::read(&self.data, self.root)
    }

    pub fn node(&self, addr: usize) -> Result<Node<O>> {
        Node::read(&self.data, addr)
    }

    /// Output of `key`, or `None` when the key is absent.
    pub fn get(&self, key: &[u8]) -> Result<Option<O>> {
        let mut node = self.root()?;
        let mut output = O::zero();
        for &label in key {
            let Some(arc) = node.find(&self.data, label)? else {
                return Ok(None);
            };
            output = output.concat(&arc.output);
            node = self.node(arc.target)?;
        }
        if !node.is_final() {
            return Ok(None);
        }
        Ok(Some(output.concat(node.final_output())))
    }

    pub fn contains_key(&self, key: &[u8]) -> Result<bool> {
        Ok(self.get(key)?.is_some())
    }

    /// The longest key that is a prefix of `input`, as `(length, output)`.
    pub fn longest_prefix(&self, input: &[u8]) -> Result<Option<(usize, O)>> {
        let mut node = self.root()?;
        let mut output = O::zero();
        let mut best = node
            .is_final()
            .then(|| (0, output.concat(node.final_output())));
        for (i, &label) in input.iter().enumerate() {
            let Some(arc) = node.find(&self.data, label)? else {
                break;
            };
            output = output.concat(&arc.output);
            node = self.node(arc.target)?;
            if node.is_final() {
                best = Some((i + 1, output.concat(node.final_output())));
            }
        }
        Ok(best)
    }

    /// A cursor over the keys in sorted order.
    pub fn enumerator(&self) -> FstEnum<'_, O> {
        FstEnum::new(self)
    }

    /// Every key and output, in order.
    pub fn entries(&self) -> Result<Vec<(Vec<u8>, O)>> {
        let mut out = Vec::with_capacity(self.len);
        let mut e = self.enumerator();
        while let Some((key, output)) = e.next()? {
            out.push((key.to_vec(), output));
        }
        Ok(out)
    }

    /// Serialize into an open file body.
    pub fn write_to<W: StorageOutput>(&self, out: &mut StructWriter<W>) -> Result<()> {
        out.write_varint(self.root as u64)?;
        out.write_varint(self.len as u64)?;
        out.write_varint(self.node_count as u64)?;
        out.write_varint(self.arc_count as u64)?;
        out.write_bytes(&self.data)
    }

    /// Deserialize what [`Fst::write_to`] wrote.
    pub fn read_from(input: &mut ByteReader<'_>) -> Result<Self> {
        let root = input.read_len()?;
        let len = input.read_varint()? as usize;
        let node_count = input.read_varint()? as usize;
        let arc_count = input.read_varint()? as usize;
        let data: Arc<[u8]> = Arc::from(input.read_bytes()?);
        if root >= data.len() {
            return Err(QuiverError::corruption(
                input.resource(),
                format!("FST root {root} outside of {} byte arena", data.len()),
            ));
        }
        let fst = Fst::from_parts(data, root, len, node_count, arc_count);
        fst.root()?;
        Ok(fst)
    }

    /// Write this FST to its own checksummed file.
    pub fn save(&self, storage: &dyn Storage, name: &str) -> Result<()> {
        let mut out = StructWriter::new(storage.create_output(name)?);
        codec_util::write_header(&mut out, FST_CODEC, FST_VERSION)?;
        self.write_to(&mut out)?;
        codec_util::write_footer(&mut out)?;
        out.close()?;
        debug!("saved FST {name}: {} keys", self.len);
        Ok(())
    }

    /// Load an FST written by [`Fst::save`].
    pub fn load(storage: &dyn Storage, name: &str) -> Result<Self> {
        let data = read_file(storage, name)?;
        let (_, mut body) =
            codec_util::open_checked(&data, name, FST_CODEC, FST_VERSION, FST_VERSION)?;
        let fst = Self::read_from(&mut body)?;
        if !body.is_eof() {
            return Err(QuiverError::corruption(
                name,
                format!("{} trailing bytes after FST", body.remaining()),
            ));
        }
        Ok(fst)
    }
}
