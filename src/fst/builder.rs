//! Incremental construction of a minimal FST from sorted keys.
//!
//! The builder keeps a stack of unfinished nodes mirroring the previous key.
//! When a key arrives, the part of the stack past the common prefix can no
//! longer change: it is frozen bottom-up, each node being deduplicated
//! against a registry of already written nodes. Outputs are kept as close to
//! the root as possible by moving the common part of conflicting outputs up
//! the shared prefix.

use std::marker::PhantomData;
use std::sync::Arc;

use ahash::AHashMap;
use log::debug;

use crate::error::{QuiverError, Result};
use crate::fst::Fst;
use crate::fst::node::{EMPTY_FINAL_ADDRESS, Transition, write_node};
use crate::fst::outputs::Output;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct BuilderNode<O> {
    is_final: bool,
    final_output: O,
    arcs: Vec<Transition<O>>,
}

impl<O: Output> BuilderNode<O> {
    fn new(is_final: bool) -> Self {
        BuilderNode {
            is_final,
            final_output: O::zero(),
            arcs: Vec::new(),
        }
    }
}

#[derive(Debug)]
struct LastArc<O> {
    label: u8,
    output: O,
}

#[derive(Debug)]
struct UnfinishedNode<O> {
    node: BuilderNode<O>,
    last: Option<LastArc<O>>,
}

impl<O: Output> UnfinishedNode<O> {
    fn new(is_final: bool) -> Self {
        UnfinishedNode {
            node: BuilderNode::new(is_final),
            last: None,
        }
    }

    /// Freeze the pending arc, now that its target has an address.
    fn freeze_last(&mut self, target: usize) {
        if let Some(last) = self.last.take() {
            self.node.arcs.push(Transition {
                label: last.label,
                output: last.output,
                target,
            });
        }
    }

    fn prepend_output(&mut self, prefix: &O) {
        if self.node.is_final {
            self.node.final_output = prefix.concat(&self.node.final_output);
        }
        for arc in &mut self.node.arcs {
            arc.output = prefix.concat(&arc.output);
        }
        if let Some(last) = &mut self.last {
            last.output = prefix.concat(&last.output);
        }
    }
}

/// Builds an [`Fst`] from keys added in strictly increasing byte order.
///
/// Any ordering violation poisons the builder: the failing call and every
/// later call return [`QuiverError::InvalidOperation`].
pub struct FstBuilder<O: Output> {
    arena: Vec<u8>,
    registry: AHashMap<BuilderNode<O>, usize>,
    stack: Vec<UnfinishedNode<O>>,
    last_key: Option<Vec<u8>>,
    len: usize,
    node_count: usize,
    arc_count: usize,
    poisoned: bool,
    _output: PhantomData<O>,
}

impl<O: Output> Default for FstBuilder<O> {
    fn default() -> Self {
        Self::new()
    }
}

impl<O: Output> FstBuilder<O> {
    pub fn new() -> Self {
        let mut arena = Vec::new();
        let addr = write_node::<O>(&mut arena, true, &O::zero(), &[]);
        debug_assert_eq!(addr, EMPTY_FINAL_ADDRESS);
        FstBuilder {
            arena,
            registry: AHashMap::new(),
            stack: vec![UnfinishedNode::new(false)],
            last_key: None,
            len: 0,
            node_count: 1,
            arc_count: 0,
            poisoned: false,
            _output: PhantomData,
        }
    }

    /// Number of keys added so far.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Add `key` with `output`. Keys must be strictly increasing.
    pub fn insert(&mut self, key: &[u8], output: O) -> Result<()> {
        if self.poisoned {
            return Err(QuiverError::invalid_operation(
                "FST builder is unusable after a failed insert",
            ));
        }
        if let Some(last) = &self.last_key
            && key <= last.as_slice()
        {
            self.poisoned = true;
            return Err(QuiverError::invalid_operation(format!(
                "keys must be added in strictly increasing order: {:?} after {:?}",
                String::from_utf8_lossy(key),
                String::from_utf8_lossy(last)
            )));
        }
        self.last_key = Some(key.to_vec());
        self.len += 1;

        if key.is_empty() {
            let root = &mut self.stack[0].node;
            root.is_final = true;
            root.final_output = output;
            return Ok(());
        }

        let (prefix_len, output) = self.find_common_prefix_and_set_output(key, output);
        self.compile_from(prefix_len);
        self.add_suffix(&key[prefix_len..], output);
        Ok(())
    }

    /// Walk the shared prefix of `key` and the previous key, keeping on each
    /// arc only the part of its output shared with `output`. Returns the
    /// prefix length and what is left of `output`.
    fn find_common_prefix_and_set_output(&mut self, key: &[u8], mut output: O) -> (usize, O) {
        let mut i = 0;
        while i < key.len() {
            let pushed_down = match &mut self.stack[i].last {
                Some(last) if last.label == key[i] => {
                    let common = last.output.common(&output);
                    let pushed_down = last.output.subtract(&common);
                    output = output.subtract(&common);
                    last.output = common;
                    pushed_down
                }
                _ => break,
            };
            i += 1;
            if !pushed_down.is_zero() {
                self.stack[i].prepend_output(&pushed_down);
            }
        }
        (i, output)
    }

    /// Freeze every unfinished node deeper than `depth`.
    fn compile_from(&mut self, depth: usize) {
        let mut addr = None;
        while depth + 1 < self.stack.len() {
            let Some(mut top) = self.stack.pop() else {
                break;
            };
            if let Some(addr) = addr {
                top.freeze_last(addr);
            }
            addr = Some(self.compile(top.node));
        }
        if let (Some(addr), Some(top)) = (addr, self.stack.last_mut()) {
            top.freeze_last(addr);
        }
    }

    fn add_suffix(&mut self, suffix: &[u8], output: O) {
        let Some((&first, rest)) = suffix.split_first() else {
            return;
        };
        if let Some(top) = self.stack.last_mut() {
            debug_assert!(top.last.is_none());
            top.last = Some(LastArc {
                label: first,
                output,
            });
        }
        for &label in rest {
            let mut node = UnfinishedNode::new(false);
            node.last = Some(LastArc {
                label,
                output: O::zero(),
            });
            self.stack.push(node);
        }
        self.stack.push(UnfinishedNode::new(true));
    }

    fn compile(&mut self, node: BuilderNode<O>) -> usize {
        if node.is_final && node.arcs.is_empty() && node.final_output.is_zero() {
            return EMPTY_FINAL_ADDRESS;
        }
        if let Some(&addr) = self.registry.get(&node) {
            return addr;
        }
        let addr = write_node(&mut self.arena, node.is_final, &node.final_output, &node.arcs);
        self.node_count += 1;
        self.arc_count += node.arcs.len();
        self.registry.insert(node, addr);
        addr
    }

    /// Freeze the remaining nodes and return the finished transducer.
    pub fn finish(mut self) -> Result<Fst<O>> {
        if self.poisoned {
            return Err(QuiverError::invalid_operation(
                "cannot finish an FST builder after a failed insert",
            ));
        }
        self.compile_from(0);
        let root = self
            .stack
            .pop()
            .ok_or_else(|| QuiverError::other("FST builder lost its root node"))?;
        let root_addr = write_node(
            &mut self.arena,
            root.node.is_final,
            &root.node.final_output,
            &root.node.arcs,
        );
        self.node_count += 1;
        self.arc_count += root.node.arcs.len();
        debug!(
            "finished FST: {} keys, {} nodes, {} arcs, {} bytes",
            self.len,
            self.node_count,
            self.arc_count,
            self.arena.len()
        );
        Ok(Fst::from_parts(
            Arc::from(self.arena),
            root_addr,
            self.len,
            self.node_count,
            self.arc_count,
        ))
    }
}
