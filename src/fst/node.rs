//! Byte layout of frozen FST nodes.
//!
//! ```text
//! node   := flags:u8 [final_output] vint(num_arcs) arcs
//! arcs   := arc*                                   (variable layout)
//!         | vint(arc_width) (arc padded to width)* (fixed layout)
//! arc    := label:u8 arc_flags:u8 [output] vlong(node_addr - target)
//! ```
//!
//! Nodes are written children first, so every target lies below the address
//! of the node that points to it. Nodes with many arcs use the fixed layout,
//! which allows binary search on the label.

use crate::error::{QuiverError, Result};
use crate::fst::outputs::Output;
use crate::storage::structured::ByteReader;
use crate::util::varint;

pub(crate) const FLAG_FINAL: u8 = 1;
pub(crate) const FLAG_HAS_FINAL_OUTPUT: u8 = 1 << 1;
pub(crate) const FLAG_FIXED_ARCS: u8 = 1 << 2;

pub(crate) const ARC_HAS_OUTPUT: u8 = 1;

/// Minimum arc count for the fixed-width layout.
pub(crate) const FIXED_ARCS_THRESHOLD: usize = 6;

/// Address of the final node with no arcs and no output.
pub const EMPTY_FINAL_ADDRESS: usize = 0;

const RESOURCE: &str = "fst";

/// A labelled edge between two nodes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Transition<O> {
    pub label: u8,
    pub output: O,
    pub target: usize,
}

#[derive(Debug, Clone, Copy)]
enum ArcLayout {
    Variable,
    Fixed { width: usize },
}

/// A decoded node header. Arcs are decoded lazily.
#[derive(Debug, Clone)]
pub struct Node<O> {
    addr: usize,
    is_final: bool,
    final_output: O,
    num_arcs: usize,
    arcs_start: usize,
    layout: ArcLayout,
}

impl<O: Output> Node<O> {
    /// Decode the node at `addr`.
    pub fn read(data: &[u8], addr: usize) -> Result<Self> {
        let mut reader = ByteReader::at(data, addr, RESOURCE)?;
        let flags = reader.read_u8()?;
        let final_output = if flags & FLAG_HAS_FINAL_OUTPUT != 0 {
            O::decode(&mut reader)?
        } else {
            O::zero()
        };
        let num_arcs = reader.read_len()?;
        let layout = if flags & FLAG_FIXED_ARCS != 0 {
            let width = reader.read_len()?;
            if width < 3 {
                return Err(QuiverError::corruption(
                    RESOURCE,
                    format!("invalid arc width {width} at node {addr}"),
                ));
            }
            ArcLayout::Fixed { width }
        } else {
            ArcLayout::Variable
        };
        Ok(Node {
            addr,
            is_final: flags & FLAG_FINAL != 0,
            final_output,
            num_arcs,
            arcs_start: reader.position(),
            layout,
        })
    }

    pub fn addr(&self) -> usize {
        self.addr
    }

    pub fn is_final(&self) -> bool {
        self.is_final
    }

    pub fn final_output(&self) -> &O {
        &self.final_output
    }

    pub fn num_arcs(&self) -> usize {
        self.num_arcs
    }

    fn read_arc(&self, data: &[u8], pos: usize) -> Result<(Transition<O>, usize)> {
        let mut reader = ByteReader::at(data, pos, RESOURCE)?;
        let label = reader.read_u8()?;
        let flags = reader.read_u8()?;
        let output = if flags & ARC_HAS_OUTPUT != 0 {
            O::decode(&mut reader)?
        } else {
            O::zero()
        };
        let delta = reader.read_varint()? as usize;
        let target = self
            .addr
            .checked_sub(delta)
            .filter(|_| delta > 0)
            .ok_or_else(|| {
                QuiverError::corruption(
                    RESOURCE,
                    format!("arc target delta {delta} invalid at node {}", self.addr),
                )
            })?;
        Ok((
            Transition {
                label,
                output,
                target,
            },
            reader.position(),
        ))
    }

    /// The arc labelled `label`, if any.
    pub fn find(&self, data: &[u8], label: u8) -> Result<Option<Transition<O>>> {
        match self.layout {
            ArcLayout::Fixed { width } => {
                let (mut lo, mut hi) = (0usize, self.num_arcs);
                while lo < hi {
                    let mid = (lo + hi) / 2;
                    let pos = self.arcs_start + mid * width;
                    let found = *data.get(pos).ok_or_else(|| {
                        QuiverError::corruption(RESOURCE, format!("arc {mid} out of bounds"))
                    })?;
                    if found < label {
                        lo = mid + 1;
                    } else if found > label {
                        hi = mid;
                    } else {
                        return self.read_arc(data, pos).map(|(t, _)| Some(t));
                    }
                }
                Ok(None)
            }
            ArcLayout::Variable => {
                let mut pos = self.arcs_start;
                for _ in 0..self.num_arcs {
                    let (t, next) = self.read_arc(data, pos)?;
                    if t.label == label {
                        return Ok(Some(t));
                    }
                    if t.label > label {
                        break;
                    }
                    pos = next;
                }
                Ok(None)
            }
        }
    }

    /// All arcs, in label order.
    pub fn transitions(&self, data: &[u8]) -> Result<Vec<Transition<O>>> {
        let mut arcs = Vec::with_capacity(self.num_arcs);
        let mut pos = self.arcs_start;
        for i in 0..self.num_arcs {
            if let ArcLayout::Fixed { width } = self.layout {
                pos = self.arcs_start + i * width;
            }
            let (t, next) = self.read_arc(data, pos)?;
            arcs.push(t);
            pos = next;
        }
        Ok(arcs)
    }

    /// The arc with the largest label.
    pub fn last_transition(&self, data: &[u8]) -> Result<Option<Transition<O>>> {
        match self.layout {
            ArcLayout::Fixed { width } if self.num_arcs > 0 => {
                let pos = self.arcs_start + (self.num_arcs - 1) * width;
                self.read_arc(data, pos).map(|(t, _)| Some(t))
            }
            _ => Ok(self.transitions(data)?.pop()),
        }
    }
}

/// Append the encoding of a node to `arena`; returns its address.
pub(crate) fn write_node<O: Output>(
    arena: &mut Vec<u8>,
    is_final: bool,
    final_output: &O,
    arcs: &[Transition<O>],
) -> usize {
    let addr = arena.len();

    let mut encoded: Vec<Vec<u8>> = Vec::with_capacity(arcs.len());
    for arc in arcs {
        debug_assert!(arc.target < addr);
        let mut buf = Vec::with_capacity(8);
        buf.push(arc.label);
        if arc.output.is_zero() {
            buf.push(0);
        } else {
            buf.push(ARC_HAS_OUTPUT);
            arc.output.encode(&mut buf);
        }
        varint::push_u64(&mut buf, (addr - arc.target) as u64);
        encoded.push(buf);
    }

    let fixed = arcs.len() >= FIXED_ARCS_THRESHOLD;
    let mut flags = 0u8;
    if is_final {
        flags |= FLAG_FINAL;
    }
    if !final_output.is_zero() {
        flags |= FLAG_HAS_FINAL_OUTPUT;
    }
    if fixed {
        flags |= FLAG_FIXED_ARCS;
    }
    arena.push(flags);
    if !final_output.is_zero() {
        final_output.encode(arena);
    }
    varint::push_u64(arena, arcs.len() as u64);
    if fixed {
        let width = encoded.iter().map(Vec::len).max().unwrap_or(0);
        varint::push_u64(arena, width as u64);
        for arc in &encoded {
            arena.extend_from_slice(arc);
            arena.resize(arena.len() + width - arc.len(), 0);
        }
    } else {
        for arc in &encoded {
            arena.extend_from_slice(arc);
        }
    }
    addr
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arena_with_leaf() -> Vec<u8> {
        let mut arena = Vec::new();
        write_node::<u64>(&mut arena, true, &0, &[]);
        arena
    }

    #[test]
    fn test_variable_node() {
        let mut arena = arena_with_leaf();
        let arcs = vec![
            Transition { label: b'a', output: 5u64, target: 0 },
            Transition { label: b'c', output: 0, target: 0 },
        ];
        let addr = write_node(&mut arena, false, &0u64, &arcs);
        let node = Node::<u64>::read(&arena, addr).unwrap();
        assert!(!node.is_final());
        assert_eq!(node.num_arcs(), 2);
        assert_eq!(node.find(&arena, b'a').unwrap(), Some(arcs[0].clone()));
        assert_eq!(node.find(&arena, b'b').unwrap(), None);
        assert_eq!(node.transitions(&arena).unwrap(), arcs);
        assert_eq!(node.last_transition(&arena).unwrap(), Some(arcs[1].clone()));
    }

    #[test]
    fn test_fixed_node() {
        let mut arena = arena_with_leaf();
        let arcs: Vec<Transition<u64>> = (0..10u8)
            .map(|i| Transition {
                label: b'a' + 2 * i,
                output: if i % 3 == 0 { 1000 * i as u64 } else { 0 },
                target: 0,
            })
            .collect();
        let addr = write_node(&mut arena, true, &7u64, &arcs);
        let node = Node::<u64>::read(&arena, addr).unwrap();
        assert!(node.is_final());
        assert_eq!(*node.final_output(), 7);
        for arc in &arcs {
            assert_eq!(node.find(&arena, arc.label).unwrap().as_ref(), Some(arc));
            assert_eq!(node.find(&arena, arc.label + 1).unwrap(), None);
        }
        assert_eq!(node.transitions(&arena).unwrap(), arcs);
        assert_eq!(node.last_transition(&arena).unwrap(), arcs.last().cloned());
    }

    #[test]
    fn test_truncated_node_is_corruption() {
        let mut arena = arena_with_leaf();
        let arcs = vec![Transition { label: b'x', output: 1u64, target: 0 }];
        let addr = write_node(&mut arena, false, &0u64, &arcs);
        arena.truncate(arena.len() - 1);
        let node = Node::<u64>::read(&arena, addr).unwrap();
        let err = node.transitions(&arena).unwrap_err();
        assert!(err.is_corruption());
    }
}
