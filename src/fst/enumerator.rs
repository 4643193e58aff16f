//! Ordered cursor over the keys of an [`Fst`].

use crate::error::Result;
use crate::fst::node::Transition;
use crate::fst::outputs::Output;
use crate::fst::Fst;

#[derive(Debug)]
struct Frame<O> {
    arcs: Vec<Transition<O>>,
    /// Arc followed out of this node. For the deepest frame this is the last
    /// arc explored, which is not part of the current key.
    arc: Option<usize>,
    is_final: bool,
    final_output: O,
    /// Output accumulated on the path into this node.
    output: O,
}

/// A cursor over `(key, output)` pairs in byte order.
///
/// The cursor starts unpositioned; [`FstEnum::next`] moves to the first key.
/// The seek methods may be called at any time and reposition the cursor.
pub struct FstEnum<'a, O: Output> {
    fst: &'a Fst<O>,
    // key.len() == stack.len() - 1 while positioned
    stack: Vec<Frame<O>>,
    key: Vec<u8>,
    output: O,
    started: bool,
}

impl<'a, O: Output> FstEnum<'a, O> {
    pub fn new(fst: &'a Fst<O>) -> Self {
        FstEnum {
            fst,
            stack: Vec::new(),
            key: Vec::new(),
            output: O::zero(),
            started: false,
        }
    }

    /// The current key; empty before the first call or after exhaustion.
    pub fn key(&self) -> &[u8] {
        &self.key
    }

    pub fn output(&self) -> &O {
        &self.output
    }

    fn push_frame(&mut self, addr: usize, output: O) -> Result<()> {
        let node = self.fst.node(addr)?;
        let arcs = node.transitions(self.fst.data())?;
        self.stack.push(Frame {
            arcs,
            arc: None,
            is_final: node.is_final(),
            final_output: node.final_output().clone(),
            output,
        });
        Ok(())
    }

    fn reset(&mut self) -> Result<()> {
        self.stack.clear();
        self.key.clear();
        self.started = true;
        let root = self.fst.root()?;
        self.push_frame(root.addr(), O::zero())
    }

    /// Follow arc `idx` of the deepest frame.
    fn descend(&mut self, idx: usize) -> Result<()> {
        let Some(top) = self.stack.last_mut() else {
            return Ok(());
        };
        top.arc = Some(idx);
        let arc = top.arcs[idx].clone();
        let output = top.output.concat(&arc.output);
        self.key.push(arc.label);
        self.push_frame(arc.target, output)
    }

    fn hit(&mut self) -> Option<(&[u8], O)> {
        let top = self.stack.last()?;
        self.output = top.output.concat(&top.final_output);
        Some((&self.key, self.output.clone()))
    }

    fn exhausted(&mut self) -> Option<(&[u8], O)> {
        self.stack.clear();
        self.key.clear();
        self.output = O::zero();
        None
    }

    /// Move to the smallest key in the deepest frame's subtree, starting at
    /// the current node.
    fn first_from_top(&mut self) -> Result<bool> {
        loop {
            let Some(top) = self.stack.last() else {
                return Ok(false);
            };
            if top.is_final {
                return Ok(true);
            }
            if top.arcs.is_empty() {
                return self.advance();
            }
            self.descend(0)?;
        }
    }

    /// Move to the next key after everything already explored below the
    /// deepest frame.
    fn advance(&mut self) -> Result<bool> {
        loop {
            let Some(top) = self.stack.last() else {
                return Ok(false);
            };
            let next = top.arc.map_or(0, |i| i + 1);
            if next < top.arcs.len() {
                self.descend(next)?;
                return self.first_from_top();
            }
            self.stack.pop();
            self.key.pop();
        }
    }

    /// Advance to the next key.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> Result<Option<(&[u8], O)>> {
        let found = if !self.started {
            self.reset()?;
            self.first_from_top()?
        } else if self.stack.is_empty() {
            false
        } else {
            self.advance()?
        };
        Ok(if found { self.hit() } else { self.exhausted() })
    }

    /// Position on the smallest key `>= target`.
    pub fn seek_ceil(&mut self, target: &[u8]) -> Result<Option<(&[u8], O)>> {
        self.reset()?;
        for &label in target {
            let Some(top) = self.stack.last_mut() else {
                break;
            };
            let idx = top.arcs.partition_point(|a| a.label < label);
            if idx == top.arcs.len() {
                top.arc = Some(idx);
                let found = self.advance()?;
                return Ok(if found { self.hit() } else { self.exhausted() });
            }
            let exact = top.arcs[idx].label == label;
            self.descend(idx)?;
            if !exact {
                let found = self.first_from_top()?;
                return Ok(if found { self.hit() } else { self.exhausted() });
            }
        }
        // the whole target is a path; take it or its first extension
        let found = self.first_from_top()?;
        Ok(if found { self.hit() } else { self.exhausted() })
    }

    /// Position on the largest key `<= target`.
    pub fn seek_floor(&mut self, target: &[u8]) -> Result<Option<(&[u8], O)>> {
        let Some(floor) = self.floor_key(target)? else {
            self.started = true;
            return Ok(self.exhausted());
        };
        self.seek_ceil(&floor)
    }

    /// Position on `target` if present.
    pub fn seek_exact(&mut self, target: &[u8]) -> Result<Option<(&[u8], O)>> {
        let found = matches!(self.seek_ceil(target)?, Some((key, _)) if key == target);
        Ok(if found { self.hit() } else { None })
    }

    /// The largest key `<= target`, found by remembering the deepest point
    /// where the path could branch below the target.
    fn floor_key(&self, target: &[u8]) -> Result<Option<Vec<u8>>> {
        let data = self.fst.data();
        let mut node = self.fst.root()?;
        // (depth, label of a smaller arc at that depth, or None for the
        // prefix itself)
        let mut best: Option<(usize, Option<(u8, usize)>)> = None;
        for (depth, &label) in target.iter().enumerate() {
            let arcs = node.transitions(data)?;
            let idx = arcs.partition_point(|a| a.label < label);
            if idx > 0 {
                let smaller = &arcs[idx - 1];
                best = Some((depth, Some((smaller.label, smaller.target))));
            } else if node.is_final() {
                best = Some((depth, None));
            }
            match arcs.get(idx) {
                Some(arc) if arc.label == label => node = self.fst.node(arc.target)?,
                _ => return self.build_floor(target, best),
            }
        }
        if node.is_final() {
            return Ok(Some(target.to_vec()));
        }
        self.build_floor(target, best)
    }

    fn build_floor(
        &self,
        target: &[u8],
        best: Option<(usize, Option<(u8, usize)>)>,
    ) -> Result<Option<Vec<u8>>> {
        let Some((depth, branch)) = best else {
            return Ok(None);
        };
        let mut key = target[..depth].to_vec();
        let Some((label, mut addr)) = branch else {
            return Ok(Some(key));
        };
        key.push(label);
        // the largest key below a node follows the last arc to its end
        loop {
            let node = self.fst.node(addr)?;
            match node.last_transition(self.fst.data())? {
                Some(arc) => {
                    key.push(arc.label);
                    addr = arc.target;
                }
                None => return Ok(Some(key)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fst::FstBuilder;

    fn build(keys: &[&str]) -> Fst<u64> {
        let mut builder = FstBuilder::new();
        for (i, k) in keys.iter().enumerate() {
            builder.insert(k.as_bytes(), i as u64 * 10).unwrap();
        }
        builder.finish().unwrap()
    }

    fn owned(r: Option<(&[u8], u64)>) -> Option<(String, u64)> {
        r.map(|(k, v)| (String::from_utf8(k.to_vec()).unwrap(), v))
    }

    #[test]
    fn test_next_in_order() {
        let keys = ["", "a", "ab", "abc", "b", "bcd", "c"];
        let fst = build(&keys);
        let mut e = fst.enumerator();
        for (i, k) in keys.iter().enumerate() {
            assert_eq!(owned(e.next().unwrap()), Some((k.to_string(), i as u64 * 10)));
        }
        assert_eq!(owned(e.next().unwrap()), None);
        assert_eq!(owned(e.next().unwrap()), None);
    }

    #[test]
    fn test_seek_ceil() {
        let fst = build(&["apple", "apply", "banana", "band", "can"]);
        let mut e = fst.enumerator();
        assert_eq!(owned(e.seek_ceil(b"apply").unwrap()), Some(("apply".into(), 10)));
        assert_eq!(owned(e.seek_ceil(b"app").unwrap()), Some(("apple".into(), 0)));
        assert_eq!(owned(e.seek_ceil(b"applz").unwrap()), Some(("banana".into(), 20)));
        assert_eq!(owned(e.seek_ceil(b"bananas").unwrap()), Some(("band".into(), 30)));
        assert_eq!(owned(e.next().unwrap()), Some(("can".into(), 40)));
        assert_eq!(owned(e.seek_ceil(b"").unwrap()), Some(("apple".into(), 0)));
        assert_eq!(owned(e.seek_ceil(b"d").unwrap()), None);
    }

    #[test]
    fn test_seek_floor() {
        let fst = build(&["apple", "apply", "banana", "band", "can"]);
        let mut e = fst.enumerator();
        assert_eq!(owned(e.seek_floor(b"apply").unwrap()), Some(("apply".into(), 10)));
        assert_eq!(owned(e.seek_floor(b"applz").unwrap()), Some(("apply".into(), 10)));
        assert_eq!(owned(e.seek_floor(b"bananas").unwrap()), Some(("banana".into(), 20)));
        assert_eq!(owned(e.seek_floor(b"zzz").unwrap()), Some(("can".into(), 40)));
        assert_eq!(owned(e.seek_floor(b"b").unwrap()), Some(("apply".into(), 10)));
        assert_eq!(owned(e.seek_floor(b"a").unwrap()), None);
        assert_eq!(owned(e.next().unwrap()), None);

        let fst = build(&["ab", "abcd"]);
        let mut e = fst.enumerator();
        assert_eq!(owned(e.seek_floor(b"abc").unwrap()), Some(("ab".into(), 0)));
        assert_eq!(owned(e.next().unwrap()), Some(("abcd".into(), 10)));
    }

    #[test]
    fn test_seek_exact() {
        let fst = build(&["apple", "apply"]);
        let mut e = fst.enumerator();
        assert_eq!(owned(e.seek_exact(b"apply").unwrap()), Some(("apply".into(), 10)));
        assert_eq!(owned(e.seek_exact(b"appl").unwrap()), None);
    }
}
