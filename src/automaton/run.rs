//! Table-driven execution of deterministic byte automata.

use bit_vec::BitVec;

use crate::automaton::operations::live_states;
use crate::automaton::{Automaton, MAX_BYTE};
use crate::error::{QuiverError, Result};

const ALPHABET: usize = MAX_BYTE as usize + 1;

/// A deterministic byte automaton compiled to a `states x 256` transition
/// table.
///
/// Every state also carries a liveness bit: a state is live when some
/// accepting state is reachable from it. Enumerators use this to prune.
#[derive(Debug, Clone)]
pub struct ByteRunAutomaton {
    table: Vec<i32>,
    accept: BitVec,
    live: BitVec,
    num_states: usize,
}

impl ByteRunAutomaton {
    /// Compile `a`, which must be deterministic. Labels above `0xFF` are
    /// ignored.
    pub fn new(a: &Automaton) -> Result<Self> {
        if !a.is_deterministic() {
            return Err(QuiverError::invalid_operation(
                "run automaton requires a deterministic automaton",
            ));
        }
        let num_states = a.num_states();
        let mut table = vec![-1i32; num_states * ALPHABET];
        let mut accept = BitVec::from_elem(num_states, false);
        for s in 0..num_states {
            accept.set(s, a.is_accept(s));
            let row = &mut table[s * ALPHABET..(s + 1) * ALPHABET];
            for t in a.transitions(s) {
                if t.min > MAX_BYTE {
                    break;
                }
                let max = t.max.min(MAX_BYTE);
                row[t.min as usize..=max as usize].fill(t.dest as i32);
            }
        }
        let live = live_states(a);
        Ok(ByteRunAutomaton {
            table,
            accept,
            live,
            num_states,
        })
    }

    /// The initial state.
    #[inline]
    pub fn initial_state(&self) -> usize {
        0
    }

    pub fn num_states(&self) -> usize {
        self.num_states
    }

    /// Next state after reading `byte`, or `None` when there is no
    /// transition.
    #[inline]
    pub fn step(&self, state: usize, byte: u8) -> Option<usize> {
        let dest = self.table[state * ALPHABET + byte as usize];
        (dest >= 0).then_some(dest as usize)
    }

    #[inline]
    pub fn is_accept(&self, state: usize) -> bool {
        self.accept[state]
    }

    /// Whether an accepting state is reachable from `state`.
    #[inline]
    pub fn is_live(&self, state: usize) -> bool {
        self.live[state]
    }

    /// Whether the automaton accepts `bytes`.
    pub fn run(&self, bytes: &[u8]) -> bool {
        self.run_from(self.initial_state(), bytes)
            .is_some_and(|s| self.is_accept(s))
    }

    /// State reached from `state` after reading `bytes`, if any.
    pub fn run_from(&self, state: usize, bytes: &[u8]) -> Option<usize> {
        if self.num_states == 0 {
            return None;
        }
        bytes.iter().try_fold(state, |s, &b| self.step(s, b))
    }

    /// Smallest label `>= from` leading from `state` to a live state.
    pub fn next_live_label(&self, state: usize, from: u32) -> Option<u8> {
        (from as usize..ALPHABET)
            .find(|&b| self.step(state, b as u8).is_some_and(|d| self.is_live(d)))
            .map(|b| b as u8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automaton::basic;
    use crate::automaton::operations::{concatenate, determinize, union};

    #[test]
    fn test_run_and_liveness() {
        let a = determinize(
            &union(&basic::binary(b"abc"), &basic::binary(b"abd")),
            1000,
        )
        .unwrap();
        let run = ByteRunAutomaton::new(&a).unwrap();
        assert!(run.run(b"abc"));
        assert!(run.run(b"abd"));
        assert!(!run.run(b"ab"));
        assert!(!run.run(b"abe"));

        let s = run.run_from(run.initial_state(), b"ab").unwrap();
        assert!(run.is_live(s));
        assert_eq!(run.next_live_label(s, 0), Some(b'c'));
        assert_eq!(run.next_live_label(s, b'd' as u32), Some(b'd'));
        assert_eq!(run.next_live_label(s, b'e' as u32), None);
    }

    #[test]
    fn test_rejects_nondeterministic() {
        let a = concatenate(&basic::any_binary(), &basic::binary(b"x"));
        assert!(!a.is_deterministic());
        assert!(matches!(
            ByteRunAutomaton::new(&a),
            Err(QuiverError::InvalidOperation(_))
        ));
    }
}
