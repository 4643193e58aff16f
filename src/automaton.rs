//! Finite automata over integer label ranges.
//!
//! An [`Automaton`] is a set of dense states, each with an accept flag and a
//! sorted list of [`Transition`]s labelled by inclusive ranges. Labels are
//! Unicode code points (`0..=0x10FFFF`) for automata compiled from patterns,
//! or bytes (`0..=0xFF`) once converted with [`utf8::to_utf8`]. State 0 is
//! always the initial state.
//!
//! Automata are built with [`Automaton::create_state`] and
//! [`Automaton::add_transition`] and must be normalized with
//! [`Automaton::finish`] before use; every operation in [`operations`]
//! returns a finished automaton and never mutates its inputs.
//!
//! # Example
//!
//! ```
//! use quiver::automaton::{basic, operations, Automaton};
//!
//! # fn main() -> quiver::error::Result<()> {
//! let ab = operations::union(&basic::string("ab"), &basic::string("cd"));
//! let min = operations::minimize(&ab, 10_000)?;
//! assert!(operations::run_str(&min, "cd"));
//! assert!(!operations::run_str(&min, "ad"));
//! # Ok(())
//! # }
//! ```

use std::fmt::Write as _;

pub mod basic;
pub mod compiled;
pub mod minimize;
pub mod operations;
pub mod regexp;
pub mod run;
pub mod utf8;

pub use compiled::{AutomatonKind, CompiledAutomaton};
pub use minimize::{minimize_brzozowski, minimize_hopcroft};
pub use regexp::RegExp;
pub use run::ByteRunAutomaton;

/// Largest label of a code point automaton.
pub const MAX_CODE_POINT: u32 = 0x10FFFF;

/// Largest label of a byte automaton.
pub const MAX_BYTE: u32 = 0xFF;

/// Default cap on the number of states determinization may create.
pub const DEFAULT_MAX_DETERMINIZED_STATES: usize = 10_000;

/// A labelled edge `min..=max -> dest`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Transition {
    pub min: u32,
    pub max: u32,
    pub dest: usize,
}

impl Transition {
    pub fn new(min: u32, max: u32, dest: usize) -> Self {
        Transition { min, max, dest }
    }

    /// Whether `label` falls inside this transition's range.
    #[inline]
    pub fn contains(&self, label: u32) -> bool {
        self.min <= label && label <= self.max
    }
}

/// A finite automaton with range-labelled transitions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Automaton {
    accept: Vec<bool>,
    transitions: Vec<Vec<Transition>>,
    deterministic: bool,
}

impl Automaton {
    /// An automaton with no states. Add states before using it.
    pub fn new() -> Self {
        Automaton {
            accept: Vec::new(),
            transitions: Vec::new(),
            deterministic: true,
        }
    }

    /// The automaton that accepts nothing.
    pub fn empty() -> Self {
        let mut a = Automaton::new();
        a.create_state();
        a
    }

    /// The automaton that accepts only the empty string.
    pub fn empty_string() -> Self {
        let mut a = Automaton::new();
        let s = a.create_state();
        a.set_accept(s, true);
        a
    }

    /// Add a state and return its id.
    pub fn create_state(&mut self) -> usize {
        self.accept.push(false);
        self.transitions.push(Vec::new());
        self.accept.len() - 1
    }

    /// Set or clear the accept flag of `state`.
    pub fn set_accept(&mut self, state: usize, accept: bool) {
        self.accept[state] = accept;
    }

    pub fn is_accept(&self, state: usize) -> bool {
        self.accept.get(state).copied().unwrap_or(false)
    }

    /// Add `min..=max -> dest` to `source`. Call [`Automaton::finish`]
    /// afterwards.
    pub fn add_transition(&mut self, source: usize, dest: usize, min: u32, max: u32) {
        debug_assert!(source < self.num_states() && dest < self.num_states());
        debug_assert!(min <= max);
        self.transitions[source].push(Transition { min, max, dest });
        self.deterministic = false;
    }

    /// Copy the transitions and accept flag of `dest` onto `source`, as if an
    /// epsilon edge joined them.
    pub fn add_epsilon(&mut self, source: usize, dest: usize) {
        let copied = self.transitions[dest].clone();
        self.transitions[source].extend(copied);
        if self.accept[dest] {
            self.accept[source] = true;
        }
        self.deterministic = false;
    }

    /// Append a copy of `other`'s states and transitions; returns the offset
    /// of `other`'s state 0 inside `self`.
    pub fn copy_from(&mut self, other: &Automaton) -> usize {
        let offset = self.num_states();
        self.accept.extend_from_slice(&other.accept);
        for trans in &other.transitions {
            self.transitions.push(
                trans
                    .iter()
                    .map(|t| Transition::new(t.min, t.max, t.dest + offset))
                    .collect(),
            );
        }
        self.deterministic = false;
        offset
    }

    /// Sort and coalesce transitions and recompute determinism.
    ///
    /// Transitions with the same destination and overlapping or adjacent
    /// ranges are merged; the result is sorted by `(min, max, dest)`.
    pub fn finish(&mut self) {
        let mut deterministic = true;
        for trans in &mut self.transitions {
            reduce(trans);
            if trans.windows(2).any(|w| w[0].max >= w[1].min) {
                deterministic = false;
            }
        }
        self.deterministic = deterministic;
    }

    pub fn num_states(&self) -> usize {
        self.accept.len()
    }

    /// Total number of transitions over all states.
    pub fn num_transitions(&self) -> usize {
        self.transitions.iter().map(Vec::len).sum()
    }

    /// Transitions leaving `state`, sorted by range.
    pub fn transitions(&self, state: usize) -> &[Transition] {
        &self.transitions[state]
    }

    /// Whether no state has overlapping outgoing ranges. Only meaningful on a
    /// finished automaton.
    pub fn is_deterministic(&self) -> bool {
        self.deterministic
    }

    /// Ids of all accepting states.
    pub fn accept_states(&self) -> impl Iterator<Item = usize> + '_ {
        self.accept
            .iter()
            .enumerate()
            .filter_map(|(s, &a)| a.then_some(s))
    }

    /// Destination of `label` from `state`, for a deterministic automaton.
    pub fn step(&self, state: usize, label: u32) -> Option<usize> {
        let trans = &self.transitions[state];
        let idx = trans.partition_point(|t| t.max < label);
        trans
            .get(idx)
            .filter(|t| t.min <= label)
            .map(|t| t.dest)
    }

    /// Sorted distinct points at which some transition range starts or ends,
    /// always including 0. Between two consecutive points every state
    /// behaves uniformly.
    pub fn start_points(&self) -> Vec<u32> {
        let mut points = vec![0u32];
        for trans in &self.transitions {
            for t in trans {
                points.push(t.min);
                if t.max < u32::MAX {
                    points.push(t.max + 1);
                }
            }
        }
        points.sort_unstable();
        points.dedup();
        points
    }

    /// Graphviz rendering, for debugging.
    pub fn to_dot(&self) -> String {
        let mut b = String::new();
        b.push_str("digraph Automaton {\n  rankdir = LR\n");
        if self.num_states() > 0 {
            b.push_str("  initial [shape=plaintext,label=\"0\"]\n  initial -> 0\n");
        }
        for s in 0..self.num_states() {
            let shape = if self.accept[s] { "doublecircle" } else { "circle" };
            let _ = writeln!(b, "  {s} [shape={shape},label=\"{s}\"]");
            for t in &self.transitions[s] {
                let _ = write!(b, "  {s} -> {} [label=\"", t.dest);
                append_label(&mut b, t.min);
                if t.max != t.min {
                    b.push('-');
                    append_label(&mut b, t.max);
                }
                b.push_str("\"]\n");
            }
        }
        b.push('}');
        b
    }
}

fn append_label(b: &mut String, label: u32) {
    match char::from_u32(label) {
        Some(c) if ('!'..='~').contains(&c) && c != '\\' && c != '"' => b.push(c),
        _ => {
            let _ = write!(b, "\\\\U{label:08x}");
        }
    }
}

fn reduce(trans: &mut Vec<Transition>) {
    if trans.len() < 2 {
        return;
    }
    trans.sort_unstable_by_key(|t| (t.dest, t.min, t.max));
    let mut out: Vec<Transition> = Vec::with_capacity(trans.len());
    for &t in trans.iter() {
        match out.last_mut() {
            Some(last) if last.dest == t.dest && t.min <= last.max.saturating_add(1) => {
                last.max = last.max.max(t.max);
            }
            _ => out.push(t),
        }
    }
    out.sort_unstable();
    *trans = out;
}
