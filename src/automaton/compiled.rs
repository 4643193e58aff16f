//! Automata prepared for matching against a term dictionary.

use log::debug;

use crate::automaton::operations::{determinize, is_empty, is_total, minimize, singleton};
use crate::automaton::utf8::{encode, to_utf8};
use crate::automaton::{Automaton, ByteRunAutomaton, MAX_BYTE, MAX_CODE_POINT, RegExp};
use crate::error::Result;

/// Shape of a compiled automaton's language, so callers can short-circuit.
#[derive(Debug, Clone)]
pub enum AutomatonKind {
    /// Matches nothing.
    None,
    /// Matches every term.
    All,
    /// Matches exactly one term.
    Single(Vec<u8>),
    /// Anything else; walk the dictionary with the run automaton.
    Normal(ByteRunAutomaton),
}

/// A pattern compiled to a minimal deterministic byte automaton.
#[derive(Debug, Clone)]
pub struct CompiledAutomaton {
    kind: AutomatonKind,
}

impl CompiledAutomaton {
    /// Compile a code point automaton. Terms are matched on their UTF-8
    /// bytes.
    pub fn new(a: &Automaton, max_states: usize) -> Result<Self> {
        let min = minimize(a, max_states)?;
        if is_empty(&min) {
            return Ok(Self::with_kind(AutomatonKind::None));
        }
        if is_total(&min, MAX_CODE_POINT) {
            return Ok(Self::with_kind(AutomatonKind::All));
        }
        if let Some(labels) = singleton(&min) {
            let mut term = Vec::new();
            let mut buf = [0u8; 4];
            for cp in labels {
                let n = encode(cp, &mut buf);
                term.extend_from_slice(&buf[..n]);
            }
            return Ok(Self::with_kind(AutomatonKind::Single(term)));
        }
        let bytes = minimize(&determinize(&to_utf8(&min), max_states)?, max_states)?;
        debug!(
            "compiled automaton: {} code point states, {} byte states",
            min.num_states(),
            bytes.num_states()
        );
        Ok(Self::with_kind(AutomatonKind::Normal(ByteRunAutomaton::new(
            &bytes,
        )?)))
    }

    /// Compile an automaton whose labels are already bytes.
    pub fn from_binary(a: &Automaton, max_states: usize) -> Result<Self> {
        let min = minimize(a, max_states)?;
        if is_empty(&min) {
            return Ok(Self::with_kind(AutomatonKind::None));
        }
        if is_total(&min, MAX_BYTE) {
            return Ok(Self::with_kind(AutomatonKind::All));
        }
        if let Some(labels) = singleton(&min) {
            let term = labels.into_iter().map(|b| b as u8).collect();
            return Ok(Self::with_kind(AutomatonKind::Single(term)));
        }
        Ok(Self::with_kind(AutomatonKind::Normal(ByteRunAutomaton::new(
            &min,
        )?)))
    }

    /// Parse and compile a regular expression.
    pub fn from_regex(pattern: &str, max_states: usize) -> Result<Self> {
        let a = RegExp::new(pattern)?.to_automaton(max_states)?;
        Self::new(&a, max_states).map_err(|e| e.with_pattern(pattern))
    }

    fn with_kind(kind: AutomatonKind) -> Self {
        CompiledAutomaton { kind }
    }

    pub fn kind(&self) -> &AutomatonKind {
        &self.kind
    }

    /// Whether `term` is in the compiled language.
    pub fn matches(&self, term: &[u8]) -> bool {
        match &self.kind {
            AutomatonKind::None => false,
            AutomatonKind::All => true,
            AutomatonKind::Single(t) => t.as_slice() == term,
            AutomatonKind::Normal(run) => run.run(term),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automaton::basic;
    use crate::error::QuiverError;

    const MAX: usize = 10_000;

    #[test]
    fn test_classification() {
        let c = CompiledAutomaton::from_regex("#", MAX).unwrap();
        assert!(matches!(c.kind(), AutomatonKind::None));
        assert!(!c.matches(b""));

        let c = CompiledAutomaton::from_regex(".*", MAX).unwrap();
        assert!(matches!(c.kind(), AutomatonKind::All));
        assert!(c.matches(b"whatever"));

        let c = CompiledAutomaton::from_regex("caf(é)", MAX).unwrap();
        match c.kind() {
            AutomatonKind::Single(term) => assert_eq!(term, "café".as_bytes()),
            other => panic!("unexpected kind {other:?}"),
        }

        let c = CompiledAutomaton::from_regex("ca[a-z]+", MAX).unwrap();
        assert!(matches!(c.kind(), AutomatonKind::Normal(_)));
        assert!(c.matches(b"cat"));
        assert!(!c.matches(b"ca"));
        assert!(!c.matches("caé".as_bytes()));
    }

    #[test]
    fn test_binary() {
        let c = CompiledAutomaton::from_binary(&basic::any_binary(), MAX).unwrap();
        assert!(matches!(c.kind(), AutomatonKind::All));
        let c = CompiledAutomaton::from_binary(&basic::binary(&[0xFF, 0]), MAX).unwrap();
        assert!(matches!(c.kind(), AutomatonKind::Single(t) if t == &[0xFF, 0]));
    }

    #[test]
    fn test_parse_error_propagates() {
        assert!(matches!(
            CompiledAutomaton::from_regex("(", MAX),
            Err(QuiverError::InvalidPattern(_))
        ));
    }
}
