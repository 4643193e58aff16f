//! Constructors for elementary automata.

use crate::automaton::{Automaton, MAX_BYTE, MAX_CODE_POINT};

/// Accepts any single code point.
pub fn any_char() -> Automaton {
    char_range(0, MAX_CODE_POINT)
}

/// Accepts every string of code points, including the empty string.
pub fn any_string() -> Automaton {
    let mut a = Automaton::new();
    let s = a.create_state();
    a.set_accept(s, true);
    a.add_transition(s, s, 0, MAX_CODE_POINT);
    a.finish();
    a
}

/// Accepts every byte string, including the empty string.
pub fn any_binary() -> Automaton {
    let mut a = Automaton::new();
    let s = a.create_state();
    a.set_accept(s, true);
    a.add_transition(s, s, 0, MAX_BYTE);
    a.finish();
    a
}

/// Accepts the single label `c`.
pub fn char(c: u32) -> Automaton {
    char_range(c, c)
}

/// Accepts any single label in `min..=max`. Empty when `min > max`.
pub fn char_range(min: u32, max: u32) -> Automaton {
    if min > max {
        return Automaton::empty();
    }
    let mut a = Automaton::new();
    let s0 = a.create_state();
    let s1 = a.create_state();
    a.set_accept(s1, true);
    a.add_transition(s0, s1, min, max);
    a.finish();
    a
}

/// Accepts exactly the label sequence `labels`.
pub fn labels(labels: &[u32]) -> Automaton {
    let mut a = Automaton::new();
    let mut last = a.create_state();
    for &label in labels {
        let next = a.create_state();
        a.add_transition(last, next, label, label);
        last = next;
    }
    a.set_accept(last, true);
    a.finish();
    a
}

/// Accepts exactly the code points of `s`.
pub fn string(s: &str) -> Automaton {
    let cps: Vec<u32> = s.chars().map(|c| c as u32).collect();
    labels(&cps)
}

/// Accepts exactly the bytes of `bytes`.
pub fn binary(bytes: &[u8]) -> Automaton {
    let labels_: Vec<u32> = bytes.iter().map(|&b| b as u32).collect();
    labels(&labels_)
}

/// Accepts every code point string starting with `prefix`.
pub fn prefix(prefix: &str) -> Automaton {
    let mut a = string(prefix);
    let last = a.num_states() - 1;
    a.add_transition(last, last, 0, MAX_CODE_POINT);
    a.finish();
    a
}
