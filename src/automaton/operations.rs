//! Language-level operations on automata.
//!
//! Every function takes its inputs by reference and returns a new, finished
//! automaton. Functions that must determinize take a `max_states` cap and fail
//! with [`QuiverError::TooComplexToDeterminize`] when it is exceeded.

use std::collections::{BTreeMap, VecDeque};

use ahash::AHashMap;
use bit_vec::BitVec;
use log::debug;

use crate::automaton::{Automaton, MAX_CODE_POINT, Transition};
use crate::error::{QuiverError, Result};

pub use crate::automaton::minimize::minimize_hopcroft as minimize;

/// Accepts the strings accepted by `a` or by `b`.
pub fn union(a: &Automaton, b: &Automaton) -> Automaton {
    union_all(&[a, b])
}

/// Accepts the strings accepted by any of `automata`.
pub fn union_all(automata: &[&Automaton]) -> Automaton {
    let mut result = Automaton::new();
    let init = result.create_state();
    // a stateless operand accepts nothing
    for a in automata.iter().filter(|a| a.num_states() > 0) {
        let offset = result.copy_from(a);
        result.add_epsilon(init, offset);
    }
    result.finish();
    result
}

/// Accepts `x·y` for `x` accepted by `a` and `y` accepted by `b`.
pub fn concatenate(a: &Automaton, b: &Automaton) -> Automaton {
    concatenate_all(&[a, b])
}

/// Concatenation of every automaton in order. An empty list yields the
/// empty-string automaton; any stateless operand yields the empty language.
pub fn concatenate_all(automata: &[&Automaton]) -> Automaton {
    if automata.is_empty() {
        return Automaton::empty_string();
    }
    if automata.iter().any(|a| a.num_states() == 0) {
        return Automaton::empty();
    }
    let mut result = Automaton::new();
    let mut offsets = Vec::with_capacity(automata.len());
    for a in automata {
        offsets.push(result.copy_from(a));
    }
    let last = automata.len() - 1;
    for (i, a) in automata.iter().enumerate().take(last) {
        for s in a.accept_states() {
            result.set_accept(offsets[i] + s, false);
        }
    }
    // Link from the back so that an initial state which itself accepts has
    // already picked up the transitions of the parts after it.
    for i in (0..last).rev() {
        let next_init = offsets[i + 1];
        for s in automata[i].accept_states() {
            result.add_epsilon(offsets[i] + s, next_init);
        }
    }
    result.finish();
    result
}

/// Accepts the empty string plus everything `a` accepts.
pub fn optional(a: &Automaton) -> Automaton {
    if a.num_states() == 0 {
        return Automaton::empty_string();
    }
    let mut result = Automaton::new();
    let init = result.create_state();
    result.set_accept(init, true);
    let offset = result.copy_from(a);
    result.add_epsilon(init, offset);
    result.finish();
    result
}

/// Kleene star: zero or more repetitions of `a`.
pub fn repeat(a: &Automaton) -> Automaton {
    if a.num_states() == 0 {
        return Automaton::empty_string();
    }
    let mut result = Automaton::new();
    let init = result.create_state();
    result.set_accept(init, true);
    let offset = result.copy_from(a);
    result.add_epsilon(init, offset);
    let init_trans: Vec<Transition> = a
        .transitions(0)
        .iter()
        .map(|t| Transition::new(t.min, t.max, t.dest + offset))
        .collect();
    for s in a.accept_states() {
        for t in &init_trans {
            result.add_transition(s + offset, t.dest, t.min, t.max);
        }
    }
    result.finish();
    result
}

/// At least `min` repetitions of `a`.
pub fn repeat_min(a: &Automaton, min: usize) -> Automaton {
    if min == 0 {
        return repeat(a);
    }
    let star = repeat(a);
    let mut parts: Vec<&Automaton> = vec![a; min];
    parts.push(&star);
    concatenate_all(&parts)
}

/// Between `min` and `max` (inclusive) repetitions of `a`.
pub fn repeat_range(a: &Automaton, min: usize, max: usize) -> Automaton {
    if min > max {
        return Automaton::empty();
    }
    let prefix = concatenate_all(&vec![a; min]);
    let mut tail = Automaton::empty_string();
    for _ in min..max {
        tail = optional(&concatenate(a, &tail));
    }
    concatenate(&prefix, &tail)
}

/// Product construction: accepts strings accepted by both `a` and `b`.
///
/// Deterministic when both inputs are.
pub fn intersection(a: &Automaton, b: &Automaton) -> Automaton {
    if a.num_states() == 0 || b.num_states() == 0 {
        return Automaton::empty();
    }
    let mut result = Automaton::new();
    let mut seen: AHashMap<(usize, usize), usize> = AHashMap::new();
    let mut worklist = VecDeque::new();

    let init = result.create_state();
    result.set_accept(init, a.is_accept(0) && b.is_accept(0));
    seen.insert((0, 0), init);
    worklist.push_back((0usize, 0usize));

    while let Some((p1, p2)) = worklist.pop_front() {
        let source = seen[&(p1, p2)];
        let t2s = b.transitions(p2);
        for t1 in a.transitions(p1) {
            for t2 in t2s {
                if t2.min > t1.max {
                    break;
                }
                if t2.max < t1.min {
                    continue;
                }
                let pair = (t1.dest, t2.dest);
                let dest = match seen.get(&pair) {
                    Some(&d) => d,
                    None => {
                        let d = result.create_state();
                        result.set_accept(d, a.is_accept(t1.dest) && b.is_accept(t2.dest));
                        seen.insert(pair, d);
                        worklist.push_back(pair);
                        d
                    }
                };
                result.add_transition(source, dest, t1.min.max(t2.min), t1.max.min(t2.max));
            }
        }
    }
    result.finish();
    remove_dead_states(&result)
}

/// Subset construction.
///
/// Outgoing ranges of every state set are split at each boundary point so
/// the resulting ranges are disjoint, and each range maps to the set of
/// states it reaches.
pub fn determinize(a: &Automaton, max_states: usize) -> Result<Automaton> {
    if a.is_deterministic() {
        return Ok(a.clone());
    }

    let mut result = Automaton::new();
    let mut seen: AHashMap<Vec<usize>, usize> = AHashMap::new();
    let mut worklist: VecDeque<Vec<usize>> = VecDeque::new();

    let init = result.create_state();
    result.set_accept(init, a.is_accept(0));
    seen.insert(vec![0], init);
    worklist.push_back(vec![0]);

    let mut points: Vec<(u32, bool, usize)> = Vec::new();
    while let Some(set) = worklist.pop_front() {
        let source = seen[&set];

        // (point, is_start, dest); ends sort before starts at the same point
        points.clear();
        for &s in &set {
            for t in a.transitions(s) {
                points.push((t.min, true, t.dest));
                points.push((t.max + 1, false, t.dest));
            }
        }
        points.sort_unstable();

        let mut active: BTreeMap<usize, u32> = BTreeMap::new();
        let mut last_point = 0u32;
        let mut i = 0;
        while i < points.len() {
            let point = points[i].0;
            if !active.is_empty() && last_point < point {
                let dest_set: Vec<usize> = active.keys().copied().collect();
                let dest = match seen.get(&dest_set) {
                    Some(&d) => d,
                    None => {
                        let d = result.create_state();
                        if result.num_states() > max_states {
                            debug!("determinize aborted after {max_states} states");
                            return Err(QuiverError::too_complex(
                                max_states,
                                a.num_states(),
                                a.num_transitions(),
                            ));
                        }
                        result.set_accept(d, dest_set.iter().any(|&s| a.is_accept(s)));
                        seen.insert(dest_set.clone(), d);
                        worklist.push_back(dest_set);
                        d
                    }
                };
                result.add_transition(source, dest, last_point, point - 1);
            }
            while i < points.len() && points[i].0 == point {
                let (_, is_start, dest) = points[i];
                if is_start {
                    *active.entry(dest).or_insert(0) += 1;
                } else if let Some(count) = active.get_mut(&dest) {
                    *count -= 1;
                    if *count == 0 {
                        active.remove(&dest);
                    }
                }
                i += 1;
            }
            last_point = point;
        }
    }

    result.finish();
    Ok(result)
}

/// Make every state of a deterministic automaton total over
/// `0..=MAX_CODE_POINT` by routing missing ranges to a new dead state.
pub fn totalize(a: &Automaton) -> Automaton {
    let mut result = Automaton::new();
    for s in 0..a.num_states() {
        let r = result.create_state();
        result.set_accept(r, a.is_accept(s));
    }
    let dead = result.create_state();
    result.add_transition(dead, dead, 0, MAX_CODE_POINT);

    for s in 0..a.num_states() {
        let mut next = 0u32;
        for t in a.transitions(s) {
            result.add_transition(s, t.dest, t.min, t.max);
            if t.min > next {
                result.add_transition(s, dead, next, t.min - 1);
            }
            next = next.max(t.max + 1);
        }
        if next <= MAX_CODE_POINT {
            result.add_transition(s, dead, next, MAX_CODE_POINT);
        }
    }
    result.finish();
    result
}

/// Accepts every string over `0..=MAX_CODE_POINT` that `a` rejects.
pub fn complement(a: &Automaton, max_states: usize) -> Result<Automaton> {
    let mut result = totalize(&determinize(a, max_states)?);
    for s in 0..result.num_states() {
        let accept = result.is_accept(s);
        result.set_accept(s, !accept);
    }
    Ok(remove_dead_states(&result))
}

/// Accepts strings accepted by `a` but not by `b`.
pub fn minus(a: &Automaton, b: &Automaton, max_states: usize) -> Result<Automaton> {
    if is_empty(a) {
        return Ok(Automaton::empty());
    }
    if is_empty(b) {
        return Ok(a.clone());
    }
    Ok(intersection(a, &complement(b, max_states)?))
}

/// Whether `a` and `b` accept the same language.
pub fn same_language(a: &Automaton, b: &Automaton, max_states: usize) -> Result<bool> {
    Ok(is_empty(&minus(a, b, max_states)?) && is_empty(&minus(b, a, max_states)?))
}

/// Whether no accepting state is reachable from the initial state.
pub fn is_empty(a: &Automaton) -> bool {
    if a.num_states() == 0 {
        return true;
    }
    let reachable = reachable_states(a);
    !a.accept_states().any(|s| reachable[s])
}

/// Whether `a` accepts every string over `0..=max_label`.
pub fn is_total(a: &Automaton, max_label: u32) -> bool {
    if a.num_states() == 0 {
        return false;
    }
    let reachable = reachable_states(a);
    for s in (0..a.num_states()).filter(|&s| reachable[s]) {
        if !a.is_accept(s) {
            return false;
        }
        let mut next = 0u32;
        for t in a.transitions(s) {
            if t.min > next {
                return false;
            }
            next = next.max(t.max.saturating_add(1));
        }
        if next <= max_label {
            return false;
        }
    }
    true
}

/// Whether `a` accepts `labels`.
///
/// Deterministic automata are walked state by state; others are simulated
/// over the set of active states.
pub fn run(a: &Automaton, labels: impl IntoIterator<Item = u32>) -> bool {
    if a.num_states() == 0 {
        return false;
    }
    if a.is_deterministic() {
        let mut state = 0;
        for label in labels {
            match a.step(state, label) {
                Some(next) => state = next,
                None => return false,
            }
        }
        return a.is_accept(state);
    }

    let mut current = BitVec::from_elem(a.num_states(), false);
    let mut next = BitVec::from_elem(a.num_states(), false);
    current.set(0, true);
    for label in labels {
        next.clear();
        let mut any = false;
        for s in (0..a.num_states()).filter(|&s| current[s]) {
            for t in a.transitions(s).iter().filter(|t| t.contains(label)) {
                next.set(t.dest, true);
                any = true;
            }
        }
        if !any {
            return false;
        }
        std::mem::swap(&mut current, &mut next);
    }
    (0..a.num_states()).any(|s| current[s] && a.is_accept(s))
}

/// Run over the code points of `s`.
pub fn run_str(a: &Automaton, s: &str) -> bool {
    run(a, s.chars().map(|c| c as u32))
}

/// Run over raw bytes.
pub fn run_bytes(a: &Automaton, bytes: &[u8]) -> bool {
    run(a, bytes.iter().map(|&b| b as u32))
}

/// Accepts the reversal of every string `a` accepts.
///
/// The result is generally non-deterministic.
pub fn reverse(a: &Automaton) -> Automaton {
    let mut result = Automaton::new();
    let init = result.create_state();
    for _ in 0..a.num_states() {
        result.create_state();
    }
    if a.num_states() == 0 {
        result.finish();
        return result;
    }
    result.set_accept(1, true);
    for s in 0..a.num_states() {
        for t in a.transitions(s) {
            result.add_transition(t.dest + 1, s + 1, t.min, t.max);
        }
    }
    for s in a.accept_states() {
        result.add_epsilon(init, s + 1);
    }
    result.finish();
    result
}

fn reachable_states(a: &Automaton) -> BitVec {
    let mut reachable = BitVec::from_elem(a.num_states(), false);
    if a.num_states() == 0 {
        return reachable;
    }
    let mut stack = vec![0usize];
    reachable.set(0, true);
    while let Some(s) = stack.pop() {
        for t in a.transitions(s) {
            if !reachable[t.dest] {
                reachable.set(t.dest, true);
                stack.push(t.dest);
            }
        }
    }
    reachable
}

/// States from which some accepting state can be reached.
pub fn live_states(a: &Automaton) -> BitVec {
    let n = a.num_states();
    let mut incoming: Vec<Vec<usize>> = vec![Vec::new(); n];
    for s in 0..n {
        for t in a.transitions(s) {
            incoming[t.dest].push(s);
        }
    }
    let mut live = BitVec::from_elem(n, false);
    let mut stack: Vec<usize> = a.accept_states().collect();
    for &s in &stack {
        live.set(s, true);
    }
    while let Some(s) = stack.pop() {
        for &p in &incoming[s] {
            if !live[p] {
                live.set(p, true);
                stack.push(p);
            }
        }
    }
    live
}

/// Drop states that are unreachable or cannot reach an accepting state.
///
/// State 0 is kept as the initial state; when the language is empty the
/// result is [`Automaton::empty`].
pub fn remove_dead_states(a: &Automaton) -> Automaton {
    if a.num_states() == 0 {
        return Automaton::empty();
    }
    let reachable = reachable_states(a);
    let live = live_states(a);
    if !live[0] {
        return Automaton::empty();
    }

    let mut map = vec![usize::MAX; a.num_states()];
    let mut result = Automaton::new();
    for s in 0..a.num_states() {
        if reachable[s] && live[s] {
            map[s] = result.create_state();
            result.set_accept(map[s], a.is_accept(s));
        }
    }
    for s in 0..a.num_states() {
        if map[s] == usize::MAX {
            continue;
        }
        for t in a.transitions(s) {
            if map[t.dest] != usize::MAX {
                result.add_transition(map[s], map[t.dest], t.min, t.max);
            }
        }
    }
    result.finish();
    result
}

/// If `a` accepts exactly one string, return it.
///
/// Expects a minimal deterministic automaton, where a single accepted string
/// shows up as a chain of single-label transitions.
pub fn singleton(a: &Automaton) -> Option<Vec<u32>> {
    if a.num_states() == 0 {
        return None;
    }
    let mut labels = Vec::new();
    let mut state = 0;
    let mut visited = BitVec::from_elem(a.num_states(), false);
    loop {
        if visited[state] {
            return None;
        }
        visited.set(state, true);
        let trans = a.transitions(state);
        if a.is_accept(state) {
            return trans.is_empty().then_some(labels);
        }
        match trans {
            [t] if t.min == t.max => {
                labels.push(t.min);
                state = t.dest;
            }
            _ => return None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automaton::basic;

    const MAX: usize = 10_000;

    #[test]
    fn test_union_and_concatenate() {
        let a = union(&basic::string("foo"), &basic::string("bar"));
        assert!(run_str(&a, "foo"));
        assert!(run_str(&a, "bar"));
        assert!(!run_str(&a, "fo"));

        let c = concatenate(&a, &basic::string("!"));
        assert!(run_str(&c, "bar!"));
        assert!(!run_str(&c, "bar"));
    }

    #[test]
    fn test_concatenate_through_optional_parts() {
        let parts = [
            basic::string("a"),
            optional(&basic::string("b")),
            optional(&basic::string("c")),
            basic::string("d"),
        ];
        let refs: Vec<&Automaton> = parts.iter().collect();
        let a = concatenate_all(&refs);
        for s in ["ad", "abd", "acd", "abcd"] {
            assert!(run_str(&a, s), "{s}");
        }
        for s in ["a", "abc", "acbd", "d"] {
            assert!(!run_str(&a, s), "{s}");
        }
        assert!(run_str(&concatenate_all(&[]), ""));
    }

    #[test]
    fn test_repeat_variants() {
        let ab = basic::string("ab");
        let star = repeat(&ab);
        assert!(run_str(&star, ""));
        assert!(run_str(&star, "ababab"));
        assert!(!run_str(&star, "aba"));

        let plus = repeat_min(&ab, 2);
        assert!(!run_str(&plus, "ab"));
        assert!(run_str(&plus, "abab"));
        assert!(run_str(&plus, "ababab"));

        let range = repeat_range(&ab, 1, 2);
        assert!(!run_str(&range, ""));
        assert!(run_str(&range, "ab"));
        assert!(run_str(&range, "abab"));
        assert!(!run_str(&range, "ababab"));
        assert!(is_empty(&repeat_range(&ab, 3, 2)));
    }

    #[test]
    fn test_determinize_splits_overlaps() {
        // a[a-c] | [b-d]b
        let left = concatenate(&basic::char('a' as u32), &basic::char_range('a' as u32, 'c' as u32));
        let right = concatenate(&basic::char_range('a' as u32, 'd' as u32), &basic::char('b' as u32));
        let nfa = union(&left, &right);
        assert!(!nfa.is_deterministic());

        let dfa = determinize(&nfa, MAX).unwrap();
        assert!(dfa.is_deterministic());
        for s in ["aa", "ab", "ac", "bb", "db"] {
            assert_eq!(run_str(&dfa, s), run_str(&nfa, s), "{s}");
            assert!(run_str(&dfa, s));
        }
        assert!(!run_str(&dfa, "ba"));
        assert!(same_language(&nfa, &dfa, MAX).unwrap());
    }

    #[test]
    fn test_determinize_cap() {
        // (a|b)*a(a|b){12} needs 2^13 states
        let ab = basic::char_range('a' as u32, 'b' as u32);
        let nfa = concatenate_all(&[
            &repeat(&ab),
            &basic::char('a' as u32),
            &repeat_range(&ab, 12, 12),
        ]);
        let err = determinize(&nfa, 100).unwrap_err();
        match &err {
            QuiverError::TooComplexToDeterminize {
                pattern: None,
                max_states: 100,
                input_states,
                input_transitions,
            } => {
                assert_eq!(*input_states, nfa.num_states());
                assert_eq!(*input_transitions, nfa.num_transitions());
            }
            other => panic!("expected cap error, got {other:?}"),
        }
        let message = err.to_string();
        assert!(message.contains(&format!("{} states", nfa.num_states())), "{message}");
    }

    #[test]
    fn test_complement_and_minus() {
        let foo = basic::string("foo");
        let not_foo = complement(&foo, MAX).unwrap();
        assert!(!run_str(&not_foo, "foo"));
        assert!(run_str(&not_foo, "fo"));
        assert!(run_str(&not_foo, ""));
        assert!(run_str(&not_foo, "fooo"));

        let any = basic::any_string();
        let m = minus(&any, &foo, MAX).unwrap();
        assert!(same_language(&m, &not_foo, MAX).unwrap());
        assert!(is_empty(&minus(&foo, &foo, MAX).unwrap()));
    }

    #[test]
    fn test_intersection() {
        let a = repeat(&basic::char_range('a' as u32, 'c' as u32));
        let b = concatenate(&basic::any_string(), &basic::string("cb"));
        let i = intersection(&a, &b);
        assert!(run_str(&i, "acb"));
        assert!(!run_str(&i, "adcb"));
        assert!(!run_str(&i, "abc"));
        assert!(i.is_deterministic());
    }

    #[test]
    fn test_reverse() {
        let a = union(&basic::string("abc"), &basic::string("xy"));
        let r = reverse(&a);
        assert!(run_str(&r, "cba"));
        assert!(run_str(&r, "yx"));
        assert!(!run_str(&r, "abc"));
    }

    #[test]
    fn test_total_and_empty() {
        assert!(is_total(&basic::any_string(), MAX_CODE_POINT));
        assert!(!is_total(&basic::string("a"), MAX_CODE_POINT));
        assert!(is_total(&basic::any_binary(), 0xFF));
        assert!(is_empty(&Automaton::empty()));
        assert!(!is_empty(&Automaton::empty_string()));
    }

    #[test]
    fn test_singleton() {
        let m = minimize(&union(&basic::string("abc"), &basic::string("abc")), MAX).unwrap();
        assert_eq!(
            singleton(&m),
            Some("abc".chars().map(|c| c as u32).collect())
        );
        let m = minimize(&union(&basic::string("ab"), &basic::string("abc")), MAX).unwrap();
        assert_eq!(singleton(&m), None);
        assert_eq!(singleton(&Automaton::empty_string()), Some(vec![]));
    }

    #[test]
    fn test_stateless_operands() {
        let none = Automaton::new();
        let eps = Automaton::empty_string();
        let abc = basic::string("abc");

        assert!(!run_str(&concatenate(&none, &eps), ""));
        assert!(is_empty(&concatenate(&abc, &none)));
        assert!(is_empty(&concatenate_all(&[&eps, &none, &abc])));

        let u = union(&none, &abc);
        assert!(run_str(&u, "abc"));
        assert!(!run_str(&u, ""));
        assert!(run_str(&union(&abc, &none), "abc"));
        assert!(is_empty(&union(&none, &none)));

        assert!(is_empty(&intersection(&none, &eps)));
        assert!(is_empty(&intersection(&abc, &none)));

        for a in [optional(&none), repeat(&none), repeat_min(&none, 0)] {
            assert!(run_str(&a, ""));
            assert!(!run_str(&a, "a"));
        }
        assert!(is_empty(&repeat_min(&none, 2)));
        assert!(run_str(&repeat_range(&none, 0, 3), ""));

        assert!(is_empty(&minus(&none, &abc, MAX).unwrap()));
        assert!(run_str(&minus(&abc, &none, MAX).unwrap(), "abc"));
        let all = complement(&none, MAX).unwrap();
        assert!(run_str(&all, ""));
        assert!(run_str(&all, "xyz"));
        assert!(is_empty(&reverse(&none)));
        assert_eq!(singleton(&none), None);
    }
}
