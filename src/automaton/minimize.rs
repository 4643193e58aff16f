//! DFA minimization.
//!
//! [`minimize_hopcroft`] is the production algorithm: partition refinement
//! over the label classes induced by the automaton's start points.
//! [`minimize_brzozowski`] (reverse, determinize, twice) is much slower but
//! trivially correct, and serves as the reference in tests.

use bit_vec::BitVec;
use log::trace;

use crate::automaton::operations::{determinize, remove_dead_states, reverse, totalize};
use crate::automaton::{Automaton, MAX_CODE_POINT};
use crate::error::Result;

/// Minimal deterministic automaton accepting the same language as `a`.
///
/// The result has no dead states; an automaton with an empty language
/// minimizes to [`Automaton::empty`].
pub fn minimize_hopcroft(a: &Automaton, max_states: usize) -> Result<Automaton> {
    let dfa = totalize(&determinize(a, max_states)?);
    let n = dfa.num_states();

    let sigma: Vec<u32> = dfa
        .start_points()
        .into_iter()
        .filter(|&p| p <= MAX_CODE_POINT)
        .collect();
    let k = sigma.len();

    // delta[s * k + c]: total after totalize
    let mut delta = vec![0usize; n * k];
    for s in 0..n {
        for (c, &label) in sigma.iter().enumerate() {
            delta[s * k + c] = dfa.step(s, label).unwrap_or(s);
        }
    }
    let mut inverse: Vec<Vec<Vec<usize>>> = vec![vec![Vec::new(); n]; k];
    for s in 0..n {
        for c in 0..k {
            inverse[c][delta[s * k + c]].push(s);
        }
    }

    let mut block_of = vec![0usize; n];
    let mut blocks: Vec<Vec<usize>> = Vec::new();
    let (accepting, rejecting): (Vec<usize>, Vec<usize>) =
        (0..n).partition(|&s| dfa.is_accept(s));
    for members in [accepting, rejecting] {
        if members.is_empty() {
            continue;
        }
        let id = blocks.len();
        for &s in &members {
            block_of[s] = id;
        }
        blocks.push(members);
    }

    let mut pending: Vec<(usize, usize)> = Vec::new();
    let mut in_pending: Vec<BitVec> = vec![BitVec::from_elem(k, false); blocks.len()];
    if blocks.len() == 2 {
        let smaller = if blocks[0].len() <= blocks[1].len() { 0 } else { 1 };
        for c in 0..k {
            pending.push((smaller, c));
            in_pending[smaller].set(c, true);
        }
    }

    let mut in_splitter = BitVec::from_elem(n, false);
    let mut marked: Vec<usize> = Vec::new();
    let mut touched: Vec<usize> = Vec::new();
    let mut hits: Vec<Vec<usize>> = vec![Vec::new(); blocks.len()];

    while let Some((splitter, c)) = pending.pop() {
        in_pending[splitter].set(c, false);

        // predecessors on class c of the splitter, grouped by block
        touched.clear();
        marked.clear();
        for &t in &blocks[splitter] {
            for &s in &inverse[c][t] {
                if in_splitter[s] {
                    continue;
                }
                in_splitter.set(s, true);
                marked.push(s);
                let b = block_of[s];
                if hits[b].is_empty() {
                    touched.push(b);
                }
                hits[b].push(s);
            }
        }

        for &b in &touched {
            let moved = std::mem::take(&mut hits[b]);
            if moved.len() == blocks[b].len() {
                continue;
            }
            let new_id = blocks.len();
            blocks[b].retain(|&s| !in_splitter[s]);
            for &s in &moved {
                block_of[s] = new_id;
            }
            let smaller = if moved.len() <= blocks[b].len() { new_id } else { b };
            blocks.push(moved);
            hits.push(Vec::new());
            in_pending.push(BitVec::from_elem(k, false));
            for c2 in 0..k {
                if in_pending[b][c2] {
                    pending.push((new_id, c2));
                    in_pending[new_id].set(c2, true);
                } else if !in_pending[smaller][c2] {
                    pending.push((smaller, c2));
                    in_pending[smaller].set(c2, true);
                }
            }
        }
        for &s in &marked {
            in_splitter.set(s, false);
        }
    }

    // Renumber so that the initial state's block becomes state 0.
    let mut order = vec![usize::MAX; blocks.len()];
    let mut result = Automaton::new();
    let first = block_of[0];
    order[first] = result.create_state();
    for b in 0..blocks.len() {
        if order[b] == usize::MAX {
            order[b] = result.create_state();
        }
    }
    for (b, members) in blocks.iter().enumerate() {
        let rep = members[0];
        result.set_accept(order[b], dfa.is_accept(rep));
        for (c, &label) in sigma.iter().enumerate() {
            let max = sigma.get(c + 1).map_or(MAX_CODE_POINT, |&next| next - 1);
            let dest = order[block_of[delta[rep * k + c]]];
            result.add_transition(order[b], dest, label, max);
        }
    }
    result.finish();

    let result = remove_dead_states(&result);
    trace!(
        "minimized {} states to {} states",
        a.num_states(),
        result.num_states()
    );
    Ok(result)
}

/// Minimization by double reversal:
/// `determinize(reverse(determinize(reverse(a))))`.
pub fn minimize_brzozowski(a: &Automaton, max_states: usize) -> Result<Automaton> {
    let once = determinize(&reverse(a), max_states)?;
    let twice = determinize(&reverse(&once), max_states)?;
    Ok(remove_dead_states(&twice))
}
