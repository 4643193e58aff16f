//! Joint traversal of an FST and a byte automaton.

use crate::automaton::ByteRunAutomaton;
use crate::error::Result;
use crate::fst::node::Transition;
use crate::fst::outputs::Output;
use crate::fst::Fst;

struct Frame<O> {
    arcs: Vec<Transition<O>>,
    next: usize,
    state: usize,
    output: O,
}

impl<O: Output> Fst<O> {
    /// Every key accepted by `automaton`, with its output, in key order.
    ///
    /// Only arcs whose label leads the automaton to a live state are
    /// followed, so regions of the FST the automaton cannot match are never
    /// visited.
    pub fn intersect(&self, automaton: &ByteRunAutomaton) -> Result<Vec<(Vec<u8>, O)>> {
        let mut results = Vec::new();
        let start = automaton.initial_state();
        if automaton.num_states() == 0 || !automaton.is_live(start) {
            return Ok(results);
        }
        let root = self.root()?;
        if root.is_final() && automaton.is_accept(start) {
            results.push((Vec::new(), root.final_output().clone()));
        }

        let mut key = Vec::new();
        let mut stack = vec![Frame {
            arcs: root.transitions(self.data())?,
            next: 0,
            state: start,
            output: O::zero(),
        }];
        while let Some(top) = stack.last_mut() {
            let Some(arc) = top.arcs.get(top.next).cloned() else {
                stack.pop();
                key.pop();
                continue;
            };
            top.next += 1;
            let Some(state) = automaton
                .step(top.state, arc.label)
                .filter(|&s| automaton.is_live(s))
            else {
                continue;
            };
            let output = top.output.concat(&arc.output);
            let node = self.node(arc.target)?;
            key.push(arc.label);
            if node.is_final() && automaton.is_accept(state) {
                results.push((key.clone(), output.concat(node.final_output())));
            }
            if node.num_arcs() > 0 {
                stack.push(Frame {
                    arcs: node.transitions(self.data())?,
                    next: 0,
                    state,
                    output,
                });
            } else {
                key.pop();
            }
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use crate::automaton::CompiledAutomaton;
    use crate::automaton::AutomatonKind;
    use crate::fst::FstBuilder;

    #[test]
    fn test_intersect_regex() {
        let words = ["bar", "baz", "car", "cart", "cat", "dog", "", "zebra"];
        let mut sorted: Vec<&str> = words.to_vec();
        sorted.sort();
        let mut builder = FstBuilder::<u64>::new();
        for (i, w) in sorted.iter().enumerate() {
            builder.insert(w.as_bytes(), i as u64).unwrap();
        }
        let fst = builder.finish().unwrap();

        let compiled = CompiledAutomaton::from_regex("ca.*|.a[rz]", 10_000).unwrap();
        let AutomatonKind::Normal(run) = compiled.kind() else {
            panic!("expected a normal automaton");
        };
        let hits: Vec<String> = fst
            .intersect(run)
            .unwrap()
            .into_iter()
            .map(|(k, _)| String::from_utf8(k).unwrap())
            .collect();
        assert_eq!(hits, vec!["bar", "baz", "car", "cart", "cat"]);

        let compiled = CompiledAutomaton::from_regex("(z.*)?", 10_000).unwrap();
        let AutomatonKind::Normal(run) = compiled.kind() else {
            panic!("expected a normal automaton");
        };
        let hits = fst.intersect(run).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0], (Vec::new(), 0));
        assert_eq!(hits[1].0, b"zebra".to_vec());
    }
}
