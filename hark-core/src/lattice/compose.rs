//! Composition of a compact lattice with a deterministic on-demand FST.

use std::collections::{HashMap, VecDeque};

use super::{CompactArc, CompactLattice, CompactWeight, LatticeWeight, StateId};
use crate::lm::DeterministicOnDemandFst;
use crate::symbols::EPSILON;

/// Compose `lat` with `fst`, adding the FST cost to the graph part of each
/// word arc. Epsilon arcs leave the FST state unchanged. Words the FST
/// cannot read are dropped, and so are paths that end in a state the FST
/// cannot finish in. The result is trimmed.
pub fn compose_deterministic(
    lat: &CompactLattice,
    fst: &mut dyn DeterministicOnDemandFst,
) -> CompactLattice {
    let mut out = CompactLattice::new();
    let Some(lat_start) = lat.start() else {
        return out;
    };

    let mut pairs: HashMap<(StateId, StateId), StateId> = HashMap::new();
    let mut queue = VecDeque::new();

    let fst_start = fst.start();
    let start = out.add_state();
    out.set_start(start);
    pairs.insert((lat_start, fst_start), start);
    queue.push_back((lat_start, fst_start, start));

    while let Some((ls, fs, os)) = queue.pop_front() {
        if let Some(final_weight) = lat.final_weight(ls) {
            if let Some(cost) = fst.final_cost(fs) {
                let mut w = final_weight.clone();
                w.weight = w.weight.times(LatticeWeight::new(cost, 0.0));
                out.set_final(os, w);
            }
        }

        for arc in lat.arcs(ls) {
            let (next_fs, lm_cost) = if arc.word == EPSILON {
                (fs, 0.0)
            } else {
                match fst.arc(fs, arc.word) {
                    Some(step) => step,
                    None => continue,
                }
            };

            let key = (arc.next, next_fs);
            let next_os = match pairs.get(&key) {
                Some(&id) => id,
                None => {
                    let id = out.add_state();
                    pairs.insert(key, id);
                    queue.push_back((arc.next, next_fs, id));
                    id
                }
            };
            let weight = CompactWeight::new(
                arc.weight.weight.times(LatticeWeight::new(lm_cost, 0.0)),
                arc.weight.alignment.clone(),
            );
            out.add_arc(os, CompactArc::new(arc.word, weight, next_os));
        }
    }

    out.connect();
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fst::Label;
    use crate::lattice::test_support::linear;

    /// Accepts only word 1 (cost 2.0) and ends anywhere at cost 0.5.
    struct OnlyOne;

    impl DeterministicOnDemandFst for OnlyOne {
        fn start(&mut self) -> StateId {
            0
        }
        fn final_cost(&mut self, _state: StateId) -> Option<f32> {
            Some(0.5)
        }
        fn arc(&mut self, state: StateId, word: Label) -> Option<(StateId, f32)> {
            (word == 1).then_some((state + 1, 2.0))
        }
    }

    #[test]
    fn lm_cost_is_added_to_graph_part() {
        let lat = linear(&[(0, 0.0, 1.0, 2), (1, 1.0, 1.0, 3)]);
        let out = compose_deterministic(&lat, &mut OnlyOne);
        let path = out.shortest_path().expect("acyclic").expect("path");
        assert_eq!(path.words, vec![1]);
        assert!((path.weight.graph - 3.5).abs() < 1e-6);
        assert!((path.weight.acoustic - 2.0).abs() < 1e-6);
        assert_eq!(path.alignment.len(), 5);
    }

    #[test]
    fn rejected_words_remove_the_path() {
        let lat = linear(&[(2, 0.0, 1.0, 1)]);
        let out = compose_deterministic(&lat, &mut OnlyOne);
        assert!(out.is_empty());
    }
}
