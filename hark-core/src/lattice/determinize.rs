//! Determinization of acyclic compact lattices.
//!
//! Output states are weighted subsets of input states. For every word
//! leaving a subset the arc weight is the common divisor of the candidate
//! weights (the best cost plus the longest shared alignment prefix); what
//! remains is kept as a per-state residual. Epsilon arcs are absorbed into
//! the residuals, so the result has at most one arc per word from each
//! state and keeps only the best path for every word sequence.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, VecDeque};

use super::{CompactArc, CompactLattice, CompactWeight, Label, StateId};
use crate::error::Result;
use crate::symbols::EPSILON;

type Subset = Vec<(StateId, CompactWeight)>;
type SubsetKey = Vec<(StateId, i64, i64, Vec<Label>)>;

/// Weights closer than 1/1024 land in the same output state.
fn quantize(x: f32) -> i64 {
    (x * 1024.0).round() as i64
}

fn subset_key(subset: &Subset) -> SubsetKey {
    subset
        .iter()
        .map(|(s, w)| {
            (
                *s,
                quantize(w.weight.graph),
                quantize(w.weight.acoustic),
                w.alignment.clone(),
            )
        })
        .collect()
}

fn improve(best: &mut BTreeMap<StateId, CompactWeight>, state: StateId, weight: CompactWeight) -> bool {
    match best.get(&state) {
        Some(old) if old.compare(&weight) != Ordering::Greater => false,
        _ => {
            best.insert(state, weight);
            true
        }
    }
}

fn epsilon_closure(lat: &CompactLattice, seeds: Subset) -> Subset {
    let mut best: BTreeMap<StateId, CompactWeight> = BTreeMap::new();
    let mut pending = Vec::new();
    for (s, w) in seeds {
        if improve(&mut best, s, w) {
            pending.push(s);
        }
    }
    while let Some(s) = pending.pop() {
        let Some(w) = best.get(&s).cloned() else { continue };
        for arc in lat.arcs(s).iter().filter(|a| a.word == EPSILON) {
            if improve(&mut best, arc.next, w.times(&arc.weight)) {
                pending.push(arc.next);
            }
        }
    }
    best.into_iter().collect()
}

/// Split a subset into its common divisor and the residuals.
fn normalize(subset: Subset) -> (CompactWeight, Subset) {
    let Some(best) = subset
        .iter()
        .map(|(_, w)| w.weight)
        .min_by(|a, b| a.compare(b))
    else {
        return (CompactWeight::one(), subset);
    };

    let first = &subset[0].1.alignment;
    let mut prefix_len = first.len();
    for (_, w) in &subset[1..] {
        prefix_len = first
            .iter()
            .zip(&w.alignment)
            .take(prefix_len)
            .take_while(|(a, b)| a == b)
            .count();
    }
    let divisor = CompactWeight::new(best, first[..prefix_len].to_vec());

    let residuals = subset
        .into_iter()
        .map(|(s, w)| {
            (
                s,
                CompactWeight::new(w.weight.divide(best), w.alignment[prefix_len..].to_vec()),
            )
        })
        .collect();
    (divisor, residuals)
}

/// Determinize `lat` over word labels.
///
/// # Errors
/// `HarkError::CyclicLattice` if the input has a cycle.
pub fn determinize(lat: &CompactLattice) -> Result<CompactLattice> {
    lat.topological_order()?;

    let mut out = CompactLattice::new();
    let Some(start) = lat.start() else {
        return Ok(out);
    };

    let start_subset = epsilon_closure(lat, vec![(start, CompactWeight::one())]);
    let out_start = out.add_state();
    out.set_start(out_start);

    let mut index: HashMap<SubsetKey, StateId> = HashMap::new();
    index.insert(subset_key(&start_subset), out_start);
    let mut queue = VecDeque::from([(out_start, start_subset)]);

    while let Some((os, subset)) = queue.pop_front() {
        let mut final_weight: Option<CompactWeight> = None;
        for (s, w) in &subset {
            if let Some(f) = lat.final_weight(*s) {
                let candidate = w.times(f);
                final_weight = Some(match final_weight {
                    Some(prev) => prev.plus(candidate),
                    None => candidate,
                });
            }
        }
        if let Some(f) = final_weight {
            out.set_final(os, f);
        }

        let mut by_word: BTreeMap<Label, Subset> = BTreeMap::new();
        for (s, w) in &subset {
            for arc in lat.arcs(*s).iter().filter(|a| a.word != EPSILON) {
                by_word
                    .entry(arc.word)
                    .or_default()
                    .push((arc.next, w.times(&arc.weight)));
            }
        }

        for (word, seeds) in by_word {
            let (divisor, residuals) = normalize(epsilon_closure(lat, seeds));
            let key = subset_key(&residuals);
            let next = match index.get(&key) {
                Some(&id) => id,
                None => {
                    let id = out.add_state();
                    index.insert(key, id);
                    queue.push_back((id, residuals));
                    id
                }
            };
            out.add_arc(os, CompactArc::new(word, divisor, next));
        }
    }

    Ok(out)
}
