//! Compact word lattices.
//!
//! A `CompactLattice` is an acyclic weighted automaton over words. Each arc
//! carries a word label (`0` = epsilon) and a [`CompactWeight`]: a pair of
//! costs (graph/LM and acoustic) plus the transition-id alignment the arc
//! spans, one id per decoder frame. Costs are negated log-likelihoods, so
//! lower is better and weights combine by addition.
//!
//! Only the operations the finalization path needs are provided:
//!
//! | Operation | Module |
//! |-----------|--------|
//! | scale / trim / topological order / shortest path | here |
//! | composition with a deterministic on-demand FST | [`compose`] |
//! | determinization over word sequences | [`determinize`] |

pub mod compose;
pub mod determinize;

use std::cmp::Ordering;

use crate::error::{HarkError, Result};
pub use crate::fst::{Label, StateId};
use crate::symbols::EPSILON;

// ---------------------------------------------------------------------------
// Weights
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LatticeWeight {
    pub graph: f32,
    pub acoustic: f32,
}

impl LatticeWeight {
    pub const ONE: Self = Self {
        graph: 0.0,
        acoustic: 0.0,
    };

    pub fn new(graph: f32, acoustic: f32) -> Self {
        Self { graph, acoustic }
    }

    pub fn cost(&self) -> f32 {
        self.graph + self.acoustic
    }

    pub fn times(self, other: Self) -> Self {
        Self::new(self.graph + other.graph, self.acoustic + other.acoustic)
    }

    pub fn divide(self, other: Self) -> Self {
        Self::new(self.graph - other.graph, self.acoustic - other.acoustic)
    }

    pub fn scale(self, graph_scale: f32, acoustic_scale: f32) -> Self {
        Self::new(self.graph * graph_scale, self.acoustic * acoustic_scale)
    }

    /// Total order used to pick the better of two weights: lower total cost
    /// first, then lower graph cost.
    pub fn compare(&self, other: &Self) -> Ordering {
        self.cost()
            .total_cmp(&other.cost())
            .then_with(|| self.graph.total_cmp(&other.graph))
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct CompactWeight {
    pub weight: LatticeWeight,
    pub alignment: Vec<Label>,
}

impl CompactWeight {
    pub fn one() -> Self {
        Self::default()
    }

    pub fn new(weight: LatticeWeight, alignment: Vec<Label>) -> Self {
        Self { weight, alignment }
    }

    pub fn times(&self, other: &Self) -> Self {
        let mut alignment = Vec::with_capacity(self.alignment.len() + other.alignment.len());
        alignment.extend_from_slice(&self.alignment);
        alignment.extend_from_slice(&other.alignment);
        Self::new(self.weight.times(other.weight), alignment)
    }

    pub fn compare(&self, other: &Self) -> Ordering {
        self.weight
            .compare(&other.weight)
            .then_with(|| self.alignment.len().cmp(&other.alignment.len()))
            .then_with(|| self.alignment.cmp(&other.alignment))
    }

    /// Semiring plus: keep the better weight.
    pub fn plus(self, other: Self) -> Self {
        if other.compare(&self) == Ordering::Less {
            other
        } else {
            self
        }
    }
}

// ---------------------------------------------------------------------------
// Lattice
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct CompactArc {
    pub word: Label,
    pub weight: CompactWeight,
    pub next: StateId,
}

impl CompactArc {
    pub fn new(word: Label, weight: CompactWeight, next: StateId) -> Self {
        Self { word, weight, next }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
struct LatticeState {
    arcs: Vec<CompactArc>,
    final_weight: Option<CompactWeight>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompactLattice {
    start: Option<StateId>,
    states: Vec<LatticeState>,
}

/// The single best path through a lattice.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BestPath {
    /// Non-epsilon words in order.
    pub words: Vec<Label>,
    pub alignment: Vec<Label>,
    pub weight: LatticeWeight,
}

/// Arcs of the best path as `(source state, arc index)` pairs.
#[derive(Debug, Clone)]
pub(crate) struct PathTrace {
    pub arcs: Vec<(StateId, usize)>,
    pub final_state: StateId,
}

impl CompactLattice {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_state(&mut self) -> StateId {
        self.states.push(LatticeState::default());
        self.states.len() - 1
    }

    pub fn set_start(&mut self, state: StateId) {
        self.start = Some(state);
    }

    pub fn start(&self) -> Option<StateId> {
        self.start
    }

    pub fn set_final(&mut self, state: StateId, weight: CompactWeight) {
        self.states[state].final_weight = Some(weight);
    }

    pub fn final_weight(&self, state: StateId) -> Option<&CompactWeight> {
        self.states.get(state).and_then(|s| s.final_weight.as_ref())
    }

    pub fn add_arc(&mut self, state: StateId, arc: CompactArc) {
        self.states[state].arcs.push(arc);
    }

    pub fn arcs(&self, state: StateId) -> &[CompactArc] {
        self.states.get(state).map(|s| s.arcs.as_slice()).unwrap_or(&[])
    }

    pub fn num_states(&self) -> usize {
        self.states.len()
    }

    pub fn num_arcs(&self) -> usize {
        self.states.iter().map(|s| s.arcs.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Multiply graph and acoustic costs of every arc and final weight.
    pub fn scale(&mut self, graph_scale: f32, acoustic_scale: f32) {
        for state in &mut self.states {
            for arc in &mut state.arcs {
                arc.weight.weight = arc.weight.weight.scale(graph_scale, acoustic_scale);
            }
            if let Some(f) = state.final_weight.as_mut() {
                f.weight = f.weight.scale(graph_scale, acoustic_scale);
            }
        }
    }

    /// States in topological order (Kahn's algorithm).
    ///
    /// # Errors
    /// `HarkError::CyclicLattice` when the lattice has a cycle.
    pub fn topological_order(&self) -> Result<Vec<StateId>> {
        let n = self.states.len();
        let mut in_degree = vec![0usize; n];
        for state in &self.states {
            for arc in &state.arcs {
                in_degree[arc.next] += 1;
            }
        }
        let mut ready: Vec<StateId> = (0..n).filter(|&s| in_degree[s] == 0).rev().collect();
        let mut order = Vec::with_capacity(n);
        while let Some(s) = ready.pop() {
            order.push(s);
            for arc in &self.states[s].arcs {
                in_degree[arc.next] -= 1;
                if in_degree[arc.next] == 0 {
                    ready.push(arc.next);
                }
            }
        }
        if order.len() != n {
            return Err(HarkError::CyclicLattice);
        }
        Ok(order)
    }

    /// Decoder frame at which each state is reached (0 for unreachable states).
    pub fn state_times(&self) -> Result<Vec<usize>> {
        let order = self.topological_order()?;
        let mut times: Vec<Option<usize>> = vec![None; self.states.len()];
        if let Some(start) = self.start {
            times[start] = Some(0);
        }
        for &s in &order {
            let Some(t) = times[s] else { continue };
            for arc in &self.states[s].arcs {
                let next_time = t + arc.weight.alignment.len();
                times[arc.next].get_or_insert(next_time);
            }
        }
        Ok(times.into_iter().map(|t| t.unwrap_or(0)).collect())
    }

    pub(crate) fn best_path_trace(&self) -> Result<Option<PathTrace>> {
        let Some(start) = self.start else {
            return Ok(None);
        };
        let order = self.topological_order()?;
        let n = self.states.len();
        let mut best: Vec<Option<(f32, Option<(StateId, usize)>)>> = vec![None; n];
        best[start] = Some((0.0, None));

        for &s in &order {
            let Some((cost, _)) = best[s] else { continue };
            for (i, arc) in self.states[s].arcs.iter().enumerate() {
                let candidate = cost + arc.weight.weight.cost();
                let improves = match best[arc.next] {
                    Some((old, _)) => candidate < old,
                    None => true,
                };
                if improves {
                    best[arc.next] = Some((candidate, Some((s, i))));
                }
            }
        }

        let mut winner: Option<(f32, StateId)> = None;
        for (s, state) in self.states.iter().enumerate() {
            let (Some(f), Some((cost, _))) = (&state.final_weight, best[s]) else {
                continue;
            };
            let total = cost + f.weight.cost();
            if winner.map_or(true, |(w, _)| total < w) {
                winner = Some((total, s));
            }
        }
        let Some((_, final_state)) = winner else {
            return Ok(None);
        };

        let mut arcs = Vec::new();
        let mut cursor = final_state;
        while let Some((_, Some((prev, arc_index)))) = best[cursor] {
            arcs.push((prev, arc_index));
            cursor = prev;
        }
        arcs.reverse();
        Ok(Some(PathTrace { arcs, final_state }))
    }

    /// Lowest-cost complete path, or `None` when no final state is reachable.
    pub fn shortest_path(&self) -> Result<Option<BestPath>> {
        let Some(trace) = self.best_path_trace()? else {
            return Ok(None);
        };
        let mut path = BestPath::default();
        for &(s, i) in &trace.arcs {
            let arc = &self.states[s].arcs[i];
            if arc.word != EPSILON {
                path.words.push(arc.word);
            }
            path.alignment.extend_from_slice(&arc.weight.alignment);
            path.weight = path.weight.times(arc.weight.weight);
        }
        if let Some(f) = self.final_weight(trace.final_state) {
            path.alignment.extend_from_slice(&f.alignment);
            path.weight = path.weight.times(f.weight);
        }
        Ok(Some(path))
    }

    /// Drop states that are not on some start → final path and renumber.
    pub fn connect(&mut self) {
        let n = self.states.len();
        let Some(start) = self.start else {
            self.states.clear();
            return;
        };

        let mut accessible = vec![false; n];
        let mut stack = vec![start];
        accessible[start] = true;
        while let Some(s) = stack.pop() {
            for arc in &self.states[s].arcs {
                if !accessible[arc.next] {
                    accessible[arc.next] = true;
                    stack.push(arc.next);
                }
            }
        }

        let mut incoming: Vec<Vec<StateId>> = vec![Vec::new(); n];
        for (s, state) in self.states.iter().enumerate() {
            for arc in &state.arcs {
                incoming[arc.next].push(s);
            }
        }
        let mut coaccessible = vec![false; n];
        let mut stack: Vec<StateId> = (0..n)
            .filter(|&s| self.states[s].final_weight.is_some())
            .collect();
        for &s in &stack {
            coaccessible[s] = true;
        }
        while let Some(s) = stack.pop() {
            for &p in &incoming[s] {
                if !coaccessible[p] {
                    coaccessible[p] = true;
                    stack.push(p);
                }
            }
        }

        let mut remap: Vec<Option<StateId>> = vec![None; n];
        let mut next_id = 0;
        for s in 0..n {
            if accessible[s] && coaccessible[s] {
                remap[s] = Some(next_id);
                next_id += 1;
            }
        }
        let Some(new_start) = remap[start] else {
            self.start = None;
            self.states.clear();
            return;
        };

        let old_states = std::mem::take(&mut self.states);
        for (s, mut state) in old_states.into_iter().enumerate() {
            if remap[s].is_none() {
                continue;
            }
            state.arcs.retain(|a| remap[a.next].is_some());
            for arc in &mut state.arcs {
                if let Some(mapped) = remap[arc.next] {
                    arc.next = mapped;
                }
            }
            self.states.push(state);
        }
        self.start = Some(new_start);
    }
}
