//! Minimal mutable weighted FST over the tropical semiring.
//!
//! Used for the shapes the session layer itself builds or inspects: grammar
//! word loops, the first-pass rescoring LM graph and the decoding graphs a
//! model hands to its engine. Weights are costs (negated log probabilities);
//! `None` as a final weight means "not final".

use std::collections::BTreeSet;

pub type Label = u32;
pub type StateId = usize;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FstArc {
    pub ilabel: Label,
    pub olabel: Label,
    pub weight: f32,
    pub next: StateId,
}

impl FstArc {
    pub fn new(ilabel: Label, olabel: Label, weight: f32, next: StateId) -> Self {
        Self {
            ilabel,
            olabel,
            weight,
            next,
        }
    }
}

#[derive(Debug, Clone, Default)]
struct FstState {
    arcs: Vec<FstArc>,
    final_weight: Option<f32>,
}

#[derive(Debug, Clone, Default)]
pub struct VectorFst {
    start: Option<StateId>,
    states: Vec<FstState>,
}

impl VectorFst {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_state(&mut self) -> StateId {
        self.states.push(FstState::default());
        self.states.len() - 1
    }

    pub fn set_start(&mut self, state: StateId) {
        self.start = Some(state);
    }

    pub fn start(&self) -> Option<StateId> {
        self.start
    }

    pub fn set_final(&mut self, state: StateId, weight: f32) {
        self.states[state].final_weight = Some(weight);
    }

    pub fn final_weight(&self, state: StateId) -> Option<f32> {
        self.states.get(state).and_then(|s| s.final_weight)
    }

    pub fn add_arc(&mut self, state: StateId, arc: FstArc) {
        self.states[state].arcs.push(arc);
    }

    pub fn arcs(&self, state: StateId) -> &[FstArc] {
        self.states.get(state).map(|s| s.arcs.as_slice()).unwrap_or(&[])
    }

    pub fn num_states(&self) -> usize {
        self.states.len()
    }

    pub fn num_arcs(&self) -> usize {
        self.states.iter().map(|s| s.arcs.len()).sum()
    }

    /// Sort every state's arcs by input label (stable).
    pub fn arc_sort_ilabel(&mut self) {
        for state in &mut self.states {
            state.arcs.sort_by_key(|a| a.ilabel);
        }
    }

    /// First arc leaving `state` with input label `ilabel`.
    pub fn find_arc(&self, state: StateId, ilabel: Label) -> Option<&FstArc> {
        self.arcs(state).iter().find(|a| a.ilabel == ilabel)
    }

    /// Every non-epsilon output label on any arc.
    pub fn output_labels(&self) -> BTreeSet<Label> {
        self.states
            .iter()
            .flat_map(|s| s.arcs.iter())
            .map(|a| a.olabel)
            .filter(|&l| l != 0)
            .collect()
    }
}
