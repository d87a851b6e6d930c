//! Second-pass rescoring of the final lattice.
//!
//! ```text
//!  lattice ─► scale(g × -1) ─► ∘ G₁ ─► det ─► scale(g × -1) ─► ∘ G₂ ─► det
//!                 └── removes the first-pass LM cost ──┘     └─ adds the big LM ─┘
//! ```
//!
//! After the first three steps every arc's graph cost is `g - G₁`; composing
//! with the const-ARPA model and determinizing again yields `g - G₁ + G₂`.
//! Input and output labels of a compact word lattice are the same word, so
//! the invert steps of a transducer formulation are implicit here.

pub mod mbr;

use std::sync::Arc;

use tracing::debug;

pub use mbr::MinimumBayesRisk;

use crate::error::Result;
use crate::fst::VectorFst;
use crate::lattice::compose::compose_deterministic;
use crate::lattice::determinize::determinize;
use crate::lattice::CompactLattice;
use crate::lm::{BackoffFst, ConstArpaLm};

/// Language models for the second pass: the graph the decoder used
/// (`G.fst`) and the larger const-ARPA model replacing it.
#[derive(Debug, Clone)]
pub struct RescoringLm {
    pub first_pass: Arc<VectorFst>,
    pub const_arpa: Arc<ConstArpaLm>,
}

impl RescoringLm {
    pub fn new(first_pass: VectorFst, const_arpa: ConstArpaLm) -> Self {
        Self {
            first_pass: Arc::new(first_pass),
            const_arpa: Arc::new(const_arpa),
        }
    }
}

/// Replace the first-pass LM scores in `clat` with the const-ARPA scores.
///
/// Without an LM the lattice is returned unchanged.
///
/// # Errors
/// `HarkError::CyclicLattice` if the decoder produced a cyclic lattice.
pub fn rescore(clat: CompactLattice, lm: Option<&RescoringLm>) -> Result<CompactLattice> {
    let Some(lm) = lm else {
        return Ok(clat);
    };

    let mut lat = clat;
    lat.scale(-1.0, 1.0);
    let mut first_pass = BackoffFst::new(&lm.first_pass);
    let lat = compose_deterministic(&lat, &mut first_pass);
    let mut lat = determinize(&lat)?;
    lat.scale(-1.0, 1.0);

    let mut arpa = lm.const_arpa.deterministic_fst();
    let lat = compose_deterministic(&lat, &mut arpa);
    let lat = determinize(&lat)?;

    debug!(
        states = lat.num_states(),
        arcs = lat.num_arcs(),
        "rescored lattice"
    );
    Ok(lat)
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::fst::{FstArc, Label};
    use crate::lattice::{CompactArc, CompactWeight, LatticeWeight};
    use crate::symbols::EPSILON;

    const BOS: Label = 50;
    const EOS: Label = 51;

    /// Unigram `G.fst`: one state looping over words 1 and 2 with the given costs.
    fn unigram_graph(cost_1: f32, cost_2: f32) -> VectorFst {
        let mut g = VectorFst::new();
        let s = g.add_state();
        g.set_start(s);
        g.set_final(s, 0.0);
        g.add_arc(s, FstArc::new(1, 1, cost_1, s));
        g.add_arc(s, FstArc::new(2, 2, cost_2, s));
        g
    }

    /// Unigram ARPA with the given natural-log costs for words 1 and 2.
    fn unigram_arpa(cost_1: f32, cost_2: f32) -> ConstArpaLm {
        let ln10 = std::f32::consts::LN_10;
        let mut lm = ConstArpaLm::new(1, BOS, EOS);
        lm.add_ngram(&[EOS], 0.0, 0.0);
        lm.add_ngram(&[1], -cost_1 / ln10, 0.0);
        lm.add_ngram(&[2], -cost_2 / ln10, 0.0);
        lm
    }

    /// Word 1 vs word 2 in parallel, first-pass graph cost already applied.
    fn alternatives(first_pass_1: f32, first_pass_2: f32) -> CompactLattice {
        let mut lat = CompactLattice::new();
        let a = lat.add_state();
        let b = lat.add_state();
        lat.set_start(a);
        lat.set_final(b, CompactWeight::one());
        let w = |g: f32, ac: f32| CompactWeight::new(LatticeWeight::new(g, ac), vec![9; 3]);
        lat.add_arc(a, CompactArc::new(1, w(first_pass_1, 1.0), b));
        lat.add_arc(a, CompactArc::new(2, w(first_pass_2, 1.5), b));
        lat
    }

    #[test]
    fn without_lm_the_lattice_is_untouched() {
        let lat = alternatives(1.0, 1.0);
        let out = rescore(lat.clone(), None).expect("no-op");
        assert_eq!(out, lat);
    }

    #[test]
    fn first_pass_cost_is_replaced_by_const_arpa_cost() {
        let lm = RescoringLm::new(unigram_graph(1.0, 1.0), unigram_arpa(3.0, 0.5));
        let out = rescore(alternatives(1.0, 1.0), Some(&lm)).expect("rescore");
        let path = out.shortest_path().expect("acyclic").expect("path");
        // word 1: 1.0 - 1.0 + 3.0 + ac 1.0 ; word 2: 1.0 - 1.0 + 0.5 + ac 1.5
        assert_eq!(path.words, vec![2]);
        assert_relative_eq!(path.weight.graph, 0.5, epsilon = 1e-4);
        assert_relative_eq!(path.weight.acoustic, 1.5, epsilon = 1e-4);
        assert_eq!(path.alignment.len(), 3);
    }

    #[test]
    fn epsilon_arcs_survive_rescoring() {
        let mut lat = CompactLattice::new();
        let s: Vec<_> = (0..3).map(|_| lat.add_state()).collect();
        lat.set_start(s[0]);
        let w = CompactWeight::new(LatticeWeight::new(0.0, 1.0), vec![4; 2]);
        lat.add_arc(s[0], CompactArc::new(EPSILON, w.clone(), s[1]));
        lat.add_arc(s[1], CompactArc::new(1, w, s[2]));
        lat.set_final(s[2], CompactWeight::one());

        let lm = RescoringLm::new(unigram_graph(0.0, 0.0), unigram_arpa(0.0, 0.0));
        let out = rescore(lat, Some(&lm)).expect("rescore");
        let path = out.shortest_path().expect("acyclic").expect("path");
        assert_eq!(path.words, vec![1]);
        assert_eq!(path.alignment.len(), 4);
    }
}
