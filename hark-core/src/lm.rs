//! Language models used for lattice rescoring.
//!
//! Both models are exposed through [`DeterministicOnDemandFst`]: a word
//! acceptor whose states are expanded lazily as a lattice is composed with it.
//!
//! - [`BackoffFst`] walks a backoff n-gram graph (`G.fst` shape): word arcs
//!   plus epsilon backoff arcs. A missing word arc falls back along epsilon
//!   arcs, accumulating the backoff cost.
//! - [`ConstArpaLm`] holds an ARPA-style n-gram table; its FST states are
//!   interned word histories.

use std::collections::HashMap;

use crate::fst::{Label, StateId, VectorFst};
use crate::symbols::EPSILON;

/// Deterministic word acceptor expanded on demand.
pub trait DeterministicOnDemandFst {
    fn start(&mut self) -> StateId;
    /// Cost of ending in `state`, `None` if it cannot end there.
    fn final_cost(&mut self, state: StateId) -> Option<f32>;
    /// Destination and cost of reading `word` from `state`.
    fn arc(&mut self, state: StateId, word: Label) -> Option<(StateId, f32)>;
}

// ---------------------------------------------------------------------------
// Backoff graph
// ---------------------------------------------------------------------------

pub struct BackoffFst<'a> {
    fst: &'a VectorFst,
}

impl<'a> BackoffFst<'a> {
    pub fn new(fst: &'a VectorFst) -> Self {
        Self { fst }
    }

    fn backoff(&self, state: StateId) -> Option<(StateId, f32)> {
        self.fst
            .arcs(state)
            .iter()
            .find(|a| a.ilabel == EPSILON)
            .map(|a| (a.next, a.weight))
    }
}

impl DeterministicOnDemandFst for BackoffFst<'_> {
    fn start(&mut self) -> StateId {
        self.fst.start().unwrap_or(0)
    }

    fn final_cost(&mut self, state: StateId) -> Option<f32> {
        let mut cost = 0.0;
        let mut current = state;
        for _ in 0..=self.fst.num_states() {
            if let Some(w) = self.fst.final_weight(current) {
                return Some(cost + w);
            }
            let (next, w) = self.backoff(current)?;
            cost += w;
            current = next;
        }
        None
    }

    fn arc(&mut self, state: StateId, word: Label) -> Option<(StateId, f32)> {
        let mut cost = 0.0;
        let mut current = state;
        // bounded so a malformed epsilon cycle cannot spin forever
        for _ in 0..=self.fst.num_states() {
            if let Some(a) = self.fst.find_arc(current, word) {
                return Some((a.next, cost + a.weight));
            }
            let (next, w) = self.backoff(current)?;
            cost += w;
            current = next;
        }
        None
    }
}

// ---------------------------------------------------------------------------
// ARPA n-gram table
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
struct NgramEntry {
    /// Natural-log probability.
    logprob: f32,
    /// Natural-log backoff weight.
    backoff: f32,
}

/// N-gram language model keyed by word-id sequences.
#[derive(Debug, Clone)]
pub struct ConstArpaLm {
    order: usize,
    bos: Label,
    eos: Label,
    ngrams: HashMap<Vec<Label>, NgramEntry>,
}

impl ConstArpaLm {
    pub fn new(order: usize, bos: Label, eos: Label) -> Self {
        Self {
            order: order.max(1),
            bos,
            eos,
            ngrams: HashMap::new(),
        }
    }

    pub fn order(&self) -> usize {
        self.order
    }

    /// Add an n-gram with ARPA (log10) probability and backoff.
    pub fn add_ngram(&mut self, words: &[Label], log10_prob: f32, log10_backoff: f32) {
        let ln10 = std::f32::consts::LN_10;
        self.ngrams.insert(
            words.to_vec(),
            NgramEntry {
                logprob: log10_prob * ln10,
                backoff: log10_backoff * ln10,
            },
        );
    }

    /// `ln P(word | history)` with standard Katz backoff, `None` when the
    /// word has no unigram.
    pub fn log_prob(&self, history: &[Label], word: Label) -> Option<f32> {
        let keep = history.len().min(self.order.saturating_sub(1));
        let mut history = &history[history.len() - keep..];
        let mut backoff = 0.0;
        loop {
            let mut key = history.to_vec();
            key.push(word);
            if let Some(entry) = self.ngrams.get(&key) {
                return Some(backoff + entry.logprob);
            }
            if history.is_empty() {
                return None;
            }
            if let Some(entry) = self.ngrams.get(history) {
                backoff += entry.backoff;
            }
            history = &history[1..];
        }
    }

    /// Longest suffix of `history` that is itself a known n-gram.
    fn reduce_history(&self, history: &[Label]) -> Vec<Label> {
        let keep = history.len().min(self.order.saturating_sub(1));
        let mut h = &history[history.len() - keep..];
        while !h.is_empty() && !self.ngrams.contains_key(h) {
            h = &h[1..];
        }
        h.to_vec()
    }

    pub fn deterministic_fst(&self) -> ConstArpaFst<'_> {
        ConstArpaFst {
            lm: self,
            histories: Vec::new(),
            index: HashMap::new(),
        }
    }
}

/// On-demand acceptor over a [`ConstArpaLm`]. States are word histories.
pub struct ConstArpaFst<'a> {
    lm: &'a ConstArpaLm,
    histories: Vec<Vec<Label>>,
    index: HashMap<Vec<Label>, StateId>,
}

impl ConstArpaFst<'_> {
    fn intern(&mut self, history: Vec<Label>) -> StateId {
        if let Some(&id) = self.index.get(&history) {
            return id;
        }
        let id = self.histories.len();
        self.histories.push(history.clone());
        self.index.insert(history, id);
        id
    }
}

impl DeterministicOnDemandFst for ConstArpaFst<'_> {
    fn start(&mut self) -> StateId {
        let bos = vec![self.lm.bos];
        self.intern(bos)
    }

    fn final_cost(&mut self, state: StateId) -> Option<f32> {
        let history = self.histories.get(state)?;
        self.lm.log_prob(history, self.lm.eos).map(|lp| -lp)
    }

    fn arc(&mut self, state: StateId, word: Label) -> Option<(StateId, f32)> {
        let history = self.histories.get(state)?;
        let logprob = self.lm.log_prob(history, word)?;
        let mut extended = history.clone();
        extended.push(word);
        let next = self.lm.reduce_history(&extended);
        Some((self.intern(next), -logprob))
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::fst::FstArc;

    const BOS: Label = 100;
    const EOS: Label = 101;

    fn bigram() -> ConstArpaLm {
        let mut lm = ConstArpaLm::new(2, BOS, EOS);
        lm.add_ngram(&[BOS], -99.0, -0.5);
        lm.add_ngram(&[EOS], -1.0, 0.0);
        lm.add_ngram(&[1], -1.0, -0.2);
        lm.add_ngram(&[2], -2.0, 0.0);
        lm.add_ngram(&[BOS, 1], -0.1, 0.0);
        lm.add_ngram(&[1, EOS], -0.3, 0.0);
        lm
    }

    #[test]
    fn explicit_bigram_is_used() {
        let lm = bigram();
        assert_relative_eq!(
            lm.log_prob(&[BOS], 1).expect("known"),
            -0.1 * std::f32::consts::LN_10,
            epsilon = 1e-5
        );
    }

    #[test]
    fn missing_bigram_backs_off() {
        let lm = bigram();
        let expected = (-0.5 + -2.0) * std::f32::consts::LN_10;
        assert_relative_eq!(lm.log_prob(&[BOS], 2).expect("unigram"), expected, epsilon = 1e-5);
        assert_eq!(lm.log_prob(&[BOS], 42), None);
    }

    #[test]
    fn fst_walks_histories() {
        let lm = bigram();
        let mut fst = lm.deterministic_fst();
        let start = fst.start();
        let (s1, c1) = fst.arc(start, 1).expect("word 1");
        assert_relative_eq!(c1, 0.1 * std::f32::consts::LN_10, epsilon = 1e-5);
        let end = fst.final_cost(s1).expect("eos");
        assert_relative_eq!(end, 0.3 * std::f32::consts::LN_10, epsilon = 1e-5);
        // unknown history collapses to the empty context
        let (s2, _) = fst.arc(s1, 2).expect("word 2");
        assert_ne!(s1, s2);
        assert!(fst.arc(s2, 42).is_none());
    }

    #[test]
    fn backoff_fst_follows_epsilon_arcs() {
        // 0 = history state, 1 = backoff state (final)
        let mut g = VectorFst::new();
        let h = g.add_state();
        let b = g.add_state();
        g.set_start(h);
        g.set_final(b, 0.5);
        g.add_arc(h, FstArc::new(1, 1, 1.0, h));
        g.add_arc(h, FstArc::new(EPSILON, EPSILON, 2.0, b));
        g.add_arc(b, FstArc::new(3, 3, 4.0, h));

        let mut fst = BackoffFst::new(&g);
        assert_eq!(fst.arc(h, 1), Some((h, 1.0)));
        assert_eq!(fst.arc(h, 3), Some((h, 6.0)));
        assert_eq!(fst.arc(h, 9), None);
        assert_eq!(fst.final_cost(h), Some(2.5));
    }
}
