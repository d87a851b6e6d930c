//! Minimum-Bayes-risk word sequence with posterior confidences and frame
//! intervals.
//!
//! Posteriors come from a forward-backward pass over the lattice in the log
//! domain. Word arcs are then grouped into confusion bins by time:
//!
//! ```text
//!   frames   0 ─────── 3 ─────── 6
//!   bin 0    one .38   │
//!            two .62   │
//!   bin 1              three .69
//!                      four  .31
//! ```
//!
//! Each bin emits its highest-mass word, or nothing when the mass left to
//! epsilon (paths with no word there) is larger. The winner's mass is its
//! confidence.

use crate::error::{HarkError, Result};
use crate::lattice::{CompactLattice, Label};
use crate::symbols::EPSILON;

fn log_add(a: f64, b: f64) -> f64 {
    if a == f64::NEG_INFINITY {
        return b;
    }
    if b == f64::NEG_INFINITY {
        return a;
    }
    let (hi, lo) = if a > b { (a, b) } else { (b, a) };
    hi + (lo - hi).exp().ln_1p()
}

#[derive(Debug, Clone, Copy)]
struct ArcPosterior {
    word: Label,
    begin: usize,
    end: usize,
    posterior: f64,
}

/// Per-word mass inside one bin, with the span of its strongest arc.
#[derive(Debug, Clone, Copy)]
struct Candidate {
    word: Label,
    mass: f64,
    span: (usize, usize),
    best: f64,
}

/// Arcs competing for the same stretch of time.
#[derive(Debug, Clone, Default)]
struct Bin {
    /// Span of the strongest arc so far; later arcs join when their
    /// midpoint falls inside it.
    anchor: (usize, usize),
    anchor_posterior: f64,
    candidates: Vec<Candidate>,
}

impl Bin {
    fn covers(&self, arc: &ArcPosterior) -> bool {
        // doubled midpoint keeps this in integers
        let mid2 = arc.begin + arc.end;
        self.anchor.0 * 2 <= mid2 && mid2 < self.anchor.1 * 2
    }

    fn add(&mut self, arc: ArcPosterior) {
        if self.candidates.is_empty() || arc.posterior > self.anchor_posterior {
            self.anchor = (arc.begin, arc.end);
            self.anchor_posterior = arc.posterior;
        }
        let span = (arc.begin, arc.end);
        match self.candidates.iter_mut().find(|c| c.word == arc.word) {
            Some(c) => {
                c.mass += arc.posterior;
                if arc.posterior > c.best {
                    c.best = arc.posterior;
                    c.span = span;
                }
            }
            None => self.candidates.push(Candidate {
                word: arc.word,
                mass: arc.posterior,
                span,
                best: arc.posterior,
            }),
        }
    }

    /// Highest-mass word, unless epsilon holds more.
    fn decide(&self) -> Option<Candidate> {
        let total: f64 = self.candidates.iter().map(|c| c.mass).sum();
        let epsilon = (1.0 - total).max(0.0);
        self.candidates
            .iter()
            .copied()
            .max_by(|a, b| a.mass.total_cmp(&b.mass))
            .filter(|winner| winner.mass >= epsilon)
    }
}

#[derive(Debug, Clone, Default)]
pub struct MinimumBayesRisk {
    words: Vec<Label>,
    times: Vec<(usize, usize)>,
    confidences: Vec<f32>,
}

impl MinimumBayesRisk {
    /// # Errors
    /// `ResourceExhausted` when the lattice has more than `max_states`
    /// states, `CyclicLattice` for cyclic input.
    pub fn new(clat: &CompactLattice, max_states: usize) -> Result<Self> {
        if clat.num_states() > max_states {
            return Err(HarkError::ResourceExhausted(format!(
                "lattice has {} states, limit is {max_states}",
                clat.num_states()
            )));
        }
        let Some(start) = clat.start() else {
            return Ok(Self::default());
        };

        let order = clat.topological_order()?;
        let n = clat.num_states();

        let mut alpha = vec![f64::NEG_INFINITY; n];
        alpha[start] = 0.0;
        for &s in &order {
            if alpha[s] == f64::NEG_INFINITY {
                continue;
            }
            for arc in clat.arcs(s) {
                let score = alpha[s] - f64::from(arc.weight.weight.cost());
                alpha[arc.next] = log_add(alpha[arc.next], score);
            }
        }

        let mut beta = vec![f64::NEG_INFINITY; n];
        for &s in order.iter().rev() {
            let mut b = clat
                .final_weight(s)
                .map_or(f64::NEG_INFINITY, |f| -f64::from(f.weight.cost()));
            for arc in clat.arcs(s) {
                b = log_add(b, beta[arc.next] - f64::from(arc.weight.weight.cost()));
            }
            beta[s] = b;
        }
        let total = beta[start];
        if total == f64::NEG_INFINITY {
            return Ok(Self::default());
        }

        let state_times = clat.state_times()?;
        let mut arcs = Vec::new();
        for &s in &order {
            if alpha[s] == f64::NEG_INFINITY {
                continue;
            }
            for arc in clat.arcs(s) {
                if arc.word == EPSILON {
                    continue;
                }
                let log_post = alpha[s] - f64::from(arc.weight.weight.cost()) + beta[arc.next] - total;
                let begin = state_times[s];
                arcs.push(ArcPosterior {
                    word: arc.word,
                    begin,
                    end: begin + arc.weight.alignment.len(),
                    posterior: log_post.exp(),
                });
            }
        }
        arcs.sort_by_key(|a| (a.begin, a.end));

        let mut bins: Vec<Bin> = Vec::new();
        for arc in arcs {
            match bins.last_mut() {
                Some(bin) if bin.covers(&arc) => bin.add(arc),
                _ => {
                    let mut bin = Bin::default();
                    bin.add(arc);
                    bins.push(bin);
                }
            }
        }

        let mut out = Self::default();
        for winner in bins.iter().filter_map(Bin::decide) {
            out.words.push(winner.word);
            out.times.push(winner.span);
            out.confidences.push(winner.mass.clamp(0.0, 1.0) as f32);
        }
        Ok(out)
    }

    pub fn one_best(&self) -> &[Label] {
        &self.words
    }

    pub fn one_best_confidences(&self) -> &[f32] {
        &self.confidences
    }

    /// `[start, end)` decoder frames of each one-best word, relative to the
    /// lattice start.
    pub fn one_best_times(&self) -> &[(usize, usize)] {
        &self.times
    }
}
