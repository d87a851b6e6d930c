//! Silence weighting of adaptation statistics.
//!
//! While decoding online, frames the current best path assigns to silence
//! phones are down-weighted in the adaptation stream, so that its speaker
//! statistics are estimated from speech. The policy only decides the
//! weights; the feature pipeline applies them.
//!
//! Weights are reported as deltas against what was pushed before: the
//! pipeline starts every frame at weight 0, so the first update of a frame
//! reports its full weight and later updates only report changes.

use std::collections::HashSet;

use crate::config::SilenceWeightingConfig;
use crate::inference::Decoder;
use crate::lattice::Label;

#[derive(Debug, Clone)]
pub struct SilenceWeighting {
    silence_phones: HashSet<Label>,
    silence_weight: f32,
    subsampling: usize,
    active: bool,
    /// Latest traceback, one flag per decoder frame of the current segment.
    frame_is_silence: Vec<bool>,
    /// Feature frame that `pushed[0]` refers to.
    pushed_base: usize,
    pushed: Vec<f32>,
}

impl SilenceWeighting {
    pub fn new(config: &SilenceWeightingConfig, subsampling: usize) -> Self {
        Self {
            silence_phones: config.silence_phones.iter().copied().collect(),
            silence_weight: config.silence_weight,
            subsampling: subsampling.max(1),
            active: config.is_active(),
            frame_is_silence: Vec::new(),
            pushed_base: 0,
            pushed: Vec::new(),
        }
    }

    pub fn active(&self) -> bool {
        self.active
    }

    /// Refresh the per-frame silence decisions from the decoder's best path.
    pub fn compute_current_traceback(&mut self, decoder: &dyn Decoder, use_final_probs: bool) {
        self.frame_is_silence = decoder
            .traceback(use_final_probs)
            .into_iter()
            .map(|phone| self.silence_phones.contains(&phone))
            .collect();
    }

    /// `(feature frame, weight delta)` pairs for frames whose weight changed.
    ///
    /// `first_decoder_frame` is the decoder frame offset of the current
    /// segment; feature frames before `first_decoder_frame * subsampling`
    /// belong to an earlier segment and are never reported.
    pub fn delta_weights(&mut self, num_frames_ready: usize, first_decoder_frame: usize) -> Vec<(usize, f32)> {
        if !self.active {
            return Vec::new();
        }
        let begin = first_decoder_frame * self.subsampling;
        if begin != self.pushed_base {
            self.pushed_base = begin;
            self.pushed.clear();
        }

        let mut deltas = Vec::new();
        for (t, &silence) in self.frame_is_silence.iter().enumerate() {
            let target = if silence { self.silence_weight } else { 1.0 };
            let first = begin + t * self.subsampling;
            let last = (first + self.subsampling).min(num_frames_ready);
            for frame in first..last {
                let slot = frame - begin;
                if slot >= self.pushed.len() {
                    self.pushed.resize(slot + 1, 0.0);
                }
                let delta = target - self.pushed[slot];
                if delta != 0.0 {
                    deltas.push((frame, delta));
                    self.pushed[slot] = target;
                }
            }
        }
        deltas
    }

    /// Decoder frames (segment relative) of the latest traceback that are not
    /// silence.
    pub fn nonsilence_frames(&self) -> Vec<usize> {
        self.frame_is_silence
            .iter()
            .enumerate()
            .filter(|(_, &silence)| !silence)
            .map(|(i, _)| i)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EndpointConfig;
    use crate::error::Result;
    use crate::inference::FeaturePipeline;
    use crate::lattice::{BestPath, CompactLattice};

    struct FixedTraceback(Vec<Label>);

    impl Decoder for FixedTraceback {
        fn init_decoding(&mut self, _frame_offset: usize) {}
        fn advance_decoding(&mut self, _features: &mut dyn FeaturePipeline) {}
        fn finalize_decoding(&mut self) {}
        fn num_frames_decoded(&self) -> usize {
            self.0.len()
        }
        fn endpoint_detected(&self, _config: &EndpointConfig) -> bool {
            false
        }
        fn traceback(&self, _use_final_probs: bool) -> Vec<Label> {
            self.0.clone()
        }
        fn lattice(&self, _end_of_utterance: bool) -> Result<CompactLattice> {
            Ok(CompactLattice::new())
        }
        fn best_path(&self, _end_of_utterance: bool) -> Result<BestPath> {
            Ok(BestPath::default())
        }
    }

    fn policy() -> SilenceWeighting {
        let config = SilenceWeightingConfig {
            silence_phones: vec![1],
            silence_weight: 0.25,
        };
        SilenceWeighting::new(&config, 3)
    }

    #[test]
    fn first_update_reports_full_weights() {
        let mut sw = policy();
        sw.compute_current_traceback(&FixedTraceback(vec![1, 2]), false);
        let deltas = sw.delta_weights(6, 0);
        assert_eq!(
            deltas,
            vec![(0, 0.25), (1, 0.25), (2, 0.25), (3, 1.0), (4, 1.0), (5, 1.0)]
        );
    }

    #[test]
    fn only_changed_frames_are_reported_again() {
        let mut sw = policy();
        sw.compute_current_traceback(&FixedTraceback(vec![1, 2]), false);
        sw.delta_weights(6, 0);
        // frame 0 flips to speech, a new frame arrives as silence
        sw.compute_current_traceback(&FixedTraceback(vec![2, 2, 1]), false);
        let deltas = sw.delta_weights(7, 0);
        assert_eq!(deltas, vec![(0, 0.75), (1, 0.75), (2, 0.75), (6, 0.25)]);
    }

    #[test]
    fn earlier_segments_are_untouched() {
        let mut sw = policy();
        sw.compute_current_traceback(&FixedTraceback(vec![2]), false);
        let deltas = sw.delta_weights(100, 10);
        assert_eq!(deltas, vec![(30, 1.0), (31, 1.0), (32, 1.0)]);
    }

    #[test]
    fn inactive_policy_is_silent() {
        let mut sw = SilenceWeighting::new(&SilenceWeightingConfig::default(), 3);
        sw.compute_current_traceback(&FixedTraceback(vec![1, 1]), false);
        assert!(!sw.active());
        assert!(sw.delta_weights(6, 0).is_empty());
        assert_eq!(sw.nonsilence_frames(), vec![0, 1]);
    }

    #[test]
    fn nonsilence_frames_skip_silence_phones() {
        let mut sw = policy();
        sw.compute_current_traceback(&FixedTraceback(vec![1, 2, 1, 2]), true);
        assert_eq!(sw.nonsilence_frames(), vec![1, 3]);
    }
}
