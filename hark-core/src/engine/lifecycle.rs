//! Segment bookkeeping and the pipeline reset policy.
//!
//! A session is a sequence of segments (one per `result`/`final_result`).
//! Between segments the next ingestion either keeps the feature pipeline and
//! restarts the search at the current frame offset (soft), or throws the
//! pipeline away and starts a new round from the model baseline (hard).
//! Hard resets bound the memory a long-running session holds.
//!
//! ```text
//!   absolute time = samples_round_start / rate
//!                 + (frame_offset + local_frame) * frame_duration
//! ```
//!
//! A hard reset folds the samples of the finished round into
//! `samples_round_start` and zeroes the frame offset, so the formula stays
//! continuous across rounds.

use super::RecognizerState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineReset {
    /// Rebuild the feature pipeline and decoder.
    Hard,
    /// Restart the search at the current frame offset.
    Soft,
}

pub fn plan_reset(
    has_decoder: bool,
    state: RecognizerState,
    frame_offset: usize,
    max_frame_offset: usize,
) -> PipelineReset {
    if !has_decoder || state == RecognizerState::Finalized || frame_offset > max_frame_offset {
        PipelineReset::Hard
    } else {
        PipelineReset::Soft
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SegmentClock {
    /// Decoder frames consumed by earlier segments of this round.
    pub frame_offset: usize,
    /// Samples ingested in this round.
    pub samples_processed: u64,
    /// Samples ingested by all earlier rounds.
    pub samples_round_start: u64,
}

impl SegmentClock {
    pub fn start_new_round(&mut self) {
        self.samples_round_start += self.samples_processed;
        self.samples_processed = 0;
        self.frame_offset = 0;
    }

    /// Session time in seconds of a decoder frame of the current segment.
    pub fn seconds(&self, local_frame: usize, sample_rate: f32, frame_duration: f64) -> f64 {
        self.samples_round_start as f64 / f64::from(sample_rate)
            + (self.frame_offset + local_frame) as f64 * frame_duration
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn reset_policy() {
        use PipelineReset::{Hard, Soft};
        use RecognizerState::*;

        assert_eq!(plan_reset(false, Initialized, 0, 20_000), Hard);
        assert_eq!(plan_reset(true, Finalized, 10, 20_000), Hard);
        assert_eq!(plan_reset(true, Endpoint, 20_001, 20_000), Hard);
        assert_eq!(plan_reset(true, Endpoint, 20_000, 20_000), Soft);
        assert_eq!(plan_reset(true, Initialized, 0, 20_000), Soft);
    }

    #[test]
    fn new_round_keeps_time_continuous() {
        let mut clock = SegmentClock {
            frame_offset: 100,
            samples_processed: 48_000,
            samples_round_start: 0,
        };
        // 100 decoder frames of 30 ms = 3 s = 48 000 samples at 16 kHz
        let before = clock.seconds(0, 16_000.0, 0.03);
        clock.start_new_round();
        let after = clock.seconds(0, 16_000.0, 0.03);
        assert_relative_eq!(before, 3.0, epsilon = 1e-9);
        assert_relative_eq!(after, 3.0, epsilon = 1e-9);
        assert_eq!(clock.frame_offset, 0);
        assert_eq!(clock.samples_processed, 0);
    }
}
