//! Recognizer configuration (JSON file alongside the model).
//!
//! Every field has a default, so a partial file (or none at all) is valid.
//! Values are sanitised by [`RecognizerConfig::normalize`] after loading.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{HarkError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct RecognizerConfig {
    /// Default sample rate of the model's training data (Hz).
    pub sample_frequency: f32,
    /// Feature frame shift in seconds.
    pub frame_shift_secs: f32,
    /// Feature frames per decoder frame.
    pub frame_subsampling_factor: usize,
    /// Decoded frames after which a quiescent session rebuilds its pipeline.
    pub max_frame_offset: usize,
    /// Minimum non-silence speaker frames for an embedding.
    pub min_speaker_frames: usize,
    /// Lattices larger than this are refused by the confidence computation.
    pub mbr_max_states: usize,
    pub endpoint: EndpointConfig,
    pub silence_weighting: SilenceWeightingConfig,
    pub speaker_cmn: CmnConfig,
}

impl Default for RecognizerConfig {
    fn default() -> Self {
        Self {
            sample_frequency: 16_000.0,
            frame_shift_secs: 0.01,
            frame_subsampling_factor: 3,
            max_frame_offset: 20_000,
            min_speaker_frames: 30,
            mbr_max_states: 100_000,
            endpoint: EndpointConfig::default(),
            silence_weighting: SilenceWeightingConfig::default(),
            speaker_cmn: CmnConfig::default(),
        }
    }
}

impl RecognizerConfig {
    /// Read and normalise a config file.
    ///
    /// # Errors
    /// Unlike application settings, a model config that cannot be read or
    /// parsed is fatal: the recognizer would otherwise run with thresholds the
    /// model was not tuned for.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        let mut config: Self = serde_json::from_str(&raw)?;
        config.normalize();
        config.validate()?;
        Ok(config)
    }

    pub fn normalize(&mut self) {
        self.frame_subsampling_factor = self.frame_subsampling_factor.max(1);
        self.max_frame_offset = self.max_frame_offset.max(1);
        self.min_speaker_frames = self.min_speaker_frames.max(1);
        self.mbr_max_states = self.mbr_max_states.max(1);
        self.silence_weighting.silence_weight = self.silence_weighting.silence_weight.clamp(0.0, 1.0);
        self.speaker_cmn.window = self.speaker_cmn.window.max(1);
        self.speaker_cmn.min_window = self.speaker_cmn.min_window.clamp(1, self.speaker_cmn.window);
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.sample_frequency > 0.0) {
            return Err(HarkError::Config(format!(
                "sampleFrequency must be positive, got {}",
                self.sample_frequency
            )));
        }
        if !(self.frame_shift_secs > 0.0) {
            return Err(HarkError::Config(format!(
                "frameShiftSecs must be positive, got {}",
                self.frame_shift_secs
            )));
        }
        Ok(())
    }

    /// Duration of one decoder frame in seconds (0.03 s for the defaults).
    pub fn frame_duration(&self) -> f64 {
        self.frame_shift_secs as f64 * self.frame_subsampling_factor as f64
    }
}

// ---------------------------------------------------------------------------
// Endpointing
// ---------------------------------------------------------------------------

/// Stand-in for "unbounded" that survives a JSON round trip.
pub const NO_LIMIT: f32 = 1.0e10;

/// Thresholds handed to the decoder engine's endpoint detector.
///
/// The engine owns the detection; these are the standard five rules, any of
/// which firing signals an utterance boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct EndpointConfig {
    pub silence_phones: Vec<u32>,
    pub rules: [EndpointRule; 5],
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            silence_phones: Vec::new(),
            rules: [
                // Long silence with no speech at all.
                EndpointRule::new(false, 5.0, NO_LIMIT, 0.0),
                // Trailing silence after a confident final state.
                EndpointRule::new(true, 0.5, 2.0, 0.0),
                EndpointRule::new(true, 1.0, 8.0, 0.0),
                EndpointRule::new(true, 2.0, NO_LIMIT, 0.0),
                // Utterance too long.
                EndpointRule::new(false, 0.0, NO_LIMIT, 20.0),
            ],
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointRule {
    pub must_contain_nonsilence: bool,
    pub min_trailing_silence: f32,
    pub max_relative_cost: f32,
    pub min_utterance_length: f32,
}

impl EndpointRule {
    pub const fn new(
        must_contain_nonsilence: bool,
        min_trailing_silence: f32,
        max_relative_cost: f32,
        min_utterance_length: f32,
    ) -> Self {
        Self {
            must_contain_nonsilence,
            min_trailing_silence,
            max_relative_cost,
            min_utterance_length,
        }
    }

    /// Whether this rule fires for the given decoder statistics (seconds).
    pub fn fires(
        &self,
        contains_nonsilence: bool,
        trailing_silence: f32,
        relative_cost: f32,
        utterance_length: f32,
    ) -> bool {
        (contains_nonsilence || !self.must_contain_nonsilence)
            && trailing_silence >= self.min_trailing_silence
            && relative_cost <= self.max_relative_cost
            && utterance_length >= self.min_utterance_length
    }
}

// ---------------------------------------------------------------------------
// Silence weighting / speaker CMN
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct SilenceWeightingConfig {
    pub silence_phones: Vec<u32>,
    /// Weight given to silence frames in adaptation statistics. 1.0 disables
    /// the weighting.
    pub silence_weight: f32,
}

impl Default for SilenceWeightingConfig {
    fn default() -> Self {
        Self {
            silence_phones: Vec::new(),
            silence_weight: 1.0,
        }
    }
}

impl SilenceWeightingConfig {
    pub fn is_active(&self) -> bool {
        !self.silence_phones.is_empty() && self.silence_weight != 1.0
    }
}

/// Sliding-window mean normalisation applied to speaker features.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct CmnConfig {
    pub window: usize,
    pub min_window: usize,
    pub center: bool,
}

impl Default for CmnConfig {
    fn default() -> Self {
        Self {
            window: 600,
            min_window: 100,
            center: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let config: RecognizerConfig =
            serde_json::from_str(r#"{"maxFrameOffset": 50, "silenceWeighting": {"silencePhones": [1], "silenceWeight": 0.001}}"#)
                .expect("parse partial config");
        assert_eq!(config.max_frame_offset, 50);
        assert_eq!(config.frame_subsampling_factor, 3);
        assert_eq!(config.min_speaker_frames, 30);
        assert!(config.silence_weighting.is_active());
    }

    #[test]
    fn frame_duration_is_shift_times_subsampling() {
        let config = RecognizerConfig::default();
        assert!((config.frame_duration() - 0.03).abs() < 1e-9);
    }

    #[test]
    fn normalize_clamps_out_of_range_values() {
        let mut config = RecognizerConfig::default();
        config.frame_subsampling_factor = 0;
        config.silence_weighting.silence_weight = 4.0;
        config.speaker_cmn.min_window = 10_000;
        config.normalize();
        assert_eq!(config.frame_subsampling_factor, 1);
        assert_eq!(config.silence_weighting.silence_weight, 1.0);
        assert_eq!(config.speaker_cmn.min_window, config.speaker_cmn.window);
    }

    #[test]
    fn neutral_weight_disables_silence_weighting() {
        let config = SilenceWeightingConfig {
            silence_phones: vec![1, 2],
            silence_weight: 1.0,
        };
        assert!(!config.is_active());
        assert!(!SilenceWeightingConfig::default().is_active());
    }

    #[test]
    fn endpoint_rule_requires_speech_when_configured() {
        let rule = EndpointRule::new(true, 0.5, NO_LIMIT, 0.0);
        assert!(!rule.fires(false, 3.0, 0.0, 3.0));
        assert!(rule.fires(true, 0.6, 0.0, 3.0));
        assert!(!rule.fires(true, 0.3, 0.0, 3.0));
    }

    #[test]
    fn invalid_sample_frequency_is_rejected() {
        let mut config = RecognizerConfig::default();
        config.sample_frequency = 0.0;
        assert!(matches!(config.validate(), Err(HarkError::Config(_))));
    }
}
