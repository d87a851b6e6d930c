//! Acoustic engine abstraction.
//!
//! The session layer never computes features or searches a graph itself. It
//! drives these traits, which an engine crate (or the [`stub`] engine used by
//! tests and the CLI) implements:
//!
//! ```text
//!   AcousticEngine ──new_feature_pipeline──► FeaturePipeline ─┐
//!        │                                                    │ frames
//!        └────────new_decoder(&DecodingGraph)──► Decoder ◄────┘
//!
//!   SpeakerFrontend ──new_extractor──► FeatureExtractor ──► EmbeddingNetwork
//! ```
//!
//! Engines are shared read-only (`Send + Sync`) through the model `Arc`;
//! pipelines, decoders and extractors are owned by one session (`Send`).

pub mod stub;

use ndarray::{Array1, ArrayView2};

use crate::config::EndpointConfig;
use crate::error::Result;
use crate::lattice::{BestPath, CompactLattice, Label};
use crate::model::DecodingGraph;

/// Factory for per-session engine resources.
pub trait AcousticEngine: Send + Sync {
    /// Create a feature pipeline seeded from the model's baseline adaptation
    /// state. `online` enables adaptation updates during decoding.
    ///
    /// # Errors
    /// Engine resource failures are fatal for the session.
    fn new_feature_pipeline(&self, online: bool) -> Result<Box<dyn FeaturePipeline>>;

    fn new_decoder(&self, graph: &DecodingGraph) -> Result<Box<dyn Decoder>>;
}

/// Streaming feature computation for the acoustic model.
pub trait FeaturePipeline: Send {
    /// Append samples in 16-bit amplitude range at `sample_rate`.
    fn accept_waveform(&mut self, sample_rate: f32, samples: &[f32]);

    /// Flush any partial trailing frame.
    fn input_finished(&mut self);

    /// Feature frames available so far.
    fn num_frames_ready(&self) -> usize;

    /// True once input is finished and `index` is the final frame.
    fn is_last_frame(&self, index: usize) -> bool;

    /// Full frame width, including the adaptation vector if any.
    fn dim(&self) -> usize;

    /// Width of the raw acoustic features alone.
    fn raw_dim(&self) -> usize;

    fn frame(&self, index: usize) -> Vec<f32>;

    /// Whether the pipeline carries an adaptation stream that silence
    /// weighting can influence.
    fn has_adaptation(&self) -> bool;

    /// Apply `(feature frame, weight delta)` updates to the adaptation statistics.
    fn update_frame_weights(&mut self, deltas: &[(usize, f32)]);
}

/// Incremental search over a decoding graph.
pub trait Decoder: Send {
    /// Start a new segment. `frame_offset` is the number of decoder frames
    /// already consumed from the same feature pipeline.
    fn init_decoding(&mut self, frame_offset: usize);

    fn advance_decoding(&mut self, features: &mut dyn FeaturePipeline);

    fn finalize_decoding(&mut self);

    /// Decoder frames consumed in the current segment.
    fn num_frames_decoded(&self) -> usize;

    fn endpoint_detected(&self, config: &EndpointConfig) -> bool;

    /// Phone per decoded frame along the current best path.
    fn traceback(&self, use_final_probs: bool) -> Vec<Label>;

    /// Word lattice of the current segment.
    fn lattice(&self, end_of_utterance: bool) -> Result<CompactLattice>;

    fn best_path(&self, end_of_utterance: bool) -> Result<BestPath>;
}

/// Raw feature computation for the speaker front-end.
pub trait FeatureExtractor: Send {
    fn accept_waveform(&mut self, sample_rate: f32, samples: &[f32]);
    fn num_frames_ready(&self) -> usize;
    fn dim(&self) -> usize;
    fn frame(&self, index: usize) -> Vec<f32>;
}

pub trait SpeakerFrontend: Send + Sync {
    fn new_extractor(&self) -> Result<Box<dyn FeatureExtractor>>;
}

/// Fixed-size embedding over a `frames × dim` feature matrix.
pub trait EmbeddingNetwork: Send + Sync {
    fn embed(&self, features: ArrayView2<'_, f32>) -> Result<Array1<f32>>;
}

/// Re-segments a lattice so every arc spans exactly one word.
pub trait WordAligner: Send + Sync {
    fn word_align(&self, clat: &CompactLattice) -> Result<CompactLattice>;
}
