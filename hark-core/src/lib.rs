//! # hark-core
//!
//! Streaming speech-recognition sessions on top of a pluggable acoustic engine.
//!
//! ## Architecture
//!
//! ```text
//! audio chunks → Recognizer::ingest → FeaturePipeline → Decoder (online)
//!                      │                    ▲
//!                      │        silence weights (adaptation)
//!                      ▼
//!         result / final_result → lattice → rescoring (G₁⁻¹ ∘ G₂) → one-best text
//!                                                   │
//!                                         word align + MBR → timed words
//! ```
//!
//! A [`Model`] is built once and shared as `Arc<Model>`; every [`Recognizer`]
//! owns its feature pipeline and decoder. The engine itself (features,
//! acoustic scoring, search) sits behind the traits in [`inference`].

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod audio;
pub mod config;
pub mod engine;
pub mod error;
pub mod fst;
pub mod grammar;
pub mod inference;
pub mod lattice;
pub mod lm;
pub mod logging;
pub mod model;
pub mod rescoring;
pub mod result;
pub mod silence;
pub mod speaker;
pub mod symbols;

// Convenience re-exports for downstream crates
pub use audio::AudioData;
pub use config::RecognizerConfig;
pub use engine::{Recognizer, RecognizerState};
pub use error::{HarkError, Result};
pub use inference::{AcousticEngine, Decoder, FeaturePipeline, WordAligner};
pub use logging::{init_logging, set_log_level};
pub use model::{DecodingGraph, Model, ModelBuilder};
pub use rescoring::RescoringLm;
pub use result::{Metadata, Output, PartialResult, RecognitionResult, WordResult};
pub use speaker::SpeakerModel;
pub use symbols::SymbolTable;
