//! `StubEngine`: deterministic amplitude-coded engine.
//!
//! Stands in for a real acoustic model in tests and the CLI so complete
//! sessions can run without model files. Audio is cut into 10 ms feature
//! frames (`[mean |x|, ln(1 + energy)]`); every `subsampling` feature frames
//! form one decoder frame whose level is `round(mean |x| / level_step)`.
//!
//! ```text
//!   level 0        → silence phone, no word
//!   level k > 0    → speech phone, word id k (if the graph can emit it)
//!   equal levels   → one word spanning the whole run
//! ```
//!
//! So a 2 000-amplitude tone with the default step decodes as word 2. A
//! [`StubProbe`] shared with every pipeline and decoder records what the
//! session asked of the engine.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use ndarray::{Array1, ArrayView2};
use parking_lot::Mutex;
use tracing::debug;

use crate::config::EndpointConfig;
use crate::error::Result;
use crate::inference::{
    AcousticEngine, Decoder, EmbeddingNetwork, FeatureExtractor, FeaturePipeline, SpeakerFrontend,
};
use crate::lattice::{BestPath, CompactArc, CompactLattice, CompactWeight, Label, LatticeWeight};
use crate::model::DecodingGraph;
use crate::speaker::mean_pool;

pub const SILENCE_PHONE: Label = 1;
pub const SPEECH_PHONE: Label = 2;

const FRAME_SECS: f32 = 0.01;

#[derive(Debug, Clone)]
pub struct StubConfig {
    /// Amplitude per level.
    pub level_step: f32,
    /// Feature frames per decoder frame.
    pub subsampling: usize,
    /// Graph cost of every word arc.
    pub word_cost: f32,
    /// Acoustic cost of every decoder frame.
    pub frame_cost: f32,
    /// `word → (confusable word, extra acoustic cost)`.
    pub alternates: HashMap<Label, (Label, f32)>,
    /// Replacement for words the graph cannot emit. Without it they are dropped.
    pub unk: Option<Label>,
    /// Whether pipelines carry an adaptation stream.
    pub adaptation: bool,
}

impl Default for StubConfig {
    fn default() -> Self {
        Self {
            level_step: 1000.0,
            subsampling: 3,
            word_cost: 1.0,
            frame_cost: 0.1,
            alternates: HashMap::new(),
            unk: None,
            adaptation: true,
        }
    }
}

/// What the engine was asked to do, across all its pipelines and decoders.
#[derive(Debug, Clone, Default)]
pub struct StubProbe {
    pub pipelines_created: usize,
    pub decoders_created: usize,
    /// Offsets passed to `init_decoding`.
    pub init_offsets: Vec<usize>,
    pub weight_updates: Vec<(usize, f32)>,
    pub finalize_calls: usize,
    pub lattice_calls: usize,
}

pub type SharedProbe = Arc<Mutex<StubProbe>>;

#[derive(Debug, Clone, Default)]
pub struct StubEngine {
    config: Arc<StubConfig>,
    probe: SharedProbe,
}

impl StubEngine {
    pub fn new(config: StubConfig) -> Self {
        Self {
            config: Arc::new(config),
            probe: SharedProbe::default(),
        }
    }

    pub fn probe(&self) -> SharedProbe {
        Arc::clone(&self.probe)
    }
}

impl AcousticEngine for StubEngine {
    fn new_feature_pipeline(&self, online: bool) -> Result<Box<dyn FeaturePipeline>> {
        self.probe.lock().pipelines_created += 1;
        debug!(online, "stub feature pipeline created");
        Ok(Box::new(StubPipeline {
            framer: Framer::default(),
            finished: false,
            adaptation: self.config.adaptation,
            weights: Vec::new(),
            probe: Arc::clone(&self.probe),
        }))
    }

    fn new_decoder(&self, graph: &DecodingGraph) -> Result<Box<dyn Decoder>> {
        self.probe.lock().decoders_created += 1;
        Ok(Box::new(StubDecoder {
            config: Arc::clone(&self.config),
            vocabulary: graph.output_labels(),
            probe: Arc::clone(&self.probe),
            frame_offset: 0,
            levels: Vec::new(),
        }))
    }
}

// ---------------------------------------------------------------------------
// Features
// ---------------------------------------------------------------------------

fn frame_features(samples: &[f32]) -> [f32; 2] {
    let n = samples.len().max(1) as f32;
    let mean_abs = samples.iter().map(|x| x.abs()).sum::<f32>() / n;
    let energy = samples.iter().map(|x| x * x).sum::<f32>() / n;
    [mean_abs, energy.ln_1p()]
}

/// Cuts a sample stream into fixed 10 ms frames independent of chunking.
#[derive(Debug, Clone, Default)]
struct Framer {
    frame_len: usize,
    pending: Vec<f32>,
    frames: Vec<[f32; 2]>,
}

impl Framer {
    fn push(&mut self, sample_rate: f32, samples: &[f32]) {
        if self.frame_len == 0 {
            self.frame_len = ((sample_rate * FRAME_SECS).round() as usize).max(1);
        }
        self.pending.extend_from_slice(samples);
        let complete = self.pending.len() / self.frame_len * self.frame_len;
        for chunk in self.pending[..complete].chunks(self.frame_len) {
            self.frames.push(frame_features(chunk));
        }
        self.pending.drain(..complete);
    }

    /// Zero-pad and emit the trailing partial frame.
    fn flush(&mut self) {
        if self.pending.is_empty() || self.frame_len == 0 {
            return;
        }
        self.pending.resize(self.frame_len, 0.0);
        self.frames.push(frame_features(&self.pending));
        self.pending.clear();
    }
}

struct StubPipeline {
    framer: Framer,
    finished: bool,
    adaptation: bool,
    weights: Vec<f32>,
    probe: SharedProbe,
}

impl FeaturePipeline for StubPipeline {
    fn accept_waveform(&mut self, sample_rate: f32, samples: &[f32]) {
        if self.finished {
            debug!(samples = samples.len(), "stub pipeline input already finished, dropping audio");
            return;
        }
        self.framer.push(sample_rate, samples);
    }

    fn input_finished(&mut self) {
        self.framer.flush();
        self.finished = true;
    }

    fn num_frames_ready(&self) -> usize {
        self.framer.frames.len()
    }

    fn is_last_frame(&self, index: usize) -> bool {
        self.finished && index + 1 == self.framer.frames.len()
    }

    fn dim(&self) -> usize {
        self.raw_dim() + usize::from(self.adaptation)
    }

    fn raw_dim(&self) -> usize {
        2
    }

    fn frame(&self, index: usize) -> Vec<f32> {
        let mut out = self.framer.frames.get(index).copied().unwrap_or_default().to_vec();
        if self.adaptation {
            // total adaptation weight stands in for an i-vector
            out.push(self.weights.iter().sum());
        }
        out
    }

    fn has_adaptation(&self) -> bool {
        self.adaptation
    }

    fn update_frame_weights(&mut self, deltas: &[(usize, f32)]) {
        for &(frame, delta) in deltas {
            if frame >= self.weights.len() {
                self.weights.resize(frame + 1, 0.0);
            }
            self.weights[frame] += delta;
        }
        self.probe.lock().weight_updates.extend_from_slice(deltas);
    }
}

// ---------------------------------------------------------------------------
// Decoder
// ---------------------------------------------------------------------------

struct StubDecoder {
    config: Arc<StubConfig>,
    vocabulary: BTreeSet<Label>,
    probe: SharedProbe,
    frame_offset: usize,
    /// Level of every decoded frame in the current segment.
    levels: Vec<u32>,
}

impl StubDecoder {
    fn level(&self, mean_abs: f32) -> u32 {
        (mean_abs / self.config.level_step.max(f32::EPSILON)).round() as u32
    }

    fn word_for(&self, level: u32) -> Option<Label> {
        if level == 0 {
            return None;
        }
        if self.vocabulary.contains(&level) {
            return Some(level);
        }
        self.config.unk.filter(|unk| self.vocabulary.contains(unk))
    }

    fn phone_for(level: u32) -> Label {
        if level == 0 {
            SILENCE_PHONE
        } else {
            SPEECH_PHONE
        }
    }

    fn build_lattice(&self) -> CompactLattice {
        let mut lat = CompactLattice::new();
        let mut state = lat.add_state();
        lat.set_start(state);

        let mut i = 0;
        while i < self.levels.len() {
            let level = self.levels[i];
            let run = self.levels[i..].iter().take_while(|&&l| l == level).count();
            i += run;

            let alignment = vec![Self::phone_for(level); run];
            let acoustic = self.config.frame_cost * run as f32;
            let next = lat.add_state();
            match self.word_for(level) {
                Some(word) => {
                    let weight = LatticeWeight::new(self.config.word_cost, acoustic);
                    lat.add_arc(
                        state,
                        CompactArc::new(word, CompactWeight::new(weight, alignment.clone()), next),
                    );
                    if let Some(&(alt, extra)) = self.config.alternates.get(&word) {
                        if self.vocabulary.contains(&alt) {
                            let weight = LatticeWeight::new(self.config.word_cost, acoustic + extra);
                            lat.add_arc(
                                state,
                                CompactArc::new(alt, CompactWeight::new(weight, alignment), next),
                            );
                        }
                    }
                }
                None => {
                    let weight = LatticeWeight::new(0.0, acoustic);
                    lat.add_arc(state, CompactArc::new(0, CompactWeight::new(weight, alignment), next));
                }
            }
            state = next;
        }
        lat.set_final(state, CompactWeight::one());
        lat
    }
}

impl Decoder for StubDecoder {
    fn init_decoding(&mut self, frame_offset: usize) {
        self.frame_offset = frame_offset;
        self.levels.clear();
        self.probe.lock().init_offsets.push(frame_offset);
    }

    fn advance_decoding(&mut self, features: &mut dyn FeaturePipeline) {
        let factor = self.config.subsampling.max(1);
        let ready = features.num_frames_ready();
        loop {
            let first = (self.frame_offset + self.levels.len()) * factor;
            if first >= ready {
                break;
            }
            let mut last = first + factor;
            if last > ready {
                // a short trailing group is only decoded once input is finished
                if !features.is_last_frame(ready - 1) {
                    break;
                }
                last = ready;
            }
            let sum: f32 = (first..last)
                .map(|i| features.frame(i).first().copied().unwrap_or(0.0))
                .sum();
            let level = self.level(sum / (last - first) as f32);
            self.levels.push(level);
        }
    }

    fn finalize_decoding(&mut self) {
        self.probe.lock().finalize_calls += 1;
    }

    fn num_frames_decoded(&self) -> usize {
        self.levels.len()
    }

    fn endpoint_detected(&self, config: &EndpointConfig) -> bool {
        if self.levels.is_empty() {
            return false;
        }
        let silence: HashSet<Label> = config.silence_phones.iter().copied().collect();
        let phones = self.traceback(false);
        let frame_secs = FRAME_SECS * self.config.subsampling.max(1) as f32;

        let trailing = phones.iter().rev().take_while(|p| silence.contains(p)).count();
        let contains_nonsilence = phones.iter().any(|p| !silence.contains(p));
        let trailing_secs = trailing as f32 * frame_secs;
        let utterance_secs = phones.len() as f32 * frame_secs;

        config
            .rules
            .iter()
            .any(|rule| rule.fires(contains_nonsilence, trailing_secs, 0.0, utterance_secs))
    }

    fn traceback(&self, _use_final_probs: bool) -> Vec<Label> {
        self.levels.iter().map(|&l| Self::phone_for(l)).collect()
    }

    fn lattice(&self, _end_of_utterance: bool) -> Result<CompactLattice> {
        self.probe.lock().lattice_calls += 1;
        Ok(self.build_lattice())
    }

    fn best_path(&self, _end_of_utterance: bool) -> Result<BestPath> {
        Ok(self.build_lattice().shortest_path()?.unwrap_or_default())
    }
}

// ---------------------------------------------------------------------------
// Speaker
// ---------------------------------------------------------------------------

/// Speaker front-end producing the same 10 ms frames as the stub pipeline.
#[derive(Debug, Clone, Copy, Default)]
pub struct StubSpeakerFrontend;

impl SpeakerFrontend for StubSpeakerFrontend {
    fn new_extractor(&self) -> Result<Box<dyn FeatureExtractor>> {
        Ok(Box::new(StubExtractor::default()))
    }
}

#[derive(Default)]
struct StubExtractor {
    framer: Framer,
}

impl FeatureExtractor for StubExtractor {
    fn accept_waveform(&mut self, sample_rate: f32, samples: &[f32]) {
        self.framer.push(sample_rate, samples);
    }

    fn num_frames_ready(&self) -> usize {
        self.framer.frames.len()
    }

    fn dim(&self) -> usize {
        2
    }

    fn frame(&self, index: usize) -> Vec<f32> {
        self.framer.frames.get(index).copied().unwrap_or_default().to_vec()
    }
}

/// Embedding = mean of the normalised feature rows.
#[derive(Debug, Clone, Copy, Default)]
pub struct MeanPoolNetwork;

impl EmbeddingNetwork for MeanPoolNetwork {
    fn embed(&self, features: ArrayView2<'_, f32>) -> Result<Array1<f32>> {
        Ok(mean_pool(features))
    }
}
