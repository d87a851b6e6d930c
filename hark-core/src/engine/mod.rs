//! `Recognizer`: one streaming recognition session.
//!
//! ## Lifecycle
//!
//! ```text
//! Recognizer::new()                       state = Initialized
//!     └─► ingest()                        state = Running
//!         ├─► partial_result()            (read-only)
//!         ├─► result()                    state = Endpoint   ─┐
//!         └─► final_result()              state = Finalized  ─┤
//!                                                             │
//!     ingest() in a quiescent state ◄── cleanup (soft/hard) ◄─┘
//! ```
//!
//! Every segment ends in the finalization path: lattice from the decoder,
//! optional second-pass rescoring, one-best text, then word timings and
//! confidences. Text and metadata fail independently; only engine resource
//! failures surface as errors.
//!
//! ## Threading
//!
//! A session is `Send` but single-writer: drive it from one thread at a time.
//! The model and speaker model are shared read-only through `Arc`.

pub mod lifecycle;

use std::borrow::Cow;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

use crate::audio::AudioData;
use crate::error::{HarkError, Result};
use crate::grammar::compile_word_loop;
use crate::inference::{Decoder, FeatureExtractor, FeaturePipeline};
use crate::lattice::CompactLattice;
use crate::model::{DecodingGraph, Model};
use crate::rescoring::{rescore, MinimumBayesRisk};
use crate::result::{Metadata, Output, PartialResult, RecognitionResult, WordResult};
use crate::silence::SilenceWeighting;
use crate::speaker::{extract_embedding, SpeakerEmbedding, SpeakerModel};
use crate::symbols::is_filler;

use lifecycle::{plan_reset, PipelineReset, SegmentClock};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RecognizerState {
    /// Created, no audio yet.
    Initialized,
    /// Audio accepted, decoding live.
    Running,
    /// A mid-stream result was taken; the next audio starts a new segment.
    Endpoint,
    /// End of stream; the next audio starts a new round.
    Finalized,
}

/// Running mean of lexical word confidences.
#[derive(Debug, Clone, Copy, Default)]
struct ConfidenceMean {
    sum: f64,
    count: usize,
}

impl ConfidenceMean {
    fn add(&mut self, conf: f32) {
        self.sum += f64::from(conf);
        self.count += 1;
    }

    fn mean(&self) -> Option<f32> {
        (self.count > 0).then(|| (self.sum / self.count as f64) as f32)
    }
}

pub struct Recognizer {
    model: Arc<Model>,
    speaker: Option<Arc<SpeakerModel>>,
    graph: DecodingGraph,
    sample_rate: f32,
    online: bool,
    state: RecognizerState,
    clock: SegmentClock,
    features: Box<dyn FeaturePipeline>,
    /// `None` after a failed rebuild; the next ingestion retries.
    decoder: Option<Box<dyn Decoder>>,
    silence: SilenceWeighting,
    speaker_features: Option<Box<dyn FeatureExtractor>>,
    last_result: RecognitionResult,
    metadata: Option<Metadata>,
    endpoints: Vec<usize>,
    confidence: ConfidenceMean,
}

impl Recognizer {
    /// # Errors
    /// Engine failures creating the feature pipeline or decoder.
    pub fn new(model: Arc<Model>, sample_rate: f32, online: bool) -> Result<Self> {
        let graph = model.graph().clone();
        Self::build(model, None, graph, sample_rate, online)
    }

    pub fn with_speaker(
        model: Arc<Model>,
        speaker: Arc<SpeakerModel>,
        sample_rate: f32,
        online: bool,
    ) -> Result<Self> {
        let graph = model.graph().clone();
        Self::build(model, Some(speaker), graph, sample_rate, online)
    }

    /// Session restricted to the words of `grammar` (whitespace separated).
    ///
    /// # Errors
    /// `MissingDecodingGraph` if the model has no HCL graph to compose the
    /// grammar with.
    pub fn with_grammar(model: Arc<Model>, sample_rate: f32, grammar: &str, online: bool) -> Result<Self> {
        let word_loop = compile_word_loop(grammar, model.words());
        let graph = model.graph().with_grammar(word_loop)?;
        Self::build(model, None, graph, sample_rate, online)
    }

    fn build(
        model: Arc<Model>,
        speaker: Option<Arc<SpeakerModel>>,
        graph: DecodingGraph,
        sample_rate: f32,
        online: bool,
    ) -> Result<Self> {
        if !(sample_rate > 0.0) {
            return Err(HarkError::Config(format!("invalid sample rate {sample_rate}")));
        }
        let config = model.config();
        let features = model.engine().new_feature_pipeline(online)?;
        let decoder = model.engine().new_decoder(&graph)?;
        let silence = SilenceWeighting::new(&config.silence_weighting, config.frame_subsampling_factor);
        let speaker_features = speaker.as_ref().map(|s| s.new_extractor()).transpose()?;

        debug!(sample_rate, online, graph = graph.kind(), "recognizer created");
        Ok(Self {
            model,
            speaker,
            graph,
            sample_rate,
            online,
            state: RecognizerState::Initialized,
            clock: SegmentClock::default(),
            features,
            decoder: Some(decoder),
            silence,
            speaker_features,
            last_result: RecognitionResult::default(),
            metadata: None,
            endpoints: Vec::new(),
            confidence: ConfidenceMean::default(),
        })
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn state(&self) -> RecognizerState {
        self.state
    }

    pub fn sample_frequency(&self) -> f32 {
        self.sample_rate
    }

    /// Feature frame counts at which endpoints were detected.
    pub fn endpoints(&self) -> &[usize] {
        &self.endpoints
    }

    pub fn model(&self) -> &Arc<Model> {
        &self.model
    }

    // -----------------------------------------------------------------------
    // Ingestion
    // -----------------------------------------------------------------------

    /// Feed a chunk of audio. Returns `true` when the decoder detects an
    /// endpoint after this chunk.
    ///
    /// # Errors
    /// Only when a pipeline rebuild is needed and the engine fails.
    pub fn ingest(&mut self, audio: AudioData<'_>) -> Result<bool> {
        let waveform = audio.to_waveform();
        if waveform.is_empty() {
            return Ok(false);
        }

        if !matches!(self.state, RecognizerState::Running | RecognizerState::Initialized)
            || self.decoder.is_none()
        {
            self.cleanup()?;
        }
        self.state = RecognizerState::Running;

        self.features.accept_waveform(self.sample_rate, &waveform);
        self.clock.samples_processed += waveform.len() as u64;
        if self.online {
            self.update_silence_weights();
            if let Some(decoder) = self.decoder.as_mut() {
                decoder.advance_decoding(self.features.as_mut());
            }
        }
        if let Some(extractor) = self.speaker_features.as_mut() {
            extractor.accept_waveform(self.sample_rate, &waveform);
        }

        let endpoint = self
            .decoder
            .as_ref()
            .is_some_and(|d| d.endpoint_detected(&self.model.config().endpoint));
        if endpoint {
            let frames = self.features.num_frames_ready();
            debug!(frames, "endpoint detected");
            self.endpoints.push(frames);
        }
        Ok(endpoint)
    }

    pub fn accept_waveform_bytes(&mut self, data: &[u8]) -> Result<bool> {
        self.ingest(AudioData::PcmBytes(data))
    }

    pub fn accept_waveform_i16(&mut self, data: &[i16]) -> Result<bool> {
        self.ingest(AudioData::Pcm16(data))
    }

    pub fn accept_waveform_f32(&mut self, data: &[f32]) -> Result<bool> {
        self.ingest(AudioData::Float(data))
    }

    /// Decode a complete utterance in one call.
    pub fn transcribe(&mut self, audio: AudioData<'_>) -> Result<RecognitionResult> {
        self.ingest(audio)?;
        Ok(self.final_result())
    }

    fn update_silence_weights(&mut self) {
        if !self.silence.active()
            || self.features.num_frames_ready() == 0
            || !self.features.has_adaptation()
        {
            return;
        }
        let Some(decoder) = self.decoder.as_deref() else {
            return;
        };
        self.silence.compute_current_traceback(decoder, false);
        let deltas = self
            .silence
            .delta_weights(self.features.num_frames_ready(), self.clock.frame_offset);
        if !deltas.is_empty() {
            self.features.update_frame_weights(&deltas);
        }
    }

    fn cleanup(&mut self) -> Result<()> {
        let config = self.model.config();
        self.silence = SilenceWeighting::new(&config.silence_weighting, config.frame_subsampling_factor);
        if let Some(decoder) = self.decoder.as_ref() {
            self.clock.frame_offset += decoder.num_frames_decoded();
        }
        if let Some(speaker) = self.speaker.as_ref() {
            self.speaker_features = Some(speaker.new_extractor()?);
        }

        match plan_reset(
            self.decoder.is_some(),
            self.state,
            self.clock.frame_offset,
            config.max_frame_offset,
        ) {
            PipelineReset::Hard => {
                debug!(
                    frame_offset = self.clock.frame_offset,
                    samples = self.clock.samples_processed,
                    "rebuilding feature pipeline"
                );
                self.clock.start_new_round();
                self.decoder = None;
                let engine = self.model.engine();
                self.features = engine.new_feature_pipeline(self.online)?;
                self.decoder = Some(engine.new_decoder(&self.graph)?);
            }
            PipelineReset::Soft => {
                debug!(frame_offset = self.clock.frame_offset, "continuing on the same pipeline");
                if let Some(decoder) = self.decoder.as_mut() {
                    decoder.init_decoding(self.clock.frame_offset);
                }
            }
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Results
    // -----------------------------------------------------------------------

    /// Current best hypothesis. Never changes the session.
    pub fn partial_result(&self) -> PartialResult {
        if self.state != RecognizerState::Running {
            return PartialResult::default();
        }
        let Some(decoder) = self.decoder.as_deref() else {
            return PartialResult::default();
        };
        if decoder.num_frames_decoded() == 0 {
            return PartialResult::default();
        }
        match decoder.best_path(false) {
            Ok(path) => PartialResult {
                partial: self.model.words().join(&path.words),
            },
            Err(e) => {
                warn!(error = %e, "partial result unavailable");
                PartialResult::default()
            }
        }
    }

    /// Finish the current segment and return its text. The session keeps
    /// its feature pipeline for the next segment.
    pub fn result(&mut self) -> RecognitionResult {
        if self.state != RecognizerState::Running {
            return RecognitionResult::default();
        }
        if let Some(decoder) = self.decoder.as_mut() {
            decoder.advance_decoding(self.features.as_mut());
            decoder.finalize_decoding();
        }
        self.state = RecognizerState::Endpoint;
        self.finalize_and_rescore()
    }

    /// Flush all buffered audio and return the final text.
    pub fn final_result(&mut self) -> RecognitionResult {
        if self.state != RecognizerState::Running {
            return RecognitionResult::default();
        }
        self.features.input_finished();
        self.update_silence_weights();
        if let Some(decoder) = self.decoder.as_mut() {
            decoder.advance_decoding(self.features.as_mut());
            decoder.finalize_decoding();
        }
        self.state = RecognizerState::Finalized;
        self.finalize_and_rescore()
    }

    /// Accumulated metadata, or the last text result when there is none.
    pub fn metadata(&self) -> Output {
        match &self.metadata {
            Some(meta) => Output::Metadata(meta.clone()),
            None => Output::Text(self.last_result.clone()),
        }
    }

    /// Copy every ready raw feature frame and the endpoint list into the
    /// metadata.
    pub fn dump_features(&mut self) {
        let meta = self.metadata.get_or_insert_with(Metadata::default);
        let raw_dim = self.features.raw_dim();
        for i in 0..self.features.num_frames_ready() {
            let mut frame = self.features.frame(i);
            frame.truncate(raw_dim);
            meta.features.push(frame);
        }
        meta.segments = self.endpoints.clone();
    }

    /// Speaker embedding for the current segment. `Ok(None)` without a
    /// speaker model or with too little speech.
    ///
    /// # Errors
    /// Embedding network failures.
    pub fn speaker_embedding(&mut self) -> Result<Option<SpeakerEmbedding>> {
        let (Some(speaker), Some(extractor)) = (self.speaker.as_ref(), self.speaker_features.as_deref())
        else {
            return Ok(None);
        };
        let Some(decoder) = self.decoder.as_deref() else {
            return Ok(None);
        };
        let config = self.model.config();

        let nonsilence = if self.silence.active() {
            self.silence.compute_current_traceback(decoder, true);
            self.silence.nonsilence_frames()
        } else {
            (0..decoder.num_frames_decoded()).collect()
        };
        extract_embedding(
            extractor,
            speaker.network(),
            &nonsilence,
            config.frame_subsampling_factor,
            config.min_speaker_frames,
            &config.speaker_cmn,
        )
    }

    pub fn speaker_vector(&mut self) -> Result<Option<Vec<f32>>> {
        Ok(self.speaker_embedding()?.map(|e| e.vector))
    }

    fn store(&mut self, result: RecognitionResult) -> RecognitionResult {
        self.last_result = result.clone();
        result
    }

    fn finalize_and_rescore(&mut self) -> RecognitionResult {
        let Some(decoder) = self.decoder.as_deref() else {
            return self.store(RecognitionResult::default());
        };
        if decoder.num_frames_decoded() == 0 {
            return self.store(RecognitionResult::default());
        }

        let clat = match decoder.lattice(true) {
            Ok(clat) => clat,
            Err(e) => {
                warn!(error = %e, "lattice extraction failed");
                return self.store(RecognitionResult::default());
            }
        };
        let clat = match rescore(clat, self.model.rescoring_lm()) {
            Ok(clat) => clat,
            Err(e) => {
                warn!(error = %e, "lattice rescoring failed");
                return self.store(RecognitionResult::default());
            }
        };
        if clat.num_states() == 0 {
            warn!("empty lattice");
            return self.store(RecognitionResult::default());
        }

        let text = match clat.shortest_path() {
            Ok(Some(path)) => self.model.words().join(&path.words),
            Ok(None) => String::new(),
            Err(e) => {
                warn!(error = %e, "no best path");
                return self.store(RecognitionResult::default());
            }
        };

        match self.word_results(&clat) {
            Ok((words, lexical)) => {
                for conf in lexical {
                    self.confidence.add(conf);
                }
                let meta = self.metadata.get_or_insert_with(Metadata::default);
                meta.append(&text, words);
                meta.confidence = self.confidence.mean();
            }
            Err(e) => {
                warn!(error = %e, "word timings unavailable");
                self.metadata = None;
            }
        }

        if self.speaker.is_some() {
            match self.speaker_embedding() {
                Ok(Some(embedding)) => {
                    if let Some(meta) = self.metadata.as_mut() {
                        meta.spk_frames = Some(embedding.frames);
                        meta.spk = Some(embedding.vector);
                    }
                }
                Ok(None) => debug!("not enough speech for a speaker embedding"),
                Err(e) => warn!(error = %e, "speaker embedding failed"),
            }
        }

        self.store(RecognitionResult::new(text))
    }

    /// Timed words for the current segment plus the confidences that count
    /// towards the running mean.
    fn word_results(&self, clat: &CompactLattice) -> Result<(Vec<WordResult>, Vec<f32>)> {
        let config = self.model.config();
        let lattice = match self.model.word_aligner() {
            Some(aligner) => Cow::Owned(aligner.word_align(clat)?),
            None => Cow::Borrowed(clat),
        };
        let mbr = MinimumBayesRisk::new(&lattice, config.mbr_max_states)?;

        let frame_duration = config.frame_duration();
        let mut words = Vec::with_capacity(mbr.one_best().len());
        let mut lexical = Vec::new();
        for ((&id, &(start, end)), &conf) in mbr
            .one_best()
            .iter()
            .zip(mbr.one_best_times())
            .zip(mbr.one_best_confidences())
        {
            let word = self
                .model
                .words()
                .word(id)
                .ok_or_else(|| HarkError::MissingResource(format!("word id {id} not in symbol table")))?;
            let conf = if is_filler(word) {
                1.0
            } else {
                lexical.push(conf);
                conf
            };
            words.push(WordResult {
                word: word.to_string(),
                start: self.clock.seconds(start, self.sample_rate, frame_duration),
                end: self.clock.seconds(end, self.sample_rate, frame_duration),
                conf,
            });
        }
        Ok((words, lexical))
    }
}

impl std::fmt::Debug for Recognizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Recognizer")
            .field("state", &self.state)
            .field("sample_rate", &self.sample_rate)
            .field("online", &self.online)
            .field("clock", &self.clock)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fst::{FstArc, VectorFst};
    use crate::inference::stub::{StubConfig, StubEngine};
    use crate::model::ModelBuilder;
    use crate::symbols::SymbolTable;

    fn model() -> (Arc<Model>, StubEngine) {
        let words = SymbolTable::from_words(["one", "two", "three"]).expect("words");
        let mut hclg = VectorFst::new();
        let s = hclg.add_state();
        hclg.set_start(s);
        hclg.set_final(s, 0.0);
        for w in 1..=3 {
            hclg.add_arc(s, FstArc::new(w, w, 0.0, s));
        }
        let engine = StubEngine::new(StubConfig::default());
        let model = ModelBuilder::new(engine.clone(), words)
            .hclg(hclg)
            .build()
            .expect("model");
        (model, engine)
    }

    #[test]
    fn empty_chunk_is_a_no_op() {
        let (model, _) = model();
        let mut rec = Recognizer::new(model, 16_000.0, true).expect("recognizer");
        assert!(!rec.accept_waveform_f32(&[]).expect("ingest"));
        assert_eq!(rec.state(), RecognizerState::Initialized);
    }

    #[test]
    fn result_moves_to_endpoint_and_next_chunk_continues_softly() {
        let (model, engine) = model();
        let mut rec = Recognizer::new(model, 16_000.0, true).expect("recognizer");
        rec.accept_waveform_f32(&vec![2_000.0; 4_800]).expect("ingest");
        assert_eq!(rec.result().text, "two");
        assert_eq!(rec.state(), RecognizerState::Endpoint);

        rec.accept_waveform_f32(&vec![1_000.0; 4_800]).expect("ingest");
        assert_eq!(rec.state(), RecognizerState::Running);
        // 0.3 s = 10 decoder frames carried into the offset
        assert_eq!(engine.probe().lock().init_offsets, vec![10]);
        assert_eq!(rec.final_result().text, "one");
    }

    #[test]
    fn invalid_sample_rate_is_rejected() {
        let (model, _) = model();
        assert!(Recognizer::new(model, 0.0, true).is_err());
    }

    #[test]
    fn offline_session_decodes_at_the_end() {
        let (model, _) = model();
        let mut rec = Recognizer::new(model, 16_000.0, false).expect("recognizer");
        rec.accept_waveform_f32(&vec![3_000.0; 4_800]).expect("ingest");
        assert!(rec.partial_result().is_empty());
        assert_eq!(rec.final_result().text, "three");
    }

    #[test]
    fn dump_features_excludes_the_adaptation_vector() {
        let (model, _) = model();
        let mut rec = Recognizer::new(model, 16_000.0, true).expect("recognizer");
        rec.accept_waveform_f32(&vec![1_000.0; 1_600]).expect("ingest");
        rec.dump_features();
        let Output::Metadata(meta) = rec.metadata() else {
            panic!("metadata expected after a dump");
        };
        assert_eq!(meta.features.len(), 10);
        assert!(meta.features.iter().all(|f| f.len() == 2));
    }
}
