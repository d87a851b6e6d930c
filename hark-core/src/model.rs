//! Shared, read-only recognition model.
//!
//! A [`Model`] bundles everything sessions read but never modify: the
//! acoustic engine, the decoding graph, the word table and the optional
//! second-pass resources. It is built once and handed out as `Arc<Model>`;
//! the last session (or caller) dropping its reference frees it.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::RecognizerConfig;
use crate::error::{HarkError, Result};
use crate::fst::VectorFst;
use crate::inference::{AcousticEngine, WordAligner};
use crate::lattice::Label;
use crate::rescoring::RescoringLm;
use crate::symbols::SymbolTable;

/// The graph a decoder searches. Exactly one form per model or session.
#[derive(Debug, Clone)]
pub enum DecodingGraph {
    /// Fully composed HCLG graph.
    Precompiled(Arc<VectorFst>),
    /// HCL graph composed on the fly with a grammar / LM acceptor.
    Lookahead {
        hcl: Arc<VectorFst>,
        grammar: Arc<VectorFst>,
        disambig: Arc<[Label]>,
    },
}

impl DecodingGraph {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Precompiled(_) => "precompiled",
            Self::Lookahead { .. } => "lookahead",
        }
    }

    /// Words the graph can emit.
    pub fn output_labels(&self) -> BTreeSet<Label> {
        match self {
            Self::Precompiled(hclg) => hclg.output_labels(),
            Self::Lookahead { grammar, .. } => grammar.output_labels(),
        }
    }

    /// Same HCL graph, different grammar.
    ///
    /// # Errors
    /// `MissingDecodingGraph` for precompiled graphs, which cannot take a
    /// runtime grammar.
    pub fn with_grammar(&self, grammar: VectorFst) -> Result<Self> {
        match self {
            Self::Precompiled(_) => Err(HarkError::MissingDecodingGraph(
                "runtime grammars need a model with an HCL graph".into(),
            )),
            Self::Lookahead { hcl, disambig, .. } => Ok(Self::Lookahead {
                hcl: Arc::clone(hcl),
                grammar: Arc::new(grammar),
                disambig: Arc::clone(disambig),
            }),
        }
    }
}

pub struct Model {
    engine: Box<dyn AcousticEngine>,
    graph: DecodingGraph,
    words: SymbolTable,
    aligner: Option<Box<dyn WordAligner>>,
    rescoring: Option<RescoringLm>,
    config: RecognizerConfig,
}

impl Model {
    pub fn engine(&self) -> &dyn AcousticEngine {
        self.engine.as_ref()
    }

    pub fn graph(&self) -> &DecodingGraph {
        &self.graph
    }

    pub fn words(&self) -> &SymbolTable {
        &self.words
    }

    pub fn word_aligner(&self) -> Option<&dyn WordAligner> {
        self.aligner.as_deref()
    }

    pub fn rescoring_lm(&self) -> Option<&RescoringLm> {
        self.rescoring.as_ref()
    }

    pub fn config(&self) -> &RecognizerConfig {
        &self.config
    }

    /// Sample rate the model was trained on.
    pub fn sample_frequency(&self) -> f32 {
        self.config.sample_frequency
    }
}

impl std::fmt::Debug for Model {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Model")
            .field("graph", &self.graph.kind())
            .field("words", &self.words.len())
            .field("aligner", &self.aligner.is_some())
            .field("rescoring", &self.rescoring.is_some())
            .finish_non_exhaustive()
    }
}

pub struct ModelBuilder {
    engine: Box<dyn AcousticEngine>,
    words: SymbolTable,
    config: RecognizerConfig,
    hclg: Option<VectorFst>,
    lookahead: Option<(VectorFst, VectorFst, Vec<Label>)>,
    aligner: Option<Box<dyn WordAligner>>,
    rescoring: Option<RescoringLm>,
}

impl ModelBuilder {
    pub fn new<E: AcousticEngine + 'static>(engine: E, words: SymbolTable) -> Self {
        Self {
            engine: Box::new(engine),
            words,
            config: RecognizerConfig::default(),
            hclg: None,
            lookahead: None,
            aligner: None,
            rescoring: None,
        }
    }

    pub fn config(mut self, config: RecognizerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn hclg(mut self, hclg: VectorFst) -> Self {
        self.hclg = Some(hclg);
        self
    }

    pub fn lookahead(mut self, hcl: VectorFst, grammar: VectorFst, disambig: Vec<Label>) -> Self {
        self.lookahead = Some((hcl, grammar, disambig));
        self
    }

    pub fn word_aligner<A: WordAligner + 'static>(mut self, aligner: A) -> Self {
        self.aligner = Some(Box::new(aligner));
        self
    }

    pub fn rescoring(mut self, lm: RescoringLm) -> Self {
        self.rescoring = Some(lm);
        self
    }

    /// # Errors
    /// `MissingDecodingGraph` without a precompiled graph or an HCL+G pair;
    /// `Config` when the configuration is invalid.
    pub fn build(self) -> Result<Arc<Model>> {
        let mut config = self.config;
        config.normalize();
        config.validate()?;

        let graph = match (self.hclg, self.lookahead) {
            (Some(hclg), lookahead) => {
                if lookahead.is_some() {
                    warn!("both HCLG and HCL+G graphs supplied, using HCLG");
                }
                DecodingGraph::Precompiled(Arc::new(hclg))
            }
            (None, Some((hcl, grammar, disambig))) => DecodingGraph::Lookahead {
                hcl: Arc::new(hcl),
                grammar: Arc::new(grammar),
                disambig: disambig.into(),
            },
            (None, None) => {
                return Err(HarkError::MissingDecodingGraph(
                    "neither an HCLG graph nor an HCL+G pair was supplied".into(),
                ))
            }
        };

        info!(
            graph = graph.kind(),
            words = self.words.len(),
            word_alignment = self.aligner.is_some(),
            rescoring = self.rescoring.is_some(),
            "model loaded"
        );
        if config.silence_weighting.is_active() {
            info!(
                weight = config.silence_weighting.silence_weight,
                "silence weighting activated"
            );
        } else {
            info!("silence weighting deactivated");
        }
        debug!(
            sample_frequency = config.sample_frequency,
            frame_subsampling_factor = config.frame_subsampling_factor,
            max_frame_offset = config.max_frame_offset,
            "recognizer parameters"
        );

        Ok(Arc::new(Model {
            engine: self.engine,
            graph,
            words: self.words,
            aligner: self.aligner,
            rescoring: self.rescoring,
            config,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::stub::{StubConfig, StubEngine};

    fn words() -> SymbolTable {
        SymbolTable::from_words(["one", "two"]).expect("words")
    }

    #[test]
    fn build_without_graph_fails() {
        let err = ModelBuilder::new(StubEngine::new(StubConfig::default()), words())
            .build()
            .expect_err("no graph");
        assert!(matches!(err, HarkError::MissingDecodingGraph(_)));
    }

    #[test]
    fn precompiled_graph_wins_over_lookahead() {
        let model = ModelBuilder::new(StubEngine::new(StubConfig::default()), words())
            .hclg(VectorFst::new())
            .lookahead(VectorFst::new(), VectorFst::new(), vec![])
            .build()
            .expect("build");
        assert!(matches!(model.graph(), DecodingGraph::Precompiled(_)));
    }

    #[test]
    fn precompiled_graph_rejects_runtime_grammar() {
        let graph = DecodingGraph::Precompiled(Arc::new(VectorFst::new()));
        assert!(graph.with_grammar(VectorFst::new()).is_err());
    }

    #[test]
    fn sample_frequency_comes_from_config() {
        let mut config = RecognizerConfig::default();
        config.sample_frequency = 8_000.0;
        let model = ModelBuilder::new(StubEngine::new(StubConfig::default()), words())
            .config(config)
            .hclg(VectorFst::new())
            .build()
            .expect("build");
        assert_eq!(model.sample_frequency(), 8_000.0);
    }
}
