use thiserror::Error;

/// All errors produced by hark-core.
#[derive(Debug, Error)]
pub enum HarkError {
    #[error("cannot create decoding graph: {0}")]
    MissingDecodingGraph(String),

    #[error("model resource missing: {0}")]
    MissingResource(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("duplicate symbol id {id} (words {existing:?} and {word:?})")]
    DuplicateSymbol {
        id: u32,
        existing: String,
        word: String,
    },

    #[error("lattice is cyclic, expected an acyclic word lattice")]
    CyclicLattice,

    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    /// Raised by engine implementations.
    #[error("decoder error: {0}")]
    Decoder(String),

    #[error("speaker embedding error: {0}")]
    Speaker(String),

    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, HarkError>;
