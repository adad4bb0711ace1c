use std::path::PathBuf;

use thiserror::Error;

/// Recoverable conditions raised while mining a candidate pool.
///
/// Neither is fatal on its own: a short class is skipped for the cycle and a
/// pool without enough eligible classes is redrawn by the generator.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MiningError {
    /// A class has fewer than two samples and cannot provide a positive.
    #[error("class {class_id} has {size} sample(s); at least 2 are needed to form a positive pair")]
    InsufficientClassSize { class_id: usize, size: usize },

    /// Fewer than two classes with at least two samples remain in the pool.
    #[error("pool has {eligible} eligible class(es); at least 2 are needed to mine triplets")]
    InsufficientPoolDiversity { eligible: usize },
}

/// Error type for every fallible operation in the crate.
#[derive(Debug, Error)]
pub enum FaceNetError {
    #[error(transparent)]
    Mining(#[from] MiningError),

    /// The embedding model could not produce embeddings for a pool.
    #[error("embedding computation failed: {reason}")]
    EmbeddingComputation { reason: String },

    #[error("cannot load image {path}: {reason}")]
    ImageLoad { path: PathBuf, reason: String },

    /// Weights or history could not be persisted. Training must stop.
    #[error("cannot write checkpoint {path}: {source}")]
    CheckpointWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Every pool drawn in a row failed to yield triplets.
    #[error("corpus too small: {attempts} consecutive pool draws failed (last: {last})")]
    CorpusTooSmall { attempts: usize, last: MiningError },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, FaceNetError>;
