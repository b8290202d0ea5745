//! Error types for the sequencing core

use thiserror::Error;

/// Core error type
#[derive(Error, Debug)]
pub enum SequencerError {
    #[error("Invalid grid: {0}")]
    InvalidGrid(String),

    #[error("Invalid winline template {index}: {reason}")]
    InvalidTemplate { index: usize, reason: String },

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yml::Error),

    #[error("Critical sequence '{0}' holds the lock")]
    CriticalSequenceHeld(String),

    #[error("Autoplay error: {0}")]
    Autoplay(String),
}

/// Result type alias
pub type SequencerResult<T> = Result<T, SequencerError>;

/// Failures reported by external collaborators (effects, presenters)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EffectError {
    #[error("Asset not available: {0}")]
    MissingAsset(String),

    #[error("Effect rejected: {0}")]
    Rejected(String),
}
