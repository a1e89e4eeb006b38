use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced by the tracking pipeline.
///
/// Every operation either completes fully or reports one of these and leaves
/// the persisted tables untouched; nothing is retried.
#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("invalid value: {0}")]
    Validation(String),

    #[error("cannot train on an empty test history")]
    InsufficientData,

    #[error("no recorded tests for participant {0}")]
    NoHistory(String),

    #[error("model has not been trained yet")]
    ModelNotTrained,

    #[error("no participant named {0}")]
    ParticipantNotFound(String),

    #[error("malformed data file {}: {message}", path.display())]
    FileFormat { path: PathBuf, message: String },

    #[error("model training failed: {0}")]
    Training(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("model artifact is not valid JSON: {0}")]
    ModelFormat(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, TrackerError>;
