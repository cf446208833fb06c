use std::path::PathBuf;
use thiserror::Error;

/// Fatal errors for formdiff operations.
///
/// These abort a run. Per-pair comparison failures are [`ComparisonError`]s
/// and are recorded in the report instead of being returned.
#[derive(Debug, Error)]
pub enum FormdiffError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Input error for {path}: {message}")]
    Input { path: PathBuf, message: String },

    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize report for {path}: {source}")]
    ReportSerialize {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to extract text from {path}: {message}")]
    Extract { path: PathBuf, message: String },

    #[error("Invalid option: {0}")]
    InvalidOption(String),
}

/// A failure attributable to a single image pair.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ComparisonError {
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("service error: {0}")]
    ServiceError(String),

    #[error("timed out after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("failed to encode image {id}: {reason}")]
    UnreadableImage { id: String, reason: String },

    #[error("cancelled before the comparison started")]
    Cancelled,
}
