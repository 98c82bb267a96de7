//! Error types for fintrack.

use thiserror::Error;

/// Result type alias using fintrack's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for fintrack operations.
///
/// The job processor feeds every variant into the same retry decision, so
/// the split below exists for logs and callers, not for retry policy.
#[derive(Error, Debug)]
pub enum Error {
    /// Retry store / queue broker operation failed
    #[error("Store error: {0}")]
    Store(String),

    /// OCR text could not be produced (fetch, decode, or engine failure)
    #[error("Extraction error: {0}")]
    Extraction(String),

    /// Result webhook rejected or unreachable
    #[error("Delivery error: {0}")]
    Delivery(String),

    /// Third-party page mirror rejected or unreachable
    #[error("Mirror error: {0}")]
    Mirror(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// File I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<redis::RedisError> for Error {
    fn from(e: redis::RedisError) -> Self {
        Error::Store(e.to_string())
    }
}
