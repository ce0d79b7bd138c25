//! Error types for pipewatch

use thiserror::Error;

/// Main error type for the pipeline observer
#[derive(Error, Debug)]
pub enum ObserverError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    /// The backend answered 404. Terminal for the resource, never retried.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Network failure, 5xx or any other unexpected status
    #[error("Transient fetch failure: {0}")]
    Transient(String),

    /// The backend answered but the payload could not be understood
    #[error("Malformed response: {0}")]
    Malformed(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Selection unavailable: {0}")]
    SelectionUnavailable(String),

    #[error("Observation session closed")]
    SessionClosed,
}

impl ObserverError {
    /// Whether this error means the resource does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(self, ObserverError::NotFound(_))
    }

    /// Whether a fetch that failed with this error may be retried
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ObserverError::HttpError(_)
                | ObserverError::Transient(_)
                | ObserverError::Malformed(_)
                | ObserverError::JsonError(_)
        )
    }
}
