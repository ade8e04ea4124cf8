use reqwest::StatusCode;
use thiserror::Error;

/// Result type for forwarder operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in this crate.
#[derive(Debug, Error)]
pub enum Error {
    /// Transport-level request failure.
    #[error(transparent)]
    Request(#[from] reqwest::Error),

    /// Every allowed attempt failed; carries the last error observed.
    #[error("retries exhausted: {0}")]
    RetriesExhausted(#[source] Box<Error>),

    /// Could not create or reopen the scratch file.
    #[error("scratch file error")]
    Scratch(#[source] std::io::Error),

    /// The server answered with a terminal non-success status.
    #[error("unexpected status: {0}")]
    UnexpectedStatus(StatusCode),
}
