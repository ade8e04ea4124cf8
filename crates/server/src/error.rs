use thiserror::Error;

/// Result type for server lifecycle operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in this crate.
#[derive(Debug, Error)]
pub enum Error {
    /// Server already started.
    #[error("server already started")]
    AlreadyStarted,

    /// Failed to bind the listen address.
    #[error("failed to bind listen address")]
    Bind(#[source] std::io::Error),
}
