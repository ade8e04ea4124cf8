use tailcast_store::StoreError;
use thiserror::Error;

/// Errors that can occur in this crate.
#[derive(Debug, Error)]
pub enum Error<SE: StoreError> {
    /// Writer attempted on a stream that already completed cleanly.
    #[error("stream already completed")]
    AlreadyDone,

    /// The local handle was closed while an operation was pending.
    #[error("handle closed")]
    Closed,

    /// The stream expired from the store.
    #[error("stream expired")]
    Gone,

    /// The stream was forcibly terminated.
    #[error("stream killed")]
    Killed,

    /// No stream is registered under the requested id.
    #[error("stream not registered")]
    NotRegistered,

    /// Store error.
    #[error(transparent)]
    Store(#[from] SE),
}
