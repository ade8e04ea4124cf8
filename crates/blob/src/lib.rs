//! The blob-store seam: where completed streams are persisted so late
//! consumers can still fetch them after the relay's own state expires.
//! Objects are whole values addressed by the stream's path.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod http;
mod memory;

pub use http::HttpBlobStore;
pub use memory::MemoryBlobStore;

use std::error::Error;
use std::fmt::Debug;

use async_trait::async_trait;
use bytes::Bytes;

/// Marker trait for blob store errors
pub trait BlobStoreError: Debug + Error + Send + Sync + 'static {}

/// A trait representing whole-object blob storage with asynchronous
/// operations.
///
/// The relay only ever uploads and checks existence; consumers fetch
/// objects themselves via the URL the facade redirects them to.
#[async_trait]
pub trait BlobStore: Clone + Send + Sync + 'static {
    /// The error type for the blob store.
    type Error: BlobStoreError;

    /// Tests whether an object exists at `path`.
    async fn exists(&self, path: &str) -> Result<bool, Self::Error>;

    /// Stores the whole object at `path`, replacing any previous content.
    async fn put(&self, path: &str, bytes: Bytes) -> Result<(), Self::Error>;

    /// The URL a consumer can fetch the object from.
    fn url(&self, path: &str) -> String;
}
