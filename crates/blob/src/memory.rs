use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::{BlobStore, BlobStoreError};

/// Errors from the in-memory blob store. It has no failure modes; the type
/// exists to satisfy the seam.
#[derive(Debug, Error)]
pub enum Error {}

impl BlobStoreError for Error {}

/// In-memory blob store for tests.
#[derive(Clone, Debug, Default)]
pub struct MemoryBlobStore {
    objects: Arc<Mutex<HashMap<String, Bytes>>>,
}

impl MemoryBlobStore {
    /// Creates a new `MemoryBlobStore`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetches an object directly, the way a consumer following the
    /// redirect would.
    pub async fn get(&self, path: &str) -> Option<Bytes> {
        self.objects.lock().await.get(path).cloned()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    type Error = Error;

    async fn exists(&self, path: &str) -> Result<bool, Self::Error> {
        Ok(self.objects.lock().await.contains_key(path))
    }

    async fn put(&self, path: &str, bytes: Bytes) -> Result<(), Self::Error> {
        self.objects.lock().await.insert(path.to_string(), bytes);
        Ok(())
    }

    fn url(&self, path: &str) -> String {
        format!("memory://blobs/{path}")
    }
}
