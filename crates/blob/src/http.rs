use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, StatusCode};
use thiserror::Error;

use crate::{BlobStore, BlobStoreError};

/// Errors from the HTTP blob store.
#[derive(Debug, Error)]
pub enum Error {
    /// Request failed at the transport level.
    #[error(transparent)]
    Request(#[from] reqwest::Error),

    /// The backend answered an upload with a non-success status.
    #[error("unexpected status storing blob: {0}")]
    UnexpectedStatus(StatusCode),
}

impl BlobStoreError for Error {}

/// Blob storage over plain HTTP: objects live at `<base>/<path>` and are
/// written with `PUT`, probed with `HEAD`, and fetched by consumers with
/// `GET`.
#[derive(Clone, Debug)]
pub struct HttpBlobStore {
    base_url: String,
    client: Client,
}

impl HttpBlobStore {
    /// Creates a store rooted at `base_url`.
    #[must_use]
    pub fn new<T: Into<String>>(base_url: T) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();

        Self {
            base_url,
            client: Client::new(),
        }
    }
}

#[async_trait]
impl BlobStore for HttpBlobStore {
    type Error = Error;

    async fn exists(&self, path: &str) -> Result<bool, Self::Error> {
        let response = self.client.head(self.url(path)).send().await?;
        Ok(response.status().is_success())
    }

    async fn put(&self, path: &str, bytes: Bytes) -> Result<(), Self::Error> {
        let response = self.client.put(self.url(path)).body(bytes).send().await?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(Error::UnexpectedStatus(response.status()))
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}
