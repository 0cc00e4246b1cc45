//! Where inbound documents are staged before analysis.
//!
//! The caller uploads the PDF somewhere first and hands the pipeline a
//! location. The pipeline fetches it and releases it when the run ends,
//! whatever the outcome.

use std::future::Future;
use std::path::Path;
use std::time::Duration;

use crate::error::StagingError;

pub const DEFAULT_DELETE_ENDPOINT: &str = "https://blob.vercel-storage.com/delete";
pub const MAX_DOCUMENT_BYTES: u64 = 10 * 1024 * 1024; // 10MB
const FETCH_TIMEOUT_SECS: u64 = 60;

pub trait DocumentStore: Send + Sync {
    fn fetch(&self, location: &str) -> impl Future<Output = Result<Vec<u8>, StagingError>> + Send;

    /// Remove the staged object. Called exactly once per run.
    fn release(&self, location: &str) -> impl Future<Output = Result<(), StagingError>> + Send;
}

/// HTTP object store (Vercel Blob compatible): read by URL, delete through the
/// store's delete endpoint with a bearer token.
pub struct BlobStore {
    client: reqwest::Client,
    token: Option<String>,
    delete_endpoint: String,
    max_bytes: u64,
}

impl BlobStore {
    pub fn new(token: Option<String>, delete_endpoint: impl Into<String>) -> Result<Self, StagingError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(FETCH_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            client,
            token,
            delete_endpoint: delete_endpoint.into(),
            max_bytes: MAX_DOCUMENT_BYTES,
        })
    }

    pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = max_bytes;
        self
    }
}

impl DocumentStore for BlobStore {
    async fn fetch(&self, location: &str) -> Result<Vec<u8>, StagingError> {
        let resp = self.client.get(location).send().await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(StagingError::Status {
                status: status.as_u16(),
            });
        }

        if let Some(len) = resp.content_length() {
            if len > self.max_bytes {
                return Err(StagingError::TooLarge(len));
            }
        }

        let bytes = resp.bytes().await?;
        if bytes.len() as u64 > self.max_bytes {
            return Err(StagingError::TooLarge(bytes.len() as u64));
        }

        tracing::info!(bytes = bytes.len(), "fetched staged document");
        Ok(bytes.to_vec())
    }

    async fn release(&self, location: &str) -> Result<(), StagingError> {
        let token = self.token.as_deref().ok_or(StagingError::MissingToken)?;

        let resp = self
            .client
            .post(&self.delete_endpoint)
            .bearer_auth(token)
            .json(&serde_json::json!({ "urls": [location] }))
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(StagingError::Status {
                status: status.as_u16(),
            });
        }
        tracing::debug!("released staged document");
        Ok(())
    }
}

/// Reads documents straight from the local filesystem. `release` leaves the
/// file alone: it belongs to the user, not to the run.
#[derive(Debug, Clone)]
pub struct LocalStore {
    max_bytes: u64,
}

impl LocalStore {
    pub fn new() -> Self {
        Self {
            max_bytes: MAX_DOCUMENT_BYTES,
        }
    }

    pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = max_bytes;
        self
    }
}

impl Default for LocalStore {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentStore for LocalStore {
    async fn fetch(&self, location: &str) -> Result<Vec<u8>, StagingError> {
        let path = Path::new(location);
        let io_err = |source| StagingError::Io {
            path: path.display().to_string(),
            source,
        };

        let meta = tokio::fs::metadata(path).await.map_err(io_err)?;
        if meta.len() > self.max_bytes {
            return Err(StagingError::TooLarge(meta.len()));
        }
        tokio::fs::read(path).await.map_err(io_err)
    }

    async fn release(&self, _location: &str) -> Result<(), StagingError> {
        Ok(())
    }
}

/// A document already fetched from `inner`. Fetching hands out the held
/// bytes; release still goes to `inner`.
pub struct Prefetched<S> {
    inner: S,
    bytes: Vec<u8>,
}

impl<S: DocumentStore> Prefetched<S> {
    /// Fetch `location` from `store` up front. On failure the store is
    /// returned with the error so the caller can still release the object.
    pub async fn fetch_from(store: S, location: &str) -> Result<Self, (S, StagingError)> {
        match store.fetch(location).await {
            Ok(bytes) => Ok(Self { inner: store, bytes }),
            Err(e) => Err((store, e)),
        }
    }
}

impl<S: DocumentStore> DocumentStore for Prefetched<S> {
    async fn fetch(&self, _location: &str) -> Result<Vec<u8>, StagingError> {
        Ok(self.bytes.clone())
    }

    async fn release(&self, location: &str) -> Result<(), StagingError> {
        self.inner.release(location).await
    }
}
