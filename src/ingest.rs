//! Embedding ingest flow for `embedding.create` events.
//!
//! Fetch the document, extract its text, embed it, upsert it into the
//! index keyed by the object name. An extraction failure aborts the
//! ingest for that document with no partial index write. No completion
//! event is published in the baseline design.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::json;

use crate::broker::{HandlerError, RecordHeaders, SuspendingHandler};
use crate::events::EventMessage;
use crate::index::{Embedder, VectorIndex};

#[derive(Debug)]
pub enum IngestError {
    Fetch(String),
    Extract(String),
}

impl fmt::Display for IngestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IngestError::Fetch(msg) => write!(f, "document fetch failed: {}", msg),
            IngestError::Extract(msg) => write!(f, "text extraction failed: {}", msg),
        }
    }
}

impl std::error::Error for IngestError {}

/// Document download capability.
#[async_trait::async_trait]
pub trait DocumentFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, IngestError>;
}

/// Text extraction capability. A pure function over the fetched bytes;
/// PDF and office formats plug in behind this trait.
pub trait TextExtractor: Send + Sync {
    fn extract(&self, bytes: &[u8]) -> Result<String, IngestError>;
}

/// HTTP fetcher that also drops a copy of the document into a scratch
/// directory, named from the URL tail.
pub struct HttpFetcher {
    http: reqwest::Client,
    scratch_dir: PathBuf,
}

impl HttpFetcher {
    pub fn new(scratch_dir: impl Into<PathBuf>) -> Self {
        Self {
            http: reqwest::Client::new(),
            scratch_dir: scratch_dir.into(),
        }
    }

    fn scratch_path(&self, url: &str) -> PathBuf {
        self.scratch_dir.join(filename_from_url(url))
    }
}

/// Last path segment of the URL, query string stripped.
fn filename_from_url(url: &str) -> String {
    let without_query = url.split('?').next().unwrap_or(url);
    without_query
        .rsplit('/')
        .next()
        .filter(|name| !name.is_empty())
        .unwrap_or("document")
        .to_string()
}

#[async_trait::async_trait]
impl DocumentFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, IngestError> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| IngestError::Fetch(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(IngestError::Fetch(format!(
                "failed to download document: {}",
                status
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| IngestError::Fetch(e.to_string()))?
            .to_vec();

        let path = self.scratch_path(url);
        if let Err(e) = tokio::fs::write(&path, &bytes).await {
            tracing::warn!("Could not write scratch copy to {}: {}", path.display(), e);
        }

        Ok(bytes)
    }
}

/// Extractor for plain-text documents. Non-UTF-8 input fails closed.
pub struct PlainTextExtractor;

impl TextExtractor for PlainTextExtractor {
    fn extract(&self, bytes: &[u8]) -> Result<String, IngestError> {
        String::from_utf8(bytes.to_vec())
            .map_err(|e| IngestError::Extract(format!("document is not valid UTF-8: {}", e)))
    }
}

/// `embedding.create` payload shape.
#[derive(Debug, Deserialize)]
struct EmbeddingCreate {
    url: Option<String>,
    object_name: Option<String>,
}

/// Suspending handler for `embedding.create` events. Each step is
/// awaited inline, bounding in-flight ingest concurrency to the consume
/// loop's own.
pub struct IngestHandler {
    fetcher: Arc<dyn DocumentFetcher>,
    extractor: Arc<dyn TextExtractor>,
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
}

impl IngestHandler {
    pub fn new(
        fetcher: Arc<dyn DocumentFetcher>,
        extractor: Arc<dyn TextExtractor>,
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
    ) -> Self {
        Self {
            fetcher,
            extractor,
            embedder,
            index,
        }
    }
}

#[async_trait::async_trait]
impl SuspendingHandler for IngestHandler {
    async fn handle(
        &self,
        _topic: &str,
        envelope: &EventMessage,
        _headers: &RecordHeaders,
    ) -> Result<(), HandlerError> {
        let request: EmbeddingCreate = serde_json::from_value(envelope.payload.clone())
            .map_err(|e| HandlerError::Validation(format!("malformed ingest payload: {}", e)))?;

        let url = request
            .url
            .filter(|url| !url.is_empty())
            .ok_or_else(|| HandlerError::Validation("url is required".to_string()))?;
        let object_name = request
            .object_name
            .filter(|name| !name.is_empty())
            .ok_or_else(|| HandlerError::Validation("object_name is required".to_string()))?;

        let bytes = self
            .fetcher
            .fetch(&url)
            .await
            .map_err(|e| HandlerError::Ingest(e.to_string()))?;

        let text = self
            .extractor
            .extract(&bytes)
            .map_err(|e| HandlerError::Ingest(e.to_string()))?;

        let vector = self
            .embedder
            .embed(&text)
            .await
            .map_err(|e| HandlerError::Ingest(e.to_string()))?;

        let mut metadata = HashMap::new();
        metadata.insert("source".to_string(), json!("kafka"));
        metadata.insert("filename".to_string(), json!(object_name.clone()));

        self.index
            .upsert(&object_name, vector, &text, metadata)
            .await
            .map_err(|e| HandlerError::Ingest(e.to_string()))?;

        tracing::info!("Embedding for {} stored successfully", object_name);
        Ok(())
    }
}
