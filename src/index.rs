//! Embedding and vector-index capability interfaces.
//!
//! The embedding model and the index are external services consumed
//! behind these traits; this crate only specifies their orchestration.
//! [`MemoryIndex`] is the in-process implementation used as the default
//! and in tests.

use std::collections::HashMap;
use std::fmt;

use serde_json::Value;
use tokio::sync::RwLock;

#[derive(Debug)]
pub enum IndexError {
    /// The index or embedding service could not be reached. Callers
    /// treat this as empty context, not a fatal error.
    Unavailable(String),
    /// The service answered with something unusable.
    Malformed(String),
}

impl fmt::Display for IndexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexError::Unavailable(msg) => write!(f, "index unavailable: {}", msg),
            IndexError::Malformed(msg) => write!(f, "malformed index response: {}", msg),
        }
    }
}

impl std::error::Error for IndexError {}

/// Text-to-vector capability.
#[async_trait::async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, IndexError>;
}

/// A document as stored in the index.
#[derive(Debug, Clone)]
pub struct StoredDocument {
    pub id: String,
    pub content: String,
    pub metadata: HashMap<String, Value>,
}

/// One nearest-neighbor result. `distance` is the index's raw distance
/// measure; smaller is closer.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub id: String,
    pub content: String,
    pub metadata: HashMap<String, Value>,
    pub distance: f32,
}

/// Vector index capability: upsert, direct lookup, k-nearest search.
///
/// Search results come back ordered by ascending distance (best first).
#[async_trait::async_trait]
pub trait VectorIndex: Send + Sync {
    async fn upsert(
        &self,
        id: &str,
        vector: Vec<f32>,
        content: &str,
        metadata: HashMap<String, Value>,
    ) -> Result<(), IndexError>;

    async fn get_by_id(&self, id: &str) -> Result<Option<StoredDocument>, IndexError>;

    async fn search(&self, vector: &[f32], k: usize) -> Result<Vec<SearchHit>, IndexError>;
}

struct Entry {
    vector: Vec<f32>,
    content: String,
    metadata: HashMap<String, Value>,
}

/// In-memory cosine-distance index.
#[derive(Default)]
pub struct MemoryIndex {
    entries: RwLock<HashMap<String, Entry>>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[async_trait::async_trait]
impl VectorIndex for MemoryIndex {
    async fn upsert(
        &self,
        id: &str,
        vector: Vec<f32>,
        content: &str,
        metadata: HashMap<String, Value>,
    ) -> Result<(), IndexError> {
        let mut entries = self.entries.write().await;
        entries.insert(
            id.to_string(),
            Entry {
                vector,
                content: content.to_string(),
                metadata,
            },
        );
        Ok(())
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<StoredDocument>, IndexError> {
        let entries = self.entries.read().await;
        Ok(entries.get(id).map(|entry| StoredDocument {
            id: id.to_string(),
            content: entry.content.clone(),
            metadata: entry.metadata.clone(),
        }))
    }

    async fn search(&self, vector: &[f32], k: usize) -> Result<Vec<SearchHit>, IndexError> {
        let entries = self.entries.read().await;

        let mut hits: Vec<SearchHit> = entries
            .iter()
            .map(|(id, entry)| SearchHit {
                id: id.clone(),
                content: entry.content.clone(),
                metadata: entry.metadata.clone(),
                distance: 1.0 - cosine_similarity(vector, &entry.vector),
            })
            .collect();

        hits.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(k);

        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[tokio::test]
    async fn test_upsert_and_get_by_id() {
        let index = MemoryIndex::new();
        let mut metadata = HashMap::new();
        metadata.insert("filename".to_string(), json!("report.pdf"));

        index
            .upsert("doc-1", vec![1.0, 0.0], "contents", metadata)
            .await
            .unwrap();

        let found = index.get_by_id("doc-1").await.unwrap().unwrap();
        assert_eq!(found.id, "doc-1");
        assert_eq!(found.content, "contents");
        assert_eq!(found.metadata["filename"], json!("report.pdf"));

        assert!(index.get_by_id("doc-2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_upsert_replaces_existing_entry() {
        let index = MemoryIndex::new();
        index
            .upsert("doc-1", vec![1.0, 0.0], "first", HashMap::new())
            .await
            .unwrap();
        index
            .upsert("doc-1", vec![0.0, 1.0], "second", HashMap::new())
            .await
            .unwrap();

        let found = index.get_by_id("doc-1").await.unwrap().unwrap();
        assert_eq!(found.content, "second");
    }

    #[tokio::test]
    async fn test_search_orders_by_ascending_distance() {
        let index = MemoryIndex::new();
        index
            .upsert("far", vec![0.0, 1.0], "far away", HashMap::new())
            .await
            .unwrap();
        index
            .upsert("near", vec![1.0, 0.1], "close by", HashMap::new())
            .await
            .unwrap();
        index
            .upsert("exact", vec![1.0, 0.0], "same direction", HashMap::new())
            .await
            .unwrap();

        let hits = index.search(&[1.0, 0.0], 2).await.unwrap();

        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, "exact");
        assert_eq!(hits[1].id, "near");
        assert!(hits[0].distance <= hits[1].distance);
    }
}
