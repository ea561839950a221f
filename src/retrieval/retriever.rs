//! Document retrieval over the embedding and index capabilities.

use std::sync::Arc;

use crate::index::{Embedder, VectorIndex};
use crate::retrieval::context::DocumentContext;

/// Fetches document context either by direct id lookup or by semantic
/// similarity search. Index failures degrade to empty context; they are
/// never fatal to the caller's pipeline.
pub struct DocumentRetriever {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
}

impl DocumentRetriever {
    pub fn new(embedder: Arc<dyn Embedder>, index: Arc<dyn VectorIndex>) -> Self {
        Self { embedder, index }
    }

    /// Direct lookup by document id. Not-found is a warning, not an
    /// error: the caller proceeds with empty context.
    pub async fn get_document_by_id(&self, document_id: &str) -> Option<DocumentContext> {
        match self.index.get_by_id(document_id).await {
            Ok(Some(stored)) => Some(DocumentContext {
                document_id: stored.id,
                content: stored.content,
                metadata: stored.metadata,
                similarity_score: 1.0, // exact match
            }),
            Ok(None) => {
                tracing::warn!("Document {} not found in index", document_id);
                None
            }
            Err(e) => {
                tracing::error!("Error retrieving document {}: {}", document_id, e);
                None
            }
        }
    }

    /// Similarity search: embed the query, take the `n_results` nearest
    /// neighbors, convert distance to similarity as `1 - distance`, and
    /// keep only results at or above `similarity_threshold`, preserving
    /// the index's ranking order (best similarity first).
    pub async fn search_similar_documents(
        &self,
        query: &str,
        n_results: usize,
        similarity_threshold: f32,
    ) -> Vec<DocumentContext> {
        let query_vector = match self.embedder.embed(query).await {
            Ok(vector) => vector,
            Err(e) => {
                tracing::error!("Error embedding query: {}", e);
                return Vec::new();
            }
        };

        let hits = match self.index.search(&query_vector, n_results).await {
            Ok(hits) => hits,
            Err(e) => {
                tracing::error!("Error searching similar documents: {}", e);
                return Vec::new();
            }
        };

        hits.into_iter()
            .filter_map(|hit| {
                let similarity = 1.0 - hit.distance;
                if similarity >= similarity_threshold {
                    Some(DocumentContext {
                        document_id: hit.id,
                        content: hit.content,
                        metadata: hit.metadata,
                        similarity_score: similarity,
                    })
                } else {
                    None
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{IndexError, SearchHit, StoredDocument};
    use std::collections::HashMap;

    struct FixedEmbedder;

    #[async_trait::async_trait]
    impl Embedder for FixedEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, IndexError> {
            Ok(vec![1.0, 0.0])
        }
    }

    struct FailingEmbedder;

    #[async_trait::async_trait]
    impl Embedder for FailingEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, IndexError> {
            Err(IndexError::Unavailable("embedding service down".to_string()))
        }
    }

    /// Index returning pre-seeded hits in ascending-distance order.
    struct FixedIndex {
        hits: Vec<SearchHit>,
        documents: HashMap<String, StoredDocument>,
        fail: bool,
    }

    impl FixedIndex {
        fn with_distances(distances: &[(&str, f32)]) -> Self {
            Self {
                hits: distances
                    .iter()
                    .map(|(id, distance)| SearchHit {
                        id: id.to_string(),
                        content: format!("content of {}", id),
                        metadata: HashMap::new(),
                        distance: *distance,
                    })
                    .collect(),
                documents: HashMap::new(),
                fail: false,
            }
        }
    }

    #[async_trait::async_trait]
    impl VectorIndex for FixedIndex {
        async fn upsert(
            &self,
            _id: &str,
            _vector: Vec<f32>,
            _content: &str,
            _metadata: HashMap<String, serde_json::Value>,
        ) -> Result<(), IndexError> {
            Ok(())
        }

        async fn get_by_id(&self, id: &str) -> Result<Option<StoredDocument>, IndexError> {
            if self.fail {
                return Err(IndexError::Unavailable("down".to_string()));
            }
            Ok(self.documents.get(id).cloned())
        }

        async fn search(&self, _vector: &[f32], k: usize) -> Result<Vec<SearchHit>, IndexError> {
            if self.fail {
                return Err(IndexError::Unavailable("down".to_string()));
            }
            Ok(self.hits.iter().take(k).cloned().collect())
        }
    }

    fn retriever(index: FixedIndex) -> DocumentRetriever {
        DocumentRetriever::new(Arc::new(FixedEmbedder), Arc::new(index))
    }

    #[tokio::test]
    async fn test_threshold_filters_exactly() {
        // Nearest neighbors with similarities 0.91 and 0.6; threshold
        // 0.8 keeps exactly the first.
        let retriever = retriever(FixedIndex::with_distances(&[
            ("close", 0.09),
            ("far", 0.4),
        ]));

        let context = retriever.search_similar_documents("query", 2, 0.8).await;

        assert_eq!(context.len(), 1);
        assert_eq!(context[0].document_id, "close");
        assert!((context[0].similarity_score - 0.91).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_raising_threshold_never_increases_results() {
        let distances = [("a", 0.05), ("b", 0.25), ("c", 0.45)];

        let mut previous = usize::MAX;
        for threshold in [0.0, 0.5, 0.7, 0.9, 1.0] {
            let retriever = retriever(FixedIndex::with_distances(&distances));
            let count = retriever
                .search_similar_documents("query", 3, threshold)
                .await
                .len();
            assert!(count <= previous);
            previous = count;
        }
    }

    #[tokio::test]
    async fn test_ranking_order_is_preserved() {
        let retriever = retriever(FixedIndex::with_distances(&[
            ("best", 0.1),
            ("middle", 0.2),
            ("worst", 0.3),
        ]));

        let context = retriever.search_similar_documents("query", 3, 0.0).await;

        let ids: Vec<&str> = context.iter().map(|d| d.document_id.as_str()).collect();
        assert_eq!(ids, vec!["best", "middle", "worst"]);
        assert!(context[0].similarity_score >= context[1].similarity_score);
        assert!(context[1].similarity_score >= context[2].similarity_score);
    }

    #[tokio::test]
    async fn test_direct_lookup_scores_exact_match() {
        let mut index = FixedIndex::with_distances(&[]);
        index.documents.insert(
            "doc-1".to_string(),
            StoredDocument {
                id: "doc-1".to_string(),
                content: "stored".to_string(),
                metadata: HashMap::new(),
            },
        );

        let retriever = retriever(index);
        let found = retriever.get_document_by_id("doc-1").await.unwrap();
        assert_eq!(found.similarity_score, 1.0);
        assert_eq!(found.content, "stored");
    }

    #[tokio::test]
    async fn test_direct_lookup_not_found_is_none() {
        let retriever = retriever(FixedIndex::with_distances(&[]));
        assert!(retriever.get_document_by_id("missing").await.is_none());
    }

    #[tokio::test]
    async fn test_index_failure_degrades_to_empty_context() {
        let mut index = FixedIndex::with_distances(&[("a", 0.1)]);
        index.fail = true;

        let retriever = retriever(index);
        assert!(retriever.search_similar_documents("q", 3, 0.0).await.is_empty());
        assert!(retriever.get_document_by_id("a").await.is_none());
    }

    #[tokio::test]
    async fn test_embedder_failure_degrades_to_empty_context() {
        let retriever = DocumentRetriever::new(
            Arc::new(FailingEmbedder),
            Arc::new(FixedIndex::with_distances(&[("a", 0.1)])),
        );

        assert!(retriever.search_similar_documents("q", 3, 0.0).await.is_empty());
    }
}
