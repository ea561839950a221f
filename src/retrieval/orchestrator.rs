//! Query orchestration: turn a `document.query` event into a grounded
//! `llm.response` event.
//!
//! Per query the pipeline moves through
//! `received -> context_resolved -> prompt_built -> response_generated -> published`,
//! terminal on success or on a reported failure. A validation failure or
//! a generation failure aborts without a publish; retrieval failures
//! degrade to an ungrounded prompt.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::json;

use crate::broker::{EventPublisher, HandlerError, RecordHeaders, SuspendingHandler};
use crate::events::{topics, EventMessage};
use crate::llm::LanguageModel;
use crate::retrieval::context::{build_prompt, DEFAULT_SYSTEM_MESSAGE};
use crate::retrieval::retriever::DocumentRetriever;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryType {
    SpecificDocument,
    SemanticSearch,
}

impl Default for QueryType {
    fn default() -> Self {
        QueryType::SemanticSearch
    }
}

fn default_n_results() -> usize {
    3
}

fn default_similarity_threshold() -> f32 {
    0.7
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    #[serde(default = "default_n_results")]
    pub n_results: usize,
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            n_results: default_n_results(),
            similarity_threshold: default_similarity_threshold(),
        }
    }
}

fn default_max_tokens() -> u32 {
    1000
}

fn default_temperature() -> f32 {
    0.7
}

fn default_system_message() -> String {
    DEFAULT_SYSTEM_MESSAGE.to_string()
}

#[derive(Debug, Deserialize)]
pub struct LlmParams {
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_system_message")]
    pub system_message: String,
}

impl Default for LlmParams {
    fn default() -> Self {
        Self {
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            system_message: default_system_message(),
        }
    }
}

/// `document.query` payload shape. Everything except `user_prompt` has
/// a default.
#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    pub user_prompt: Option<String>,
    pub document_id: Option<String>,
    #[serde(default)]
    pub query_type: QueryType,
    #[serde(default)]
    pub search_params: SearchParams,
    #[serde(default)]
    pub llm_params: LlmParams,
}

/// Suspending handler for `document.query` events.
pub struct QueryHandler {
    retriever: DocumentRetriever,
    llm: Arc<dyn LanguageModel>,
    publisher: Arc<dyn EventPublisher>,
    /// Service identifier stamped on the response envelope.
    source: String,
}

impl QueryHandler {
    pub fn new(
        retriever: DocumentRetriever,
        llm: Arc<dyn LanguageModel>,
        publisher: Arc<dyn EventPublisher>,
        source: &str,
    ) -> Self {
        Self {
            retriever,
            llm,
            publisher,
            source: source.to_string(),
        }
    }
}

#[async_trait::async_trait]
impl SuspendingHandler for QueryHandler {
    async fn handle(
        &self,
        _topic: &str,
        envelope: &EventMessage,
        _headers: &RecordHeaders,
    ) -> Result<(), HandlerError> {
        let request: QueryRequest = serde_json::from_value(envelope.payload.clone())
            .map_err(|e| HandlerError::Validation(format!("malformed query payload: {}", e)))?;

        let user_prompt = request
            .user_prompt
            .filter(|prompt| !prompt.trim().is_empty())
            .ok_or_else(|| HandlerError::Validation("user_prompt is required".to_string()))?;

        let context = match request.query_type {
            QueryType::SpecificDocument => match request.document_id.as_deref() {
                Some(document_id) => self
                    .retriever
                    .get_document_by_id(document_id)
                    .await
                    .into_iter()
                    .collect(),
                None => {
                    tracing::warn!(
                        "specific_document query {} carries no document_id, proceeding ungrounded",
                        envelope.metadata.correlation_id
                    );
                    Vec::new()
                }
            },
            QueryType::SemanticSearch => {
                self.retriever
                    .search_similar_documents(
                        &user_prompt,
                        request.search_params.n_results,
                        request.search_params.similarity_threshold,
                    )
                    .await
            }
        };

        tracing::debug!(
            "Query {} resolved {} context document(s)",
            envelope.metadata.correlation_id,
            context.len()
        );

        let prompt = build_prompt(&user_prompt, &context);

        let result = self
            .llm
            .complete(
                &prompt,
                &request.llm_params.system_message,
                request.llm_params.max_tokens,
                request.llm_params.temperature,
            )
            .await
            .map_err(|e| HandlerError::Generation(e.to_string()))?;

        let response = envelope.reply(
            &self.source,
            topics::LLM_RESPONSE,
            json!({
                "prompt": user_prompt,
                "response": result.content,
                "model": result.model,
                "finish_reason": result.finish_reason.as_str(),
            }),
        );

        self.publisher
            .publish(topics::LLM_RESPONSE, &response, None)
            .await
            .map_err(|e| HandlerError::Publish(e.to_string()))?;

        tracing::info!(
            "Published llm.response {} for query {}",
            response.message_id,
            envelope.metadata.correlation_id
        );

        Ok(())
    }
}
