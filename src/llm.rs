//! Language-model capability interface and the OpenAI-compatible client.
//!
//! The model itself is an external service; this module defines the
//! `complete` capability plus an HTTP client for any provider exposing
//! the OpenAI chat-completions and embeddings endpoints.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::LlmConfig;
use crate::index::{Embedder, IndexError};

#[derive(Debug)]
pub enum LlmError {
    /// The request never produced a usable HTTP response.
    Request(String),
    /// The provider answered with an error status.
    Provider(String),
    /// The provider's body did not match the expected shape.
    Malformed(String),
}

impl fmt::Display for LlmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LlmError::Request(msg) => write!(f, "llm request failed: {}", msg),
            LlmError::Provider(msg) => write!(f, "llm provider error: {}", msg),
            LlmError::Malformed(msg) => write!(f, "malformed llm response: {}", msg),
        }
    }
}

impl std::error::Error for LlmError {}

/// Why generation stopped. Providers may report reasons beyond the
/// well-known set; those are preserved verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinishReason {
    Stop,
    Length,
    Error,
    Other(String),
}

impl FinishReason {
    pub fn from_provider(reason: &str) -> Self {
        match reason {
            "stop" => FinishReason::Stop,
            "length" => FinishReason::Length,
            "error" => FinishReason::Error,
            other => FinishReason::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            FinishReason::Stop => "stop",
            FinishReason::Length => "length",
            FinishReason::Error => "error",
            FinishReason::Other(reason) => reason,
        }
    }
}

/// One completed generation. Converted into an `llm.response` envelope
/// for publication and then discarded.
#[derive(Debug, Clone)]
pub struct GenerationResult {
    pub content: String,
    /// Model identifier as reported by the provider.
    pub model: String,
    /// Token accounting, opaque to this service.
    pub usage: Value,
    pub finish_reason: FinishReason,
}

/// Language-model capability.
#[async_trait::async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(
        &self,
        prompt: &str,
        system: &str,
        max_tokens: u32,
        temperature: f32,
    ) -> Result<GenerationResult, LlmError>;
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    model: String,
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Value,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest {
    model: String,
    input: String,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

/// HTTP client for an OpenAI-compatible provider. Also serves as the
/// embedding capability against the provider's embeddings endpoint.
pub struct OpenAiChatModel {
    http: reqwest::Client,
    config: LlmConfig,
}

impl OpenAiChatModel {
    pub fn new(config: LlmConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.config.api_key.is_empty()
    }
}

#[async_trait::async_trait]
impl LanguageModel for OpenAiChatModel {
    async fn complete(
        &self,
        prompt: &str,
        system: &str,
        max_tokens: u32,
        temperature: f32,
    ) -> Result<GenerationResult, LlmError> {
        let request = ChatCompletionRequest {
            model: self.config.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: system.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: prompt.to_string(),
                },
            ],
            max_tokens,
            temperature,
        };

        tracing::info!("Sending completion request to model {}", self.config.model);

        let response = self
            .http
            .post(format!("{}/chat/completions", self.config.api_url))
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| LlmError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Provider(format!("{}: {}", status, body)));
        }

        let body: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Malformed(e.to_string()))?;

        let choice = body
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::Malformed("response carried no choices".to_string()))?;

        Ok(GenerationResult {
            content: choice.message.content.unwrap_or_default(),
            model: body.model,
            usage: body.usage,
            finish_reason: choice
                .finish_reason
                .as_deref()
                .map(FinishReason::from_provider)
                .unwrap_or(FinishReason::Stop),
        })
    }
}

#[async_trait::async_trait]
impl Embedder for OpenAiChatModel {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, IndexError> {
        let request = EmbeddingRequest {
            model: self.config.embedding_model.clone(),
            input: text.to_string(),
        };

        let response = self
            .http
            .post(format!("{}/embeddings", self.config.api_url))
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| IndexError::Unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(IndexError::Unavailable(format!("{}: {}", status, body)));
        }

        let body: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| IndexError::Malformed(e.to_string()))?;

        body.data
            .into_iter()
            .next()
            .map(|data| data.embedding)
            .ok_or_else(|| IndexError::Malformed("response carried no embedding".to_string()))
    }
}
