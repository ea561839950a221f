//! Environment-sourced service configuration.
//!
//! Every knob comes from the environment (optionally via a `.env` file
//! loaded by the binary), with the same defaults the deployment manifests
//! assume.

use std::path::PathBuf;
use std::time::Duration;

/// TLS material for the broker connection. Presence of the CA enables
/// TLS with hostname verification; the client certificate pair is only
/// used when both halves are present.
#[derive(Debug, Clone)]
pub struct TlsConfig {
    pub ca: PathBuf,
    pub cert: Option<PathBuf>,
    pub key: Option<PathBuf>,
}

impl TlsConfig {
    /// Read TLS material from `BROKER_CA` / `BROKER_CERT` / `BROKER_KEY`.
    /// Returns `None` when no CA is configured.
    pub fn from_env() -> Option<Self> {
        let ca = std::env::var("BROKER_CA").ok()?;
        Some(Self {
            ca: PathBuf::from(ca),
            cert: std::env::var("BROKER_CERT").ok().map(PathBuf::from),
            key: std::env::var("BROKER_KEY").ok().map(PathBuf::from),
        })
    }
}

/// Broker connection and stream settings.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// Comma-separated broker address list.
    pub servers: String,

    /// Client identifier reported to the broker.
    pub client_id: String,

    /// Producing service identifier stamped on every envelope.
    pub service_name: String,

    /// Name of the stream holding the contract topics.
    pub stream_name: String,

    pub max_age: Duration,
    pub max_bytes: i64,

    /// Window in which retried sends with the same message id are
    /// suppressed as duplicates.
    pub duplicate_window: Duration,

    /// Bound on waiting for a publish acknowledgment.
    pub publish_timeout: Duration,

    pub tls: Option<TlsConfig>,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            servers: std::env::var("BROKER_URL")
                .unwrap_or_else(|_| "nats://localhost:4222".to_string()),
            client_id: std::env::var("BROKER_CLIENT_ID")
                .unwrap_or_else(|_| "default-client".to_string()),
            service_name: std::env::var("SERVICE_NAME")
                .unwrap_or_else(|_| "ragbus".to_string()),
            stream_name: std::env::var("EVENT_STREAM")
                .unwrap_or_else(|_| "EVENTS".to_string()),
            max_age: Duration::from_secs(24 * 60 * 60), // 24 hours
            max_bytes: 1024 * 1024 * 1024,              // 1GB
            duplicate_window: Duration::from_secs(2 * 60),
            publish_timeout: Duration::from_secs(30),
            tls: TlsConfig::from_env(),
        }
    }
}

/// Language-model provider settings (OpenAI-compatible API).
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// Base URL of the provider, e.g. `https://api.openai.com/v1`.
    pub api_url: String,
    pub api_key: String,
    pub model: String,
    pub embedding_model: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_url: std::env::var("LLM_API_URL")
                .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
            api_key: std::env::var("LLM_API_KEY").unwrap_or_default(),
            model: std::env::var("LLM_MODEL")
                .unwrap_or_else(|_| "gpt-3.5-turbo".to_string()),
            embedding_model: std::env::var("LLM_EMBEDDING_MODEL")
                .unwrap_or_else(|_| "text-embedding-3-small".to_string()),
        }
    }
}
