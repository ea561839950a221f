//! JetStream broker client.
//!
//! Owns the producer connection, publishes envelopes with
//! duplicate-suppressed acknowledged delivery, and runs the consume loop
//! for a durable consumer group. Publishing is safe from any task; the
//! underlying connection serializes concurrent sends.

use std::collections::HashMap;
use std::fmt;

use async_nats::jetstream;
use async_nats::jetstream::consumer::pull;
use async_nats::jetstream::consumer::AckPolicy;
use futures::StreamExt;

use crate::broker::dispatcher::{RecordHeaders, TopicDispatcher};
use crate::config::BrokerConfig;
use crate::events::{topics, EventMessage};

/// Error taxonomy for broker operations.
///
/// `Connection` is fatal to the component instance and is surfaced to
/// the process supervisor; `Publish` is recoverable and retrying is the
/// caller's choice.
#[derive(Debug)]
pub enum BrokerError {
    Connection(String),
    Publish(String),
    Consume(String),
}

impl fmt::Display for BrokerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BrokerError::Connection(msg) => write!(f, "broker connection error: {}", msg),
            BrokerError::Publish(msg) => write!(f, "publish error: {}", msg),
            BrokerError::Consume(msg) => write!(f, "consume error: {}", msg),
        }
    }
}

impl std::error::Error for BrokerError {}

/// Broker-side coordinates of an acknowledged publish.
#[derive(Debug, Clone)]
pub struct DeliveryReceipt {
    pub stream: String,
    pub sequence: u64,
    /// True when the broker suppressed the record as a duplicate of an
    /// earlier send with the same message id.
    pub duplicate: bool,
}

/// Publishing seam for components that emit events.
///
/// Implemented by [`BrokerClient`]; tests substitute a recording
/// implementation.
#[async_trait::async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(
        &self,
        topic: &str,
        message: &EventMessage,
        key: Option<&str>,
    ) -> Result<DeliveryReceipt, BrokerError>;
}

/// Long-lived broker client shared by every publishing call site.
///
/// Constructed once at startup and passed explicitly to the components
/// that need it; there is no ambient global instance.
pub struct BrokerClient {
    client: async_nats::Client,
    jetstream: jetstream::Context,
    config: BrokerConfig,
}

impl BrokerClient {
    /// Connect the producer and make sure the contract stream exists.
    ///
    /// The stream is created with a duplicate-suppression window so a
    /// retried send carrying the same message id cannot create a second
    /// record. Callers must not publish before this succeeds.
    pub async fn connect(config: BrokerConfig) -> Result<Self, BrokerError> {
        let mut options = async_nats::ConnectOptions::new().name(&config.client_id);

        if let Some(tls) = &config.tls {
            options = options
                .require_tls(true)
                .add_root_certificates(tls.ca.clone());
            if let (Some(cert), Some(key)) = (&tls.cert, &tls.key) {
                options = options.add_client_certificate(cert.clone(), key.clone());
            }
        }

        let client = options
            .connect(config.servers.as_str())
            .await
            .map_err(|e| BrokerError::Connection(format!("{}: {}", config.servers, e)))?;
        tracing::info!("Connected to broker at {}", config.servers);

        let jetstream = jetstream::new(client.clone());

        let _stream = jetstream
            .get_or_create_stream(jetstream::stream::Config {
                name: config.stream_name.clone(),
                subjects: topics::all(),
                max_age: config.max_age,
                max_bytes: config.max_bytes,
                duplicate_window: config.duplicate_window,
                storage: jetstream::stream::StorageType::File,
                num_replicas: 1,
                ..Default::default()
            })
            .await
            .map_err(|e| BrokerError::Connection(e.to_string()))?;

        tracing::info!("Event stream '{}' ready", config.stream_name);

        Ok(Self {
            client,
            jetstream,
            config,
        })
    }

    /// Service identifier stamped on envelopes created by this client.
    pub fn service_name(&self) -> &str {
        &self.config.service_name
    }

    /// Create an envelope originating from this service.
    pub fn create_message(
        &self,
        event_type: &str,
        payload: serde_json::Value,
        destination: Option<String>,
    ) -> EventMessage {
        EventMessage::new(&self.config.service_name, event_type, payload, destination)
    }

    /// Publish an envelope to a topic and wait for the broker ack.
    ///
    /// Headers duplicate `event-type`, `source` and `timestamp` from the
    /// envelope for broker-side filtering without full deserialization.
    /// The message id doubles as the duplicate-suppression id; `key`
    /// (message id if absent) rides along so downstream consumers can
    /// shard causally related messages together.
    ///
    /// Blocks until acknowledged or the configured timeout elapses. Does
    /// not retry internally.
    pub async fn publish(
        &self,
        topic: &str,
        message: &EventMessage,
        key: Option<&str>,
    ) -> Result<DeliveryReceipt, BrokerError> {
        let payload = serde_json::to_vec(message)
            .map_err(|e| BrokerError::Publish(format!("envelope serialization failed: {}", e)))?;

        let message_id = message.message_id.to_string();
        let timestamp = message.timestamp.to_rfc3339();

        let mut headers = async_nats::HeaderMap::new();
        headers.insert("event-type", message.event_type.as_str());
        headers.insert("source", message.source.as_str());
        headers.insert("timestamp", timestamp.as_str());
        headers.insert("message-key", key.unwrap_or(message_id.as_str()));
        // Duplicate-suppression id: retried sends land on the same record.
        headers.insert("Nats-Msg-Id", message_id.as_str());

        let ack_future = self
            .jetstream
            .publish_with_headers(topic.to_string(), headers, payload.into())
            .await
            .map_err(|e| BrokerError::Publish(e.to_string()))?;

        let ack = tokio::time::timeout(self.config.publish_timeout, ack_future)
            .await
            .map_err(|_| {
                BrokerError::Publish(format!(
                    "no broker acknowledgment within {:?}",
                    self.config.publish_timeout
                ))
            })?
            .map_err(|e| BrokerError::Publish(e.to_string()))?;

        tracing::debug!(
            "Published message {} to {} (stream {}, seq {})",
            message_id,
            topic,
            ack.stream,
            ack.sequence
        );

        Ok(DeliveryReceipt {
            stream: ack.stream,
            sequence: ack.sequence,
            duplicate: ack.duplicate,
        })
    }

    /// Join a consumer group and run the consume loop.
    ///
    /// This is the component's only blocking operation: it runs for the
    /// process lifetime unless the broker connection is lost, which is
    /// fatal to this subscription - the process supervisor restarts, the
    /// client does not self-heal.
    ///
    /// Per record: decode the envelope (a malformed body is logged,
    /// acked and skipped - never a crash), extract headers, hand off to
    /// the dispatcher, then ack. Acking only after the dispatcher
    /// returns gives at-least-once processing; a crash between delivery
    /// and ack causes redelivery, so handlers must be idempotent.
    pub async fn subscribe(
        &self,
        topics: &[&str],
        group_id: &str,
        dispatcher: &TopicDispatcher,
    ) -> Result<(), BrokerError> {
        let stream = self
            .jetstream
            .get_stream(&self.config.stream_name)
            .await
            .map_err(|e| BrokerError::Connection(e.to_string()))?;

        let consumer = stream
            .get_or_create_consumer(
                group_id,
                pull::Config {
                    durable_name: Some(group_id.to_string()),
                    ack_policy: AckPolicy::Explicit,
                    filter_subjects: topics.iter().map(|t| t.to_string()).collect(),
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| BrokerError::Connection(e.to_string()))?;

        tracing::info!("Subscribed to topics {:?} as consumer group '{}'", topics, group_id);

        let mut messages = consumer
            .messages()
            .await
            .map_err(|e| BrokerError::Connection(e.to_string()))?;

        while let Some(record) = messages.next().await {
            let record = match record {
                Ok(record) => record,
                // Losing the broker mid-consumption terminates the loop.
                Err(e) => return Err(BrokerError::Consume(e.to_string())),
            };

            let topic = record.subject.to_string();
            let headers = extract_headers(record.headers.as_ref());

            let envelope = match decode_envelope(&topic, &record.payload) {
                Some(envelope) => envelope,
                None => {
                    if let Err(e) = record.ack().await {
                        tracing::error!("Failed to ack dropped message on {}: {}", topic, e);
                    }
                    continue;
                }
            };

            dispatcher.handle(&topic, envelope, headers).await;

            if let Err(e) = record.ack().await {
                tracing::error!("Failed to ack message on {}: {}", topic, e);
            }
        }

        Ok(())
    }

    /// Check whether the broker connection is active.
    pub fn is_connected(&self) -> bool {
        self.client.connection_state() == async_nats::connection::State::Connected
    }

    /// Release producer resources.
    ///
    /// Flushes buffered publishes, then the connection drops with the
    /// client. Consumer resources live inside each `subscribe` future
    /// and are released when its task ends or is aborted, so callers
    /// stop their subscription tasks before disconnecting. Safe to call
    /// even if nothing was ever published or subscribed.
    pub async fn disconnect(&self) {
        if let Err(e) = self.client.flush().await {
            tracing::warn!("Flush on disconnect failed: {}", e);
        }
        tracing::info!("Broker client disconnected");
    }
}

#[async_trait::async_trait]
impl EventPublisher for BrokerClient {
    async fn publish(
        &self,
        topic: &str,
        message: &EventMessage,
        key: Option<&str>,
    ) -> Result<DeliveryReceipt, BrokerError> {
        BrokerClient::publish(self, topic, message, key).await
    }
}

/// Decode a consumed record body into an envelope. A malformed body is
/// logged and dropped, never propagated: the consume loop acks it and
/// moves on to the next record.
fn decode_envelope(topic: &str, payload: &[u8]) -> Option<EventMessage> {
    match serde_json::from_slice(payload) {
        Ok(envelope) => Some(envelope),
        Err(e) => {
            tracing::error!("Dropping malformed envelope on {}: {}", topic, e);
            None
        }
    }
}

/// Flatten broker record headers into the handler-facing map. Repeated
/// header names keep the first value.
fn extract_headers(headers: Option<&async_nats::HeaderMap>) -> RecordHeaders {
    let mut map = HashMap::new();
    if let Some(headers) = headers {
        for (name, values) in headers.iter() {
            if let Some(value) = values.first() {
                map.insert(name.to_string(), value.to_string());
            }
        }
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::dispatcher::{HandlerError, SuspendingHandler, TopicHandler};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_decode_envelope_rejects_malformed_body() {
        assert!(decode_envelope("document.query", b"{not json").is_none());
        assert!(decode_envelope("document.query", b"{\"messageId\": 1}").is_none());

        let valid = EventMessage::new("svc", "document.query", json!({}), None);
        let body = serde_json::to_vec(&valid).unwrap();
        let decoded = decode_envelope("document.query", &body).unwrap();
        assert_eq!(decoded.message_id, valid.message_id);
    }

    struct CountingHandler {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait::async_trait]
    impl SuspendingHandler for CountingHandler {
        async fn handle(
            &self,
            _topic: &str,
            _envelope: &EventMessage,
            _headers: &RecordHeaders,
        ) -> Result<(), HandlerError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_malformed_body_is_skipped_and_later_valid_body_dispatches() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut dispatcher = TopicDispatcher::new();
        dispatcher.register(
            "document.query",
            TopicHandler::Suspending(Arc::new(CountingHandler {
                calls: Arc::clone(&calls),
            })),
        );

        let valid = EventMessage::new("svc", "document.query", json!({"user_prompt": "q"}), None);
        let bodies: Vec<Vec<u8>> = vec![
            b"not an envelope at all".to_vec(),
            serde_json::to_vec(&valid).unwrap(),
        ];

        // The consume loop's per-record path: decode, skip on failure,
        // dispatch on success.
        for body in &bodies {
            if let Some(envelope) = decode_envelope("document.query", body) {
                dispatcher
                    .handle("document.query", envelope, RecordHeaders::new())
                    .await;
            }
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_extract_headers_flattens_first_value() {
        let mut headers = async_nats::HeaderMap::new();
        headers.insert("event-type", "document.query");
        headers.insert("source", "node-api");

        let map = extract_headers(Some(&headers));

        assert_eq!(map.get("event-type").map(String::as_str), Some("document.query"));
        assert_eq!(map.get("source").map(String::as_str), Some("node-api"));
    }

    #[test]
    fn test_extract_headers_handles_absent_headers() {
        let map = extract_headers(None);
        assert!(map.is_empty());
    }

    #[test]
    fn test_broker_error_display() {
        let e = BrokerError::Publish("timed out".to_string());
        assert_eq!(e.to_string(), "publish error: timed out");
    }
}
