//! Event envelope shared by every producer and consumer.
//!
//! Wraps a business payload with routing and trace metadata. Wire field
//! names are part of the broker contract and must not change.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Envelope schema version, constant until the schema changes.
pub const ENVELOPE_VERSION: &str = "1.0";

/// Advisory delivery priority. Not enforced by ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Normal,
    High,
    Low,
}

/// Trace metadata carried by every envelope.
///
/// `correlation_id` is stable across a causal chain of related events:
/// a query's response must carry the query's correlation id so a
/// consumer can join request and response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    pub correlation_id: Uuid,

    /// Incremented by redelivery logic. Currently always 0; kept for
    /// forward compatibility.
    #[serde(default)]
    pub retry_count: u32,

    pub priority: Priority,
}

/// The wire/application envelope for a single business event.
///
/// Created transiently per publish/consume cycle and never persisted
/// by this service; the broker is the durability layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventMessage {
    /// Globally unique, generated at creation, never reused.
    pub message_id: Uuid,

    /// Creation time, UTC.
    pub timestamp: DateTime<Utc>,

    /// Producing service identifier (static per deployment).
    pub source: String,

    /// Optional logical target service. Informational only, never used
    /// for routing.
    pub destination: Option<String>,

    /// Business event tag, e.g. `"document.query"`.
    pub event_type: String,

    pub version: String,

    /// Event-type-specific structured data.
    pub payload: Value,

    pub metadata: Metadata,
}

impl EventMessage {
    /// Create a new envelope with a fresh message id and correlation id.
    pub fn new(
        source: &str,
        event_type: &str,
        payload: Value,
        destination: Option<String>,
    ) -> Self {
        Self {
            message_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source: source.to_string(),
            destination,
            event_type: event_type.to_string(),
            version: ENVELOPE_VERSION.to_string(),
            payload,
            metadata: Metadata {
                correlation_id: Uuid::new_v4(),
                retry_count: 0,
                priority: Priority::Normal,
            },
        }
    }

    /// Create a response envelope for this message.
    ///
    /// The reply gets a fresh message id but inherits this message's
    /// correlation id, and is addressed back at the producing service.
    pub fn reply(&self, source: &str, event_type: &str, payload: Value) -> Self {
        let mut reply = Self::new(source, event_type, payload, Some(self.source.clone()));
        reply.metadata.correlation_id = self.metadata.correlation_id;
        reply
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wire_field_names() {
        let message = EventMessage::new(
            "python-ai",
            "document.query",
            json!({"user_prompt": "hello"}),
            Some("node-api".to_string()),
        );

        let wire = serde_json::to_value(&message).unwrap();

        assert!(wire.get("messageId").is_some());
        assert!(wire.get("eventType").is_some());
        assert!(wire.get("timestamp").is_some());
        assert_eq!(wire["source"], "python-ai");
        assert_eq!(wire["destination"], "node-api");
        assert_eq!(wire["version"], ENVELOPE_VERSION);
        assert!(wire["metadata"].get("correlationId").is_some());
        assert_eq!(wire["metadata"]["retryCount"], 0);
        assert_eq!(wire["metadata"]["priority"], "normal");
    }

    #[test]
    fn test_round_trip() {
        let message = EventMessage::new("svc", "embedding.create", json!({"url": "x"}), None);

        let bytes = serde_json::to_vec(&message).unwrap();
        let decoded: EventMessage = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(decoded.message_id, message.message_id);
        assert_eq!(decoded.event_type, message.event_type);
        assert_eq!(decoded.metadata.correlation_id, message.metadata.correlation_id);
        assert_eq!(decoded.payload, message.payload);
    }

    #[test]
    fn test_reply_inherits_correlation_id() {
        let query = EventMessage::new("node-api", "document.query", json!({}), None);
        let response = query.reply("python-ai", "llm.response", json!({"response": "ok"}));

        assert_eq!(response.metadata.correlation_id, query.metadata.correlation_id);
        assert_ne!(response.message_id, query.message_id);
        assert_eq!(response.destination.as_deref(), Some("node-api"));
        assert_eq!(response.source, "python-ai");
        assert_eq!(response.event_type, "llm.response");
    }

    #[test]
    fn test_retry_count_defaults_when_absent() {
        let wire = json!({
            "messageId": Uuid::new_v4(),
            "timestamp": Utc::now(),
            "source": "svc",
            "destination": null,
            "eventType": "document.query",
            "version": "1.0",
            "payload": {},
            "metadata": {
                "correlationId": Uuid::new_v4(),
                "priority": "high"
            }
        });

        let decoded: EventMessage = serde_json::from_value(wire).unwrap();
        assert_eq!(decoded.metadata.retry_count, 0);
        assert_eq!(decoded.metadata.priority, Priority::High);
    }
}
