//! Topic dispatcher and handler execution bridge.
//!
//! Maps topic name to a handler capability and invokes it per message.
//! Handlers come in two execution disciplines, tagged once at
//! registration: suspending handlers run under the cooperative scheduler
//! and are awaited; blocking handlers run to completion on a worker
//! thread so the consume loop's task is never pinned by CPU-bound work.
//!
//! Handlers never return a value the dispatcher consumes. Success or
//! failure is observed only through logging and through any events the
//! handler itself publishes; there is no dispatcher-level retry or
//! dead-letter routing.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::events::EventMessage;

/// Broker record headers as seen by handlers, flattened to strings.
pub type RecordHeaders = HashMap<String, String>;

/// Error taxonomy for handler failures. Every variant is contained at
/// the handler boundary and funneled into one error-logging path.
#[derive(Debug)]
pub enum HandlerError {
    /// Required payload fields missing or malformed. The handler
    /// returns without side effects.
    Validation(String),
    /// Index unavailable. Non-fatal upstream; recorded for visibility.
    Retrieval(String),
    /// LLM call failed. Aborts that message's pipeline, no publish.
    Generation(String),
    /// Ingest step failed, no partial index write.
    Ingest(String),
    /// Re-publishing the handler's own output failed.
    Publish(String),
}

impl fmt::Display for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandlerError::Validation(msg) => write!(f, "validation error: {}", msg),
            HandlerError::Retrieval(msg) => write!(f, "retrieval error: {}", msg),
            HandlerError::Generation(msg) => write!(f, "generation error: {}", msg),
            HandlerError::Ingest(msg) => write!(f, "ingest error: {}", msg),
            HandlerError::Publish(msg) => write!(f, "publish error: {}", msg),
        }
    }
}

impl std::error::Error for HandlerError {}

/// Handler that may yield control while awaiting I/O (downloads, model
/// calls). The bridge awaits completion before the message counts as
/// handled.
#[async_trait::async_trait]
pub trait SuspendingHandler: Send + Sync {
    async fn handle(
        &self,
        topic: &str,
        envelope: &EventMessage,
        headers: &RecordHeaders,
    ) -> Result<(), HandlerError>;
}

/// Handler that runs to completion without yielding. The bridge executes
/// it on a worker thread, off the polling task.
pub trait BlockingHandler: Send + Sync {
    fn handle(
        &self,
        topic: &str,
        envelope: &EventMessage,
        headers: &RecordHeaders,
    ) -> Result<(), HandlerError>;
}

/// A registered handler with its execution-discipline tag. The tag is
/// inspected once at registration, not per message.
#[derive(Clone)]
pub enum TopicHandler {
    Suspending(Arc<dyn SuspendingHandler>),
    Blocking(Arc<dyn BlockingHandler>),
}

/// Process-wide topic registry, built once at startup and read-only
/// during consumption (registration happens before `subscribe` starts
/// the consume loop, so no locking is needed).
#[derive(Default)]
pub struct TopicDispatcher {
    handlers: HashMap<String, TopicHandler>,
}

impl TopicDispatcher {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register a handler for a topic. One handler per topic; the last
    /// registration wins.
    pub fn register(&mut self, topic: &str, handler: TopicHandler) {
        self.handlers.insert(topic.to_string(), handler);
    }

    pub fn has_handler(&self, topic: &str) -> bool {
        self.handlers.contains_key(topic)
    }

    /// Dispatch one message to its topic handler.
    ///
    /// Unknown topics are logged and discarded, not errors: during a
    /// rolling deployment producers may outpace consumer handler
    /// registration. Handler failures of either discipline land in the
    /// single error-logging path with the message's correlation id; an
    /// error never escapes to the consume loop.
    pub async fn handle(&self, topic: &str, envelope: EventMessage, headers: RecordHeaders) {
        let handler = match self.handlers.get(topic) {
            Some(handler) => handler,
            None => {
                tracing::debug!(
                    "No handler registered for topic '{}', discarding message {}",
                    topic,
                    envelope.message_id
                );
                return;
            }
        };

        let correlation_id = envelope.metadata.correlation_id;

        // Either discipline runs on its own task so a panicking handler
        // surfaces as a join error here instead of unwinding into the
        // consume loop.
        let joined = match handler {
            TopicHandler::Suspending(handler) => {
                let handler = Arc::clone(handler);
                let topic_owned = topic.to_string();
                tokio::spawn(async move { handler.handle(&topic_owned, &envelope, &headers).await })
                    .await
            }
            TopicHandler::Blocking(handler) => {
                let handler = Arc::clone(handler);
                let topic_owned = topic.to_string();
                tokio::task::spawn_blocking(move || {
                    handler.handle(&topic_owned, &envelope, &headers)
                })
                .await
            }
        };

        match joined {
            Ok(Ok(())) => {}
            Ok(Err(e)) => log_handler_error(topic, &correlation_id.to_string(), &e),
            Err(e) => {
                tracing::error!(
                    "Handler for '{}' aborted (correlation {}): {}",
                    topic,
                    correlation_id,
                    e
                );
            }
        }
    }
}

fn log_handler_error(topic: &str, correlation_id: &str, error: &HandlerError) {
    tracing::error!(
        "Handler for '{}' failed (correlation {}): {}",
        topic,
        correlation_id,
        error
    );
}
