//! # Ragbus: Event-Driven Retrieval-Augmented Generation
//!
//! Ragbus ingests events from a message broker, routes them to
//! topic-specific handlers, and answers document queries with a
//! retrieval-augmented generation pipeline: resolve document context,
//! assemble a grounded prompt, invoke a language model, and publish the
//! result as a new event.
//!
//! ## Components
//!
//! - **Event envelope** ([`events`]): the message schema shared by
//!   producer and consumer, with correlation-id propagation across a
//!   causal chain of events.
//! - **Broker client** ([`broker::client`]): owns the producer
//!   connection, publishes envelopes with duplicate-suppressed
//!   acknowledged delivery, and runs the consume loop for a durable
//!   consumer group.
//! - **Topic dispatcher** ([`broker::dispatcher`]): maps topic to
//!   handler and bridges the two handler execution disciplines
//!   (suspending vs. blocking) without stalling the consume loop.
//! - **Retrieval orchestration** ([`retrieval`]): turns a
//!   `document.query` event into a context-bounded prompt with
//!   deterministic ranking and threshold filtering, then publishes the
//!   generated `llm.response`.
//! - **Embedding ingest** ([`ingest`]): fetches a document, extracts
//!   text, embeds it, and upserts it into the index.
//!
//! The broker, the vector index, and the language model are external
//! services consumed behind capability traits ([`index`], [`llm`]).

pub mod broker;
pub mod config;
pub mod events;
pub mod index;
pub mod ingest;
pub mod llm;
pub mod retrieval;

// Re-export key types
pub use broker::{
    BlockingHandler, BrokerClient, BrokerError, DeliveryReceipt, EventPublisher, HandlerError,
    RecordHeaders, SuspendingHandler, TopicDispatcher, TopicHandler,
};
pub use config::{BrokerConfig, LlmConfig, TlsConfig};
pub use events::{topics, EventMessage, Metadata, Priority};
pub use index::{Embedder, IndexError, MemoryIndex, SearchHit, StoredDocument, VectorIndex};
pub use ingest::{DocumentFetcher, HttpFetcher, IngestHandler, PlainTextExtractor, TextExtractor};
pub use llm::{FinishReason, GenerationResult, LanguageModel, LlmError, OpenAiChatModel};
pub use retrieval::{DocumentContext, DocumentRetriever, QueryHandler};
