//! Retrieval orchestration: context lookup, prompt assembly, and the
//! query-to-response pipeline.

pub mod context;
pub mod orchestrator;
pub mod retriever;

pub use context::{build_prompt, DocumentContext, DEFAULT_SYSTEM_MESSAGE};
pub use orchestrator::{LlmParams, QueryHandler, QueryRequest, QueryType, SearchParams};
pub use retriever::DocumentRetriever;
