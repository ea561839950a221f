//! Contract topic names.
//!
//! Stable strings shared with every producer and consumer; renaming one
//! is a breaking change to the deployment.

pub const EMBEDDING_CREATE: &str = "embedding.create";
pub const DOCUMENT_QUERY: &str = "document.query";
pub const DOCUMENT_RESPONSE: &str = "document.response";
pub const EMBEDDING_COMPLETE: &str = "embedding.complete";
pub const QUERY_COMPLETE: &str = "query.complete";
pub const ERROR_NOTIFICATION: &str = "error.notification";
pub const LLM_RESPONSE: &str = "llm.response";

/// Every contract topic, used to size the broker stream.
pub fn all() -> Vec<String> {
    [
        EMBEDDING_CREATE,
        DOCUMENT_QUERY,
        DOCUMENT_RESPONSE,
        EMBEDDING_COMPLETE,
        QUERY_COMPLETE,
        ERROR_NOTIFICATION,
        LLM_RESPONSE,
    ]
    .iter()
    .map(|t| t.to_string())
    .collect()
}
