//! Retrieval result unit and prompt assembly.

use std::collections::HashMap;

use serde_json::Value;

/// Default system message grounding the model in retrieved context.
pub const DEFAULT_SYSTEM_MESSAGE: &str = "You are a helpful assistant that answers questions \
based on the provided document context. When context is provided, ground your answer in it \
and say so when it is insufficient.";

const CONTEXT_DELIMITER: &str =
    "================================================================================";

/// One retrieved document. `similarity_score` is in [0, 1]: 1.0 for an
/// exact/direct lookup, otherwise 1 - distance as reported by the index.
#[derive(Debug, Clone)]
pub struct DocumentContext {
    pub document_id: String,
    pub content: String,
    pub metadata: HashMap<String, Value>,
    pub similarity_score: f32,
}

impl DocumentContext {
    fn filename(&self) -> Option<&str> {
        self.metadata.get("filename").and_then(|v| v.as_str())
    }
}

/// Wrap the user prompt with the grounding template when context
/// documents were retrieved; otherwise pass the prompt through
/// unmodified.
pub fn build_prompt(user_prompt: &str, context: &[DocumentContext]) -> String {
    if context.is_empty() {
        return user_prompt.to_string();
    }

    format!(
        "Based on the following document context, please answer the user's question:\n\n\
         DOCUMENT CONTEXT:\n{}\n\n\
         USER QUESTION:\n{}\n\n\
         Please provide a comprehensive answer based on the document context. If the context \
         doesn't contain enough information to fully answer the question, please mention what \
         additional information might be needed.",
        format_context(context),
        user_prompt
    )
}

/// Numbered, delimited concatenation of each document's content with its
/// id and similarity score, in the retriever's ranking order.
fn format_context(context: &[DocumentContext]) -> String {
    let mut parts = vec![CONTEXT_DELIMITER.to_string()];

    for (i, doc) in context.iter().enumerate() {
        let heading = match doc.filename() {
            Some(filename) => format!(
                "Document {} - {} (ID: {}, Similarity: {:.3}):",
                i + 1,
                filename,
                doc.document_id,
                doc.similarity_score
            ),
            None => format!(
                "Document {} (ID: {}, Similarity: {:.3}):",
                i + 1,
                doc.document_id,
                doc.similarity_score
            ),
        };
        parts.push(format!("{}\n{}", heading, doc.content));
    }

    parts.push(CONTEXT_DELIMITER.to_string());
    parts.join("\n")
}
