//! Error types for claim deduplication

use thiserror::Error;

use crate::service::llm::LlmError;

/// Fatal deduplication failures
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DeduplicationError {
    #[error("Text generation failed for {topic}/{subtopic}: {source}")]
    Collaborator {
        topic: String,
        subtopic: String,
        #[source]
        source: LlmError,
    },

    #[error("Deduplication response for {topic}/{subtopic} could not be parsed: {message}")]
    UnparsableResponse {
        topic: String,
        subtopic: String,
        message: String,
    },
}

/// Recoverable problems in a returned nesting; the offending reference is skipped
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NestingError {
    #[error("Malformed reference '{reference}' under '{key}': {reason}")]
    MalformedIndexReference {
        key: String,
        reference: String,
        reason: &'static str,
    },
}
