//! Error types for claim extraction

use thiserror::Error;

use crate::service::llm::LlmError;

/// Error type for claim extraction
///
/// Any of these aborts the whole extraction pass.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ClaimExtractionError {
    #[error("Text generation failed for comment {comment_index}: {source}")]
    Collaborator {
        comment_index: usize,
        #[source]
        source: LlmError,
    },

    #[error("Claims response for comment {comment_index} could not be parsed: {message}")]
    UnparsableResponse { comment_index: usize, message: String },

    #[error("Failed to serialize taxonomy for the claims prompt: {0}")]
    Serialization(#[from] serde_json::Error),
}
