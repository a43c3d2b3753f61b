//! Unified API error handling
//!
//! This module provides a consistent error response format across all API endpoints.

use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use serde::Serialize;
use uuid::Uuid;

use crate::service::PipelineError;
use crate::service::taxonomy::TaxonomyError;

/// Standard error response format
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error type/code
    pub error: String,
    /// Human-readable error message
    pub message: String,
    /// Unique request ID for tracing
    pub request_id: String,
}

/// Unified API error type
///
/// All API endpoints should return `Result<T, ApiError>` for consistent error handling.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ApiError {
    /// Bad request / validation error (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// A pipeline run is already active (409)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),

    /// External service error (502)
    #[error("External service error: {0}")]
    ExternalService(String),
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::ExternalService(_) => StatusCode::BAD_GATEWAY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        let error_type = match self {
            ApiError::BadRequest(_) => "bad_request",
            ApiError::Conflict(_) => "conflict",
            ApiError::Internal(_) => "internal_error",
            ApiError::ExternalService(_) => "external_service_error",
        };

        tracing::error!(
            error_type = error_type,
            status = status.as_u16(),
            message = %self,
            "API error"
        );

        HttpResponse::build(status).json(ErrorResponse {
            error: error_type.to_string(),
            message: self.to_string(),
            request_id: Uuid::new_v4().to_string(),
        })
    }
}

// ============================================================================
// From conversions for service errors
// ============================================================================

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::NoComments => ApiError::BadRequest(err.to_string()),
            PipelineError::RunInProgress => ApiError::Conflict(err.to_string()),
            PipelineError::Taxonomy(TaxonomyError::MissingApiConfiguration(msg)) => {
                ApiError::Internal(format!("Missing API configuration: {}", msg))
            }
            PipelineError::Taxonomy(_)
            | PipelineError::ClaimExtraction(_)
            | PipelineError::Deduplication(_) => ApiError::ExternalService(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_error_status() {
        assert_eq!(
            ApiError::from(PipelineError::NoComments).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(PipelineError::RunInProgress).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::from(PipelineError::Taxonomy(TaxonomyError::UnparsableResponse(
                "eof".to_string()
            )))
            .status_code(),
            StatusCode::BAD_GATEWAY
        );
    }
}
