//! Centralized error types for the Ensemble core library.
//!
//! This module provides a unified error handling system that:
//! - Defines structured error types using `thiserror`
//! - Maps errors to appropriate HTTP status codes
//! - Implements `IntoResponse` for automatic JSON error responses

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

/// Application-wide error type for the Ensemble server.
#[derive(Debug, Error, Serialize)]
#[serde(tag = "type", content = "details")]
pub enum EnsembleError {
    /// Malformed input rejected at a boundary (bad video id, bad message).
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Identity token rejected, or a guest issued a host-only command.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Requested track is unknown or its identifier is invalid.
    #[error("Track not found: {0}")]
    TrackNotFound(String),

    /// External audio extraction failed or timed out.
    #[error("Extraction failed for {video_id}: {cause}")]
    Extraction { video_id: String, cause: String },

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl EnsembleError {
    /// Returns a machine-readable error code for API responses.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_failed",
            Self::Unauthorized(_) => "unauthorized",
            Self::TrackNotFound(_) => "track_not_found",
            Self::Extraction { .. } => "extraction_failed",
            Self::Internal(_) => "internal_error",
        }
    }

    /// Maps the error to an appropriate HTTP status code.
    ///
    /// Extraction failures map to 502: the failing party is the external
    /// extraction utility, not this server.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::TrackNotFound(_) => StatusCode::NOT_FOUND,
            Self::Extraction { .. } => StatusCode::BAD_GATEWAY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Convenient Result alias for application-wide operations.
pub type EnsembleResult<T> = Result<T, EnsembleError>;

/// JSON response body for error responses.
#[derive(Serialize)]
struct ErrorResponse {
    error: &'static str,
    message: String,
    status: u16,
}

impl IntoResponse for EnsembleError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: self.code(),
            message: self.to_string(),
            status: status.as_u16(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_returns_correct_code() {
        let err = EnsembleError::Validation("bad id".into());
        assert_eq!(err.code(), "validation_failed");
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn extraction_error_maps_to_bad_gateway() {
        let err = EnsembleError::Extraction {
            video_id: "abc12345678".into(),
            cause: "timeout".into(),
        };
        assert_eq!(err.code(), "extraction_failed");
        assert_eq!(err.status_code(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn track_not_found_maps_to_404() {
        let err = EnsembleError::TrackNotFound("abc12345678".into());
        assert_eq!(err.code(), "track_not_found");
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn unauthorized_maps_to_401() {
        let err = EnsembleError::Unauthorized("bad token".into());
        assert_eq!(err.status_code(), StatusCode::UNAUTHORIZED);
    }
}
