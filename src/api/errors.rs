//! API error handling: structured responses with machine-readable codes and
//! request tracking.

use crate::errors::PlaceError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Top-level API error response with request tracking
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub request_id: String,
    pub error: ErrorBody,
}

/// Error body with structured information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Machine-readable code (ROUND_NOT_OPEN, NOT_FOUND, ...)
    pub code: String,
    /// Human-readable error message
    pub message: String,
}

/// API error types with request tracking
#[derive(Debug)]
pub struct ApiError {
    pub kind: ApiErrorKind,
    pub request_id: String,
}

#[derive(Debug)]
pub enum ApiErrorKind {
    NotFound(String),
    BadRequest(String),
    /// Placement rejection: carries the rejection's own reason code.
    Rejected(PlaceError),
    InternalError(String),
}

impl ApiError {
    pub fn not_found(request_id: String, message: String) -> Self {
        Self { kind: ApiErrorKind::NotFound(message), request_id }
    }

    pub fn bad_request(request_id: String, message: String) -> Self {
        Self { kind: ApiErrorKind::BadRequest(message), request_id }
    }

    pub fn rejected(request_id: String, reason: PlaceError) -> Self {
        Self { kind: ApiErrorKind::Rejected(reason), request_id }
    }

    pub fn internal_error(request_id: String, message: String) -> Self {
        Self { kind: ApiErrorKind::InternalError(message), request_id }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ApiErrorKind::NotFound(msg) => write!(f, "[{}] Not Found: {}", self.request_id, msg),
            ApiErrorKind::BadRequest(msg) => write!(f, "[{}] Bad Request: {}", self.request_id, msg),
            ApiErrorKind::Rejected(reason) => {
                write!(f, "[{}] Rejected: {}", self.request_id, reason)
            }
            ApiErrorKind::InternalError(msg) => {
                write!(f, "[{}] Internal Error: {}", self.request_id, msg)
            }
        }
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self.kind {
            ApiErrorKind::NotFound(msg) => {
                (StatusCode::NOT_FOUND, "NOT_FOUND".to_string(), msg.clone())
            }
            ApiErrorKind::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, "BAD_REQUEST".to_string(), msg.clone())
            }
            ApiErrorKind::Rejected(reason) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                reason.code().to_string(),
                reason.to_string(),
            ),
            ApiErrorKind::InternalError(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR".to_string(),
                msg.clone(),
            ),
        };

        let body = Json(ErrorResponse {
            request_id: self.request_id.clone(),
            error: ErrorBody { code, message },
        });

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejection_carries_reason_code() {
        let err = ApiError::rejected("req-1".to_string(), PlaceError::RoundNotOpen);
        assert!(err.to_string().contains("req-1"));
        match err.kind {
            ApiErrorKind::Rejected(reason) => assert_eq!(reason.code(), "ROUND_NOT_OPEN"),
            _ => panic!("expected rejection"),
        }
    }
}
