//! Error types for seatgate
//!
//! Every failure carries a stable code and a human-readable message.
//! Internal errors are logged with full detail and answered generically.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use seatgate_common::api::ErrorResponse;
use serde_json::Value;
use thiserror::Error;
use tracing::error;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Missing or malformed input (400)
    #[error("Invalid request: {0}")]
    Validation(String),

    /// Duplicate identity or already-assigned student (400)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Batch larger than the room's free seats (400)
    #[error("{message}")]
    Capacity {
        message: String,
        available: i64,
        requested: usize,
    },

    /// Seat grid exhausted mid-batch (400); `placed` students keep their seats
    #[error("Not enough seats available")]
    InsufficientSeats { placed: usize, requested: usize },

    /// Undecodable credential scan (400)
    #[error("Invalid QR code format")]
    MalformedCredential,

    /// Room, student or user absent (404)
    #[error("{0}")]
    NotFound(String),

    /// Missing or invalid session token or login (401)
    #[error("{0}")]
    Unauthorized(String),

    /// Authenticated but role not permitted (403)
    #[error("{0}")]
    Forbidden(String),

    /// Anything unclassified (500)
    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Common error: {0}")]
    Common(#[from] seatgate_common::Error),
}

impl ApiError {
    /// Stable machine-checkable code
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Validation(_) => "VALIDATION_ERROR",
            ApiError::Conflict(_) => "CONFLICT",
            ApiError::Capacity { .. } => "CAPACITY_EXCEEDED",
            ApiError::InsufficientSeats { .. } => "INSUFFICIENT_SEATS",
            ApiError::MalformedCredential => "MALFORMED_CREDENTIAL",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::Unauthorized(_) => "UNAUTHORIZED",
            ApiError::Forbidden(_) => "FORBIDDEN",
            ApiError::Internal(_) | ApiError::Database(_) => "INTERNAL_ERROR",
            ApiError::Common(seatgate_common::Error::Auth(_)) => "UNAUTHORIZED",
            ApiError::Common(_) => "INTERNAL_ERROR",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self.code() {
            "VALIDATION_ERROR" | "CONFLICT" | "CAPACITY_EXCEEDED" | "INSUFFICIENT_SEATS"
            | "MALFORMED_CREDENTIAL" => StatusCode::BAD_REQUEST,
            "NOT_FOUND" => StatusCode::NOT_FOUND,
            "UNAUTHORIZED" => StatusCode::UNAUTHORIZED,
            "FORBIDDEN" => StatusCode::FORBIDDEN,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn details(&self) -> Option<Value> {
        match self {
            ApiError::Capacity {
                available,
                requested,
                ..
            } => Some(serde_json::json!({ "available": available, "requested": requested })),
            ApiError::InsufficientSeats { placed, requested } => {
                Some(serde_json::json!({ "placed": placed, "requested": requested }))
            }
            _ => None,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code();

        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!("Internal error: {}", self);
            "Internal server error".to_string()
        } else {
            self.to_string()
        };

        let body = match self.details() {
            Some(details) => ErrorResponse::with_details(code, message, details),
            None => ErrorResponse::new(code, message),
        };

        (status, Json(body)).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(ApiError::Validation("x".into()).status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::Conflict("x".into()).status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ApiError::InsufficientSeats { placed: 2, requested: 3 }.status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(ApiError::NotFound("x".into()).status(), StatusCode::NOT_FOUND);
        assert_eq!(ApiError::Unauthorized("x".into()).status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::Forbidden("x".into()).status(), StatusCode::FORBIDDEN);
        assert_eq!(
            ApiError::Internal("x".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_common_errors_keep_their_kind() {
        let err = ApiError::from(seatgate_common::Error::Auth("expired".into()));
        assert_eq!(err.code(), "UNAUTHORIZED");

        let err = ApiError::from(seatgate_common::Error::Config("bad".into()));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_internal_error_is_masked() {
        let response = ApiError::Internal("secret table name".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"]["code"], "INTERNAL_ERROR");
        assert_eq!(body["error"]["message"], "Internal server error");
    }
}
