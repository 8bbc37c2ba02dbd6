//! Shared API request/response types

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ========================================
// Error Response Types
// ========================================

/// Error envelope returned by every failing endpoint
///
/// # Examples
///
/// ```
/// use seatgate_common::api::types::ErrorResponse;
///
/// let error = ErrorResponse::new("NOT_FOUND", "Room not found");
/// assert_eq!(error.error.code, "NOT_FOUND");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

/// Stable machine-checkable code plus human-readable message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Error type identifier
    pub code: String,
    /// Human-readable error message
    pub message: String,
    /// Additional error details (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl ErrorResponse {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ErrorBody {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }

    pub fn with_details(code: impl Into<String>, message: impl Into<String>, details: Value) -> Self {
        Self {
            error: ErrorBody {
                code: code.into(),
                message: message.into(),
                details: Some(details),
            },
        }
    }
}

// ========================================
// Tests
// ========================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_response_shape() {
        let error = ErrorResponse::new("CAPACITY_EXCEEDED", "Room has only 1 available seats");

        let json = serde_json::to_value(&error).unwrap();
        assert_eq!(json["error"]["code"], "CAPACITY_EXCEEDED");
        assert!(json["error"]["message"].as_str().unwrap().contains("1 available"));
        assert!(json["error"].get("details").is_none());
    }

    #[test]
    fn test_error_with_details() {
        let details = serde_json::json!({ "available": 1, "requested": 3 });
        let error = ErrorResponse::with_details("CAPACITY_EXCEEDED", "too many", details);

        assert_eq!(error.error.details.unwrap()["requested"], 3);
    }
}
