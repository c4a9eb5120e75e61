//! Error types and the JSON response envelope
//!
//! Every endpoint answers with the same envelope:
//! `{ success, data?, error?, message? }`. Errors are modelled with thiserror
//! and turned into envelopes by the `IntoResponse` impl below, so handlers can
//! simply return `Result<_, S3ApiError>`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;
use tracing::error;

/// Message returned when a handler panics or fails in an unexpected way
pub const GENERIC_FAILURE: &str = "Something went wrong!";

/// Main error type for API operations
#[derive(Error, Debug)]
pub enum S3ApiError {
    /// A required request parameter is missing or malformed
    #[error("{0}")]
    Validation(String),

    /// The request body exceeds the configured limit
    #[error("{0}")]
    PayloadTooLarge(String),

    /// The storage service (or the network in front of it) failed
    #[error("{0}")]
    Backend(String),

    /// No route matched the request
    #[error("Route not found")]
    RouteNotFound,

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl S3ApiError {
    /// Shorthand for the "`<field>` is required" validation error
    pub fn missing(field: &str) -> Self {
        S3ApiError::Validation(format!("{} is required", field))
    }

    /// Prefix a backend error with the name of the enclosing operation.
    ///
    /// Composite operations call this on failures of their inner steps, so a
    /// force delete that fails while listing reads
    /// `Failed to delete bucket: Failed to empty bucket: Failed to list objects: ...`.
    pub fn within(self, prefix: &str) -> Self {
        match self {
            S3ApiError::Backend(msg) => S3ApiError::Backend(format!("{}: {}", prefix, msg)),
            other => other,
        }
    }

    /// HTTP status code for this error
    pub fn status(&self) -> StatusCode {
        match self {
            S3ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            S3ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            S3ApiError::RouteNotFound => StatusCode::NOT_FOUND,
            S3ApiError::Backend(_) | S3ApiError::Config(_) | S3ApiError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

/// The uniform response envelope
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            message: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

impl ApiResponse<()> {
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            message: None,
        }
    }
}

impl IntoResponse for S3ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            S3ApiError::Validation(msg)
            | S3ApiError::PayloadTooLarge(msg)
            | S3ApiError::Backend(msg) => msg.clone(),
            S3ApiError::RouteNotFound => self.to_string(),
            S3ApiError::Config(_) | S3ApiError::Internal(_) => {
                error!(error = %self, "Unhandled error");
                GENERIC_FAILURE.to_string()
            }
        };

        (status, Json(ApiResponse::failure(message))).into_response()
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, S3ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(S3ApiError::missing("key").status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            S3ApiError::Backend("boom".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(S3ApiError::RouteNotFound.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_within_only_prefixes_backend_errors() {
        let err = S3ApiError::Backend("Failed to list objects: NoSuchBucket".into())
            .within("Failed to empty bucket")
            .within("Failed to delete bucket");
        assert_eq!(
            err.to_string(),
            "Failed to delete bucket: Failed to empty bucket: Failed to list objects: NoSuchBucket"
        );

        let err = S3ApiError::missing("bucketName").within("Failed to delete bucket");
        assert_eq!(err.to_string(), "bucketName is required");
    }

    #[test]
    fn test_envelope_skips_absent_fields() {
        let body = serde_json::to_value(ApiResponse::failure("bucketName is required")).unwrap();
        assert_eq!(
            body,
            serde_json::json!({ "success": false, "error": "bucketName is required" })
        );

        let body = serde_json::to_value(
            ApiResponse::success(serde_json::json!({ "status": "OK" })).with_message("up"),
        )
        .unwrap();
        assert_eq!(
            body,
            serde_json::json!({ "success": true, "data": { "status": "OK" }, "message": "up" })
        );
    }
}
