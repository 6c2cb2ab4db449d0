//! # API Error Types
//!
//! Structured error type implementing `axum::response::IntoResponse`.
//! Maps the portal error taxonomy ([`SevaError`]) onto HTTP status codes
//! and a JSON body of the form `{ "error": { "code", "message", "details" } }`.
//! Internal and storage failure messages are logged, never returned.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use seva_core::{Amount, SevaError, ValidationFailure};

/// Structured JSON error response body.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

/// Inner error detail.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorDetail {
    /// Machine-readable error code (e.g., "NOT_FOUND", "VALIDATION_FAILED").
    pub code: String,
    /// Human-readable error message.
    pub message: String,
    /// Field-level detail for validation failures; required and available
    /// amounts for insufficient funds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Application-level error type that implements [`IntoResponse`] for Axum.
#[derive(Error, Debug)]
pub enum AppError {
    /// Resource not found (404).
    #[error("not found: {0}")]
    NotFound(String),

    /// Input failed validation (422).
    #[error("validation failed: {0}")]
    Validation(ValidationFailure),

    /// Request could not be parsed (400).
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Missing or invalid token (401).
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Insufficient role, or acting for another identity (403).
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Conflict with the current state; refresh and retry (409).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Wallet balance does not cover the charge (402).
    #[error("insufficient funds: {required} required, {available} available")]
    InsufficientFunds { required: Amount, available: Amount },

    /// Persistence unavailable; nothing was applied (503).
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    /// Internal server error (500).
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Message-only validation failure.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(ValidationFailure::message(message))
    }

    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            Self::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            Self::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "VALIDATION_FAILED"),
            Self::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            Self::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            Self::Forbidden(_) => (StatusCode::FORBIDDEN, "FORBIDDEN"),
            Self::Conflict(_) => (StatusCode::CONFLICT, "STATE_CONFLICT"),
            Self::InsufficientFunds { .. } => (StatusCode::PAYMENT_REQUIRED, "INSUFFICIENT_FUNDS"),
            Self::StorageUnavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "STORAGE_FAILURE"),
            Self::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }

    fn details(&self) -> Option<serde_json::Value> {
        match self {
            Self::Validation(failure) if !failure.fields.is_empty() => {
                Some(serde_json::json!({ "fields": failure.fields }))
            }
            Self::InsufficientFunds {
                required,
                available,
            } => Some(serde_json::json!({
                "required": required.minor(),
                "available": available.minor(),
            })),
            _ => None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        let message = match &self {
            Self::Internal(_) => "An internal error occurred".to_string(),
            Self::StorageUnavailable(_) => {
                "Storage is temporarily unavailable; no changes were made".to_string()
            }
            Self::Validation(failure) => failure.message.clone(),
            other => other.to_string(),
        };

        match &self {
            Self::Internal(_) => tracing::error!(error = %self, "internal server error"),
            Self::StorageUnavailable(_) => tracing::error!(error = %self, "storage failure"),
            _ => {}
        }

        let body = ErrorBody {
            error: ErrorDetail {
                code: code.to_string(),
                message,
                details: self.details(),
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<SevaError> for AppError {
    fn from(err: SevaError) -> Self {
        match err {
            SevaError::ValidationFailed(failure) => Self::Validation(failure),
            SevaError::StateConflict(msg) => Self::Conflict(msg),
            SevaError::NotFound(msg) => Self::NotFound(msg),
            SevaError::InsufficientFunds {
                required,
                available,
            } => Self::InsufficientFunds {
                required,
                available,
            },
            SevaError::StorageFailure(msg) => Self::StorageUnavailable(msg),
        }
    }
}
