//! # Error Types: The Portal Error Taxonomy
//!
//! Every rejected operation in the workspace ends up as one of five kinds:
//!
//! | Kind                | Meaning                                           | Retry?          |
//! |---------------------|---------------------------------------------------|-----------------|
//! | `ValidationFailed`  | missing/unknown field or document, bad input      | fix input       |
//! | `StateConflict`     | lost claim race, transition from the wrong state  | refresh + retry |
//! | `NotFound`          | unknown order/document/identity/service id        | no              |
//! | `InsufficientFunds` | wallet debit blocked, nothing applied             | top up          |
//! | `StorageFailure`    | persistence unavailable, nothing applied          | no              |
//!
//! Domain crates define their own `thiserror` enums with structured fields
//! and convert into [`SevaError`] at their boundary.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::money::Amount;

/// A single field-level validation problem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldViolation {
    /// The offending field, form field name, or document tag.
    pub field: String,
    /// What is wrong with it.
    pub problem: String,
}

impl FieldViolation {
    pub fn new(field: impl Into<String>, problem: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            problem: problem.into(),
        }
    }
}

/// A validation failure with field-level detail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationFailure {
    pub message: String,
    pub fields: Vec<FieldViolation>,
}

impl ValidationFailure {
    /// A failure with a message and no field detail.
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            fields: Vec::new(),
        }
    }

    /// A failure carrying one or more field violations.
    pub fn with_fields(message: impl Into<String>, fields: Vec<FieldViolation>) -> Self {
        Self {
            message: message.into(),
            fields,
        }
    }
}

impl std::fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)?;
        if !self.fields.is_empty() {
            let detail: Vec<String> = self
                .fields
                .iter()
                .map(|v| format!("{}: {}", v.field, v.problem))
                .collect();
            write!(f, " ({})", detail.join("; "))?;
        }
        Ok(())
    }
}

/// Top-level error taxonomy for the portal core.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SevaError {
    /// Input failed validation. Recoverable by correcting the input.
    #[error("validation failed: {0}")]
    ValidationFailed(ValidationFailure),

    /// Transition attempted from the wrong state, or a claim race was lost.
    #[error("state conflict: {0}")]
    StateConflict(String),

    /// Unknown order, document, identity, or service.
    #[error("not found: {0}")]
    NotFound(String),

    /// Wallet debit blocked; the associated transition was not applied.
    #[error("insufficient funds: {required} required, {available} available")]
    InsufficientFunds {
        /// Amount the operation needed to debit.
        required: Amount,
        /// Balance at the time of the check.
        available: Amount,
    },

    /// Underlying persistence unavailable. No partial writes were made.
    #[error("storage failure: {0}")]
    StorageFailure(String),
}

impl SevaError {
    /// Shorthand for a message-only validation failure.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::ValidationFailed(ValidationFailure::message(message))
    }

    /// Machine-readable kind, stable across releases.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ValidationFailed(_) => "VALIDATION_FAILED",
            Self::StateConflict(_) => "STATE_CONFLICT",
            Self::NotFound(_) => "NOT_FOUND",
            Self::InsufficientFunds { .. } => "INSUFFICIENT_FUNDS",
            Self::StorageFailure(_) => "STORAGE_FAILURE",
        }
    }

    /// Whether the caller may usefully retry after refreshing state.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StateConflict(_))
    }
}

impl From<ValidationFailure> for SevaError {
    fn from(failure: ValidationFailure) -> Self {
        Self::ValidationFailed(failure)
    }
}
