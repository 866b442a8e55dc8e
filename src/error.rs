//! Error types for synchronization operations.
//!
//! Errors are classified by how the caller should react:
//! - Unauthenticated: hard precondition failure, no retry
//! - NotFound: id/owner mismatch, no retry
//! - Persistence: primary store failure, caller decides retry policy
//! - Validation: malformed input, fix the input
//!
//! Mirror failures are deliberately absent here — a failed external-calendar
//! mirror never fails the operation that triggered it (see `mirror`).

use thiserror::Error;

/// Malformed numeric or date input to a calculator function or tool
/// argument. Always fatal to the call; inputs are never silently coerced.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid {field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Error surfaced by a synchronization-service operation.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Not signed in")]
    Unauthenticated,

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Store error: {0}")]
    Persistence(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

impl SyncError {
    /// Returns true if retrying the same call could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SyncError::Persistence(_))
    }
}

/// Serializable error representation for UI consumption.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncFailure {
    pub message: String,
    pub kind: FailureKind,
    pub can_retry: bool,
}

#[derive(Debug, Clone, Copy, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureKind {
    Unauthenticated,
    #[serde(rename = "notFound")]
    NotFound,
    Persistence,
    Validation,
}

impl From<&SyncError> for SyncFailure {
    fn from(err: &SyncError) -> Self {
        let kind = match err {
            SyncError::Unauthenticated => FailureKind::Unauthenticated,
            SyncError::NotFound(_) => FailureKind::NotFound,
            SyncError::Persistence(_) => FailureKind::Persistence,
            SyncError::Validation(_) => FailureKind::Validation,
        };

        SyncFailure {
            message: err.to_string(),
            kind,
            can_retry: err.is_retryable(),
        }
    }
}
