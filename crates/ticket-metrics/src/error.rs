//! Error types for metrics operations
//!
//! Every failure the engine can report is a [`MetricsError`]. Each variant maps
//! to a typed [`ErrorCode`] which serializes to SCREAMING_SNAKE_CASE on the
//! wire, so callers can branch on the code without parsing messages.
//!
//! # Example
//! ```rust,ignore
//! use ticket_metrics::{ErrorCode, MetricsError};
//!
//! let error = MetricsError::invalid_query("unknown metric 'latency'");
//! assert_eq!(error.code(), ErrorCode::InvalidQuery);
//! assert!(!error.is_retryable());
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::validation::FieldError;

/// Type-safe error codes.
///
/// The first four codes are produced by the metrics engine. The remaining ones
/// are produced by the RPC dispatch layer before a request reaches the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[non_exhaustive]
pub enum ErrorCode {
    /// The request was malformed or names an unsupported metric/filter
    InvalidQuery,
    /// The persistent store could not be read
    StoreUnavailable,
    /// The caller's deadline elapsed before a result was available
    Timeout,
    /// The claim registry and entry table disagree
    InternalInconsistency,

    /// The request envelope could not be decoded
    BadRequest,
    /// The requested procedure was not found
    ProcedureNotFound,
    /// A response could not be serialized
    SerializationError,
}

impl ErrorCode {
    /// Returns the string representation of the error code.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidQuery => "INVALID_QUERY",
            Self::StoreUnavailable => "STORE_UNAVAILABLE",
            Self::Timeout => "TIMEOUT",
            Self::InternalInconsistency => "INTERNAL_INCONSISTENCY",
            Self::BadRequest => "BAD_REQUEST",
            Self::ProcedureNotFound => "PROCEDURE_NOT_FOUND",
            Self::SerializationError => "SERIALIZATION_ERROR",
        }
    }

    /// Returns true if the failure was caused by the caller.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidQuery | Self::BadRequest | Self::ProcedureNotFound
        )
    }

    /// Returns true if repeating the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StoreUnavailable | Self::Timeout)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Errors produced by the metrics engine.
///
/// `Clone` so a single aggregation failure can be handed to every waiter of a
/// shared recomputation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MetricsError {
    /// Malformed request, not retried
    #[error("invalid query: {message}")]
    InvalidQuery {
        message: String,
        errors: Vec<FieldError>,
    },

    /// Store read failed; retryable and never cached
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    /// The request deadline elapsed
    #[error("request timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    /// Claim registry and entry table disagree, or a stored row is malformed
    #[error("internal inconsistency: {0}")]
    InternalInconsistency(String),
}

impl MetricsError {
    /// Create an `InvalidQuery` error without field details.
    pub fn invalid_query(message: impl Into<String>) -> Self {
        Self::InvalidQuery {
            message: message.into(),
            errors: Vec::new(),
        }
    }

    /// Create an `InvalidQuery` error from a list of field errors.
    pub fn from_field_errors(errors: Vec<FieldError>) -> Self {
        let message = errors
            .iter()
            .map(|e| e.message.as_str())
            .collect::<Vec<_>>()
            .join("; ");
        Self::InvalidQuery { message, errors }
    }

    pub fn store_unavailable(message: impl Into<String>) -> Self {
        Self::StoreUnavailable(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::InternalInconsistency(message.into())
    }

    /// The typed code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidQuery { .. } => ErrorCode::InvalidQuery,
            Self::StoreUnavailable(_) => ErrorCode::StoreUnavailable,
            Self::Timeout(_) => ErrorCode::Timeout,
            Self::InternalInconsistency(_) => ErrorCode::InternalInconsistency,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.code().is_retryable()
    }

    /// Field-level validation errors, empty for everything but `InvalidQuery`.
    pub fn field_errors(&self) -> &[FieldError] {
        match self {
            Self::InvalidQuery { errors, .. } => errors,
            _ => &[],
        }
    }
}

/// Result type alias for metrics operations.
pub type MetricsResult<T> = Result<T, MetricsError>;

/// Errors raised by a [`TicketStore`](crate::store::TicketStore).
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store is unreachable or refused the read
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A row could not be decoded into a domain value
    #[error("malformed row: {0}")]
    Decode(String),

    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

impl From<StoreError> for MetricsError {
    fn from(err: StoreError) -> Self {
        match err {
            // Retrying will read the same row again
            StoreError::Decode(_) => Self::InternalInconsistency(err.to_string()),
            _ => Self::StoreUnavailable(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_serialization() {
        let json = serde_json::to_string(&ErrorCode::StoreUnavailable).unwrap();
        assert_eq!(json, "\"STORE_UNAVAILABLE\"");

        let code: ErrorCode = serde_json::from_str("\"INTERNAL_INCONSISTENCY\"").unwrap();
        assert_eq!(code, ErrorCode::InternalInconsistency);
    }

    #[test]
    fn test_error_code_display_matches_wire_form() {
        assert_eq!(ErrorCode::Timeout.to_string(), "TIMEOUT");
        assert_eq!(ErrorCode::InvalidQuery.to_string(), "INVALID_QUERY");
    }

    #[test]
    fn test_retryable_classification() {
        assert!(MetricsError::store_unavailable("down").is_retryable());
        assert!(MetricsError::Timeout(Duration::from_millis(5)).is_retryable());
        assert!(!MetricsError::invalid_query("bad").is_retryable());
        assert!(!MetricsError::internal("mismatch").is_retryable());
    }

    #[test]
    fn test_client_errors() {
        assert!(ErrorCode::InvalidQuery.is_client_error());
        assert!(ErrorCode::ProcedureNotFound.is_client_error());
        assert!(!ErrorCode::StoreUnavailable.is_client_error());
    }

    #[test]
    fn test_field_errors_joined_into_message() {
        let error = MetricsError::from_field_errors(vec![
            FieldError::required("start"),
            FieldError::required("end"),
        ]);
        assert_eq!(error.code(), ErrorCode::InvalidQuery);
        assert_eq!(error.field_errors().len(), 2);
        assert_eq!(
            error.to_string(),
            "invalid query: start must not be blank; end must not be blank"
        );
    }

    #[test]
    fn test_store_error_converts_to_store_unavailable() {
        let error: MetricsError = StoreError::Unavailable("connection refused".into()).into();
        assert_eq!(error.code(), ErrorCode::StoreUnavailable);
        assert!(error.to_string().contains("connection refused"));
        assert!(error.is_retryable());
    }

    #[test]
    fn test_malformed_row_is_not_retryable() {
        let error: MetricsError = StoreError::Decode("rating 9 out of range".into()).into();
        assert_eq!(error.code(), ErrorCode::InternalInconsistency);
        assert!(!error.is_retryable());
        assert!(error.to_string().contains("rating 9 out of range"));
    }

    #[test]
    fn test_timeout_display() {
        let error = MetricsError::Timeout(Duration::from_millis(250));
        assert_eq!(error.to_string(), "request timed out after 250ms");
    }
}
