//! Wire errors
//!
//! [`RpcError`] is what crosses the RPC boundary. It carries the same
//! [`ErrorCode`] as the engine error it was built from, plus optional JSON
//! details (field errors for `INVALID_QUERY`, the available procedures for
//! `PROCEDURE_NOT_FOUND`).

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::error::{ErrorCode, MetricsError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Error)]
#[error("[{code}] {message}")]
pub struct RpcError {
    pub code: ErrorCode,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl RpcError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    /// Attach details; values that fail to serialize are dropped.
    pub fn with_details(mut self, details: impl Serialize) -> Self {
        self.details = serde_json::to_value(details).ok();
        self
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::BadRequest, message)
    }

    pub fn procedure_not_found(path: &str) -> Self {
        Self::new(
            ErrorCode::ProcedureNotFound,
            format!("Procedure '{}' not found", path),
        )
    }

    pub fn serialization(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::SerializationError, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalInconsistency, message)
    }

    pub fn is_retryable(&self) -> bool {
        self.code.is_retryable()
    }
}

impl From<MetricsError> for RpcError {
    fn from(err: MetricsError) -> Self {
        let code = err.code();
        let message = err.to_string();
        match err {
            MetricsError::InvalidQuery { errors, .. } if !errors.is_empty() => {
                Self::new(code, message).with_details(serde_json::json!({ "errors": errors }))
            }
            MetricsError::Timeout(timeout) => Self::new(code, message).with_details(
                serde_json::json!({ "timeout_ms": timeout.as_millis() as u64, "retryable": true }),
            ),
            MetricsError::StoreUnavailable(_) => {
                Self::new(code, message).with_details(serde_json::json!({ "retryable": true }))
            }
            MetricsError::InternalInconsistency(_) => {
                debug!(message = %message, "internal inconsistency reported to caller");
                Self::new(code, message)
            }
            _ => Self::new(code, message),
        }
    }
}

impl From<serde_json::Error> for RpcError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization(format!("JSON error: {}", err))
    }
}

pub type RpcResult<T> = Result<T, RpcError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::FieldError;
    use std::time::Duration;

    #[test]
    fn test_invalid_query_carries_field_errors() {
        let err = MetricsError::from_field_errors(vec![FieldError::required("start")]);
        let rpc = RpcError::from(err);
        assert_eq!(rpc.code, ErrorCode::InvalidQuery);
        let details = rpc.details.unwrap();
        assert_eq!(details["errors"][0]["field"], "start");
    }

    #[test]
    fn test_codes_serialize_screaming_snake_case() {
        let rpc = RpcError::from(MetricsError::Timeout(Duration::from_millis(250)));
        let json = serde_json::to_value(&rpc).unwrap();
        assert_eq!(json["code"], "TIMEOUT");
        assert_eq!(json["details"]["timeout_ms"], 250);
        assert!(rpc.is_retryable());
    }

    #[test]
    fn test_details_are_omitted_when_absent() {
        let json = serde_json::to_value(RpcError::procedure_not_found("nope")).unwrap();
        assert_eq!(json["code"], "PROCEDURE_NOT_FOUND");
        assert!(json.get("details").is_none());
    }
}
