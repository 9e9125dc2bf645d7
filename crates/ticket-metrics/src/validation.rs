//! Request validation
//!
//! Field-level checks applied to metrics requests before they are turned into
//! a [`QueryKey`](crate::key::QueryKey). Rules accumulate every failure rather
//! than stopping at the first, so a caller sees all problems in one response.
//!
//! # Example
//!
//! ```rust,ignore
//! use ticket_metrics::validation::ValidationRules;
//!
//! let result = ValidationRules::new()
//!     .required("start", &input.start)
//!     .timestamp("start", &input.start)
//!     .positive("ticket", ticket_id)
//!     .build();
//! ```

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, trace};

use crate::error::{MetricsError, MetricsResult};

/// Validation error for a single field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    /// The name of the field that failed validation
    pub field: String,
    /// Human-readable error message
    pub message: String,
    /// Error code identifying the type of validation failure
    pub code: String,
}

impl FieldError {
    pub fn new(
        field: impl Into<String>,
        message: impl Into<String>,
        code: impl Into<String>,
    ) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            code: code.into(),
        }
    }

    /// Create a "required" field error
    pub fn required(field: impl Into<String>) -> Self {
        let field = field.into();
        Self::new(&field, format!("{} must not be blank", field), "required")
    }

    /// Create a "positive" field error
    pub fn positive(field: impl Into<String>) -> Self {
        let field = field.into();
        Self::new(
            &field,
            format!("{} must be a positive number", field),
            "positive",
        )
    }

    /// Create a "timestamp" field error
    pub fn timestamp(field: impl Into<String>, value: &str) -> Self {
        let field = field.into();
        Self::new(
            &field,
            format!("{} must be in ISO date-time format but was {}", field, value),
            "timestamp",
        )
    }

    /// Create a "date_order" field error
    pub fn date_order(field: impl Into<String>) -> Self {
        Self::new(field, "End date must not be before start date", "date_order")
    }

    /// Create a "one_of" field error
    pub fn one_of(field: impl Into<String>, value: &str, allowed: &[&str]) -> Self {
        let field = field.into();
        Self::new(
            &field,
            format!(
                "{} must be one of [{}] but was {}",
                field,
                allowed.join(", "),
                value
            ),
            "one_of",
        )
    }

    /// Create a custom field error
    pub fn custom(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(field, message, "custom")
    }
}

/// Result of validating an input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<FieldError>,
}

impl ValidationResult {
    pub fn ok() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
        }
    }

    /// Create a validation result from a list of errors.
    /// If the list is empty, the result is valid.
    pub fn from_errors(errors: Vec<FieldError>) -> Self {
        if errors.is_empty() {
            trace!("Validation passed");
        } else {
            let field_names: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
            debug!(
                error_count = errors.len(),
                fields = ?field_names,
                "Validation failed"
            );
        }
        Self {
            valid: errors.is_empty(),
            errors,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn errors(&self) -> &[FieldError] {
        &self.errors
    }

    /// Convert to a map of field -> errors for easier lookup
    pub fn errors_by_field(&self) -> HashMap<String, Vec<&FieldError>> {
        let mut map: HashMap<String, Vec<&FieldError>> = HashMap::new();
        for error in &self.errors {
            map.entry(error.field.clone()).or_default().push(error);
        }
        map
    }

    /// Merge another validation result into this one
    pub fn merge(mut self, other: ValidationResult) -> Self {
        self.errors.extend(other.errors);
        self.valid = self.errors.is_empty();
        self
    }

    /// Convert into a `MetricsResult`, failing with `InvalidQuery` when invalid.
    pub fn into_result(self) -> MetricsResult<()> {
        if self.valid {
            Ok(())
        } else {
            Err(MetricsError::from_field_errors(self.errors))
        }
    }
}

impl Default for ValidationResult {
    fn default() -> Self {
        Self::ok()
    }
}

/// Trait for validatable input types.
pub trait Validate {
    /// Validate the input and return a result with any errors
    fn validate(&self) -> ValidationResult;
}

/// Parse an ISO-8601 timestamp.
///
/// Accepts RFC 3339 with an offset, or a naive `YYYY-MM-DDTHH:MM:SS[.fff]`
/// timestamp which is read as UTC.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Builder for validation rules.
#[derive(Debug, Default)]
pub struct ValidationRules {
    errors: Vec<FieldError>,
}

impl ValidationRules {
    pub fn new() -> Self {
        Self { errors: Vec::new() }
    }

    /// Add a custom error
    pub fn add_error(mut self, error: FieldError) -> Self {
        trace!(field = %error.field, code = %error.code, "Adding validation error");
        self.errors.push(error);
        self
    }

    /// Validate that a string field is not blank
    pub fn required(mut self, field: &str, value: &str) -> Self {
        if value.trim().is_empty() {
            trace!(field = %field, "Required field is blank");
            self.errors.push(FieldError::required(field));
        }
        self
    }

    /// Validate that a number is strictly positive
    pub fn positive(mut self, field: &str, value: i64) -> Self {
        if value <= 0 {
            trace!(field = %field, value = value, "Field is not positive");
            self.errors.push(FieldError::positive(field));
        }
        self
    }

    /// Validate that a non-blank string parses as an ISO-8601 timestamp.
    ///
    /// Blank values are left to [`required`](Self::required).
    pub fn timestamp(mut self, field: &str, value: &str) -> Self {
        if !value.trim().is_empty() && parse_timestamp(value).is_none() {
            trace!(field = %field, "Field is not a timestamp");
            self.errors.push(FieldError::timestamp(field, value));
        }
        self
    }

    /// Validate that `end` is not before `start`.
    ///
    /// Skipped when either side failed to parse.
    pub fn date_order(mut self, field: &str, start: &str, end: &str) -> Self {
        if let (Some(start), Some(end)) = (parse_timestamp(start), parse_timestamp(end))
            && end < start
        {
            self.errors.push(FieldError::date_order(field));
        }
        self
    }

    /// Validate that a value is one of the allowed options
    pub fn one_of(mut self, field: &str, value: &str, allowed: &[&str]) -> Self {
        if !allowed.contains(&value) {
            self.errors.push(FieldError::one_of(field, value, allowed));
        }
        self
    }

    /// Apply a custom validation function
    pub fn custom<F>(mut self, field: &str, validator: F) -> Self
    where
        F: FnOnce() -> Option<String>,
    {
        if let Some(message) = validator() {
            self.errors.push(FieldError::custom(field, message));
        }
        self
    }

    pub fn build(self) -> ValidationResult {
        ValidationResult::from_errors(self.errors)
    }
}
