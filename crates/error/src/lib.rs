//! # keelson-error
//!
//! Unified error types for the Keelson execution governance core.
//!
//! All errors are designed to be machine-parseable with:
//! - Stable string codes (e.g. `TENANT_RATE_EXCEEDED`)
//! - A `retryable` flag plus `retry_after_seconds` hints where applicable
//! - Structured JSON context
//! - Actionable hints for agent self-correction

mod code;
mod context;

pub use code::{ErrorCategory, ErrorCode};
pub use context::ErrorContext;

use serde::{Deserialize, Serialize};
use std::fmt;

/// The unified error type surfaced by the governance facade.
///
/// Designed for consumption by the text-to-SQL orchestration workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardError {
    /// Stable code (e.g. `COMPLEXITY_REJECTED`).
    pub code: ErrorCode,

    /// Human-readable error message.
    pub message: String,

    /// Whether the caller may retry the identical request.
    pub retryable: bool,

    /// Structured context for programmatic handling.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<ErrorContext>,

    /// Actionable suggestion for self-correction.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl GuardError {
    /// Create a new error with code and message; retryability defaults from
    /// the code.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            retryable: code.default_retryable(),
            context: None,
            hint: None,
        }
    }

    /// Add structured context.
    pub fn with_context(mut self, context: ErrorContext) -> Self {
        self.context = Some(context);
        self
    }

    /// Add an actionable hint.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    /// Override the code's default retryability (e.g. a timeout whose
    /// rollback also failed must not be retried blindly).
    pub fn with_retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }

    /// High-level category of this error.
    pub fn category(&self) -> ErrorCategory {
        self.code.category()
    }

    /// Serialize to JSON for API responses.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            tracing::warn!("Failed to serialize GuardError: {}", e);
            format!(
                r#"{{"code":"{}","message":"Serialization failed","retryable":false}}"#,
                self.code
            )
        })
    }
}

impl fmt::Display for GuardError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)?;
        if let Some(hint) = &self.hint {
            write!(f, " (Hint: {})", hint)?;
        }
        Ok(())
    }
}

impl std::error::Error for GuardError {}

/// Result type alias for governance operations.
pub type Result<T> = std::result::Result<T, GuardError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_error_builder() {
        let err = GuardError::new(ErrorCode::ComplexityRejected, "Too many joins")
            .with_hint("Split the query");

        assert_eq!(err.code, ErrorCode::ComplexityRejected);
        assert_eq!(err.message, "Too many joins");
        assert!(!err.retryable);
        assert_eq!(err.hint, Some("Split the query".to_string()));
        assert!(err.context.is_none());
    }

    #[test]
    fn test_display_implementation() {
        let err = GuardError::new(ErrorCode::TenantRateExceeded, "Bucket empty")
            .with_hint("Retry in 0.2s");
        assert_eq!(
            err.to_string(),
            "[TENANT_RATE_EXCEEDED] Bucket empty (Hint: Retry in 0.2s)"
        );

        let err_no_hint = GuardError::new(ErrorCode::QueryError, "Boom");
        assert_eq!(err_no_hint.to_string(), "[QUERY_ERROR] Boom");
    }

    #[test]
    fn test_retryable_override() {
        let err = GuardError::new(ErrorCode::Timeout, "Slow").with_retryable(false);
        assert!(!err.retryable);
    }

    #[test]
    fn test_json_output() {
        let err = GuardError::new(ErrorCode::TenantConcurrencyExceeded, "Limit reached");
        let json = err.to_json();
        assert!(json.contains("\"code\":\"TENANT_CONCURRENCY_EXCEEDED\""));
        assert!(json.contains("\"retryable\":true"));
    }
}
