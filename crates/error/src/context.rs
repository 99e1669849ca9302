//! # Error Contexts
//!
//! Structured metadata attached to errors so the orchestration layer (and the
//! LLM agent behind it) can react programmatically instead of parsing
//! messages.

use serde::{Deserialize, Serialize};

/// Structured context for governance errors.
///
/// Each variant carries the fields relevant to that rejection class.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ErrorContext {
    /// Context for TENANT_CONCURRENCY_EXCEEDED / TENANT_RATE_EXCEEDED.
    Admission {
        tenant_id: i64,
        /// "concurrency" or "rate".
        limit_kind: String,
        limit: f64,
        #[serde(skip_serializing_if = "Option::is_none")]
        active: Option<u32>,
        #[serde(skip_serializing_if = "Option::is_none")]
        tokens_remaining: Option<f64>,
        retry_after_seconds: f64,
    },

    /// Context for SESSION_GUARDRAIL_UNSUPPORTED_PROVIDER / _MISCONFIGURED.
    Capability {
        provider: String,
        feature: String,
        reason: String,
    },

    /// Context for COMPLEXITY_REJECTED.
    Complexity {
        limit_name: String,
        measured: u64,
        limit: u64,
    },

    /// Context for SQL_PARSE_ERROR.
    Parse { dialect: String, detail: String },

    /// Context for sandbox outcomes (QUERY_ERROR, TIMEOUT, SANDBOX_STATE_DRIFT).
    Sandbox {
        failure_reason: String,
        rolled_back: bool,
        rollback_failed: bool,
        state_clean: bool,
    },

    /// Generic key-value context for extensibility.
    Generic {
        #[serde(flatten)]
        data: std::collections::HashMap<String, serde_json::Value>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admission_context_serde_roundtrip() {
        let ctx = ErrorContext::Admission {
            tenant_id: 7,
            limit_kind: "concurrency".to_string(),
            limit: 1.0,
            active: Some(1),
            tokens_remaining: None,
            retry_after_seconds: 1.0,
        };

        let json = serde_json::to_string(&ctx).unwrap();
        assert!(json.contains("\"type\":\"admission\""));
        assert!(!json.contains("tokens_remaining"));

        let de: ErrorContext = serde_json::from_str(&json).unwrap();
        match de {
            ErrorContext::Admission {
                tenant_id,
                limit_kind,
                ..
            } => {
                assert_eq!(tenant_id, 7);
                assert_eq!(limit_kind, "concurrency");
            }
            _ => panic!("Wrong variant"),
        }
    }

    #[test]
    fn test_complexity_context_fields() {
        let ctx = ErrorContext::Complexity {
            limit_name: "joins".to_string(),
            measured: 9,
            limit: 8,
        };
        let json = serde_json::to_value(&ctx).unwrap();
        assert_eq!(json["limit_name"], "joins");
        assert_eq!(json["measured"], 9);
        assert_eq!(json["limit"], 8);
    }
}
