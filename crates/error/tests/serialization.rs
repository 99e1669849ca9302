//! Wire-format stability tests for `GuardError`.
//!
//! The JSON shape of errors is consumed by the orchestration workflow and by
//! agent retry logic; these tests pin the contract.

use keelson_error::{ErrorCategory, ErrorCode, ErrorContext, GuardError};

#[test]
fn error_json_carries_stable_code_and_retryable_flag() {
    let err = GuardError::new(ErrorCode::TenantRateExceeded, "Token bucket empty")
        .with_context(ErrorContext::Admission {
            tenant_id: 42,
            limit_kind: "rate".to_string(),
            limit: 10.0,
            active: None,
            tokens_remaining: Some(0.4),
            retry_after_seconds: 0.12,
        })
        .with_hint("Retry after 0.12s");

    let json: serde_json::Value = serde_json::from_str(&err.to_json()).unwrap();
    assert_eq!(json["code"], "TENANT_RATE_EXCEEDED");
    assert_eq!(json["retryable"], true);
    assert_eq!(json["context"]["type"], "admission");
    assert_eq!(json["context"]["tenant_id"], 42);
    assert_eq!(json["context"]["retry_after_seconds"], 0.12);
    assert_eq!(json["hint"], "Retry after 0.12s");
}

#[test]
fn error_roundtrips_through_json() {
    let err = GuardError::new(ErrorCode::SandboxStateDrift, "search_path drifted").with_context(
        ErrorContext::Sandbox {
            failure_reason: "STATE_DRIFT".to_string(),
            rolled_back: false,
            rollback_failed: false,
            state_clean: false,
        },
    );

    let de: GuardError = serde_json::from_str(&err.to_json()).unwrap();
    assert_eq!(de.code, ErrorCode::SandboxStateDrift);
    assert_eq!(de.category(), ErrorCategory::Sandbox);
    assert!(!de.retryable);
    match de.context {
        Some(ErrorContext::Sandbox { state_clean, .. }) => assert!(!state_clean),
        other => panic!("Unexpected context: {:?}", other),
    }
}

#[test]
fn unknown_code_is_rejected_on_deserialization() {
    let raw = r#"{"code":"SOMETHING_NEW","message":"x","retryable":false}"#;
    assert!(serde_json::from_str::<GuardError>(raw).is_err());
}

#[test]
fn all_stable_codes_roundtrip() {
    for code in [
        "TENANT_CONCURRENCY_EXCEEDED",
        "TENANT_RATE_EXCEEDED",
        "SESSION_GUARDRAIL_UNSUPPORTED_PROVIDER",
        "SESSION_GUARDRAIL_MISCONFIGURED",
        "SQL_PARSE_ERROR",
        "COMPLEXITY_REJECTED",
        "SANDBOX_STATE_DRIFT",
        "QUERY_ERROR",
        "TIMEOUT",
    ] {
        let parsed = ErrorCode::try_from(code.to_string()).unwrap();
        assert_eq!(parsed.as_str(), code);
    }
}
