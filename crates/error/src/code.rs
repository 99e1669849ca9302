use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable error codes surfaced to callers of the governance core.
///
/// The string form of each code is part of the public contract: LLM agents
/// and retry middlewares branch on it, so codes never change meaning across
/// versions (semver contract).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
#[non_exhaustive]
pub enum ErrorCode {
    /// Tenant is at its concurrency ceiling.
    TenantConcurrencyExceeded,
    /// Tenant's token bucket is empty.
    TenantRateExceeded,
    /// A configured session guardrail is not supported by the target backend.
    SessionGuardrailUnsupportedProvider,
    /// Session guardrail configuration is internally inconsistent.
    SessionGuardrailMisconfigured,
    /// The SQL string could not be parsed at all.
    SqlParseError,
    /// The query shape breached a complexity limit.
    ComplexityRejected,
    /// Post-execution session state differed from the baseline.
    SandboxStateDrift,
    /// The backend rejected or failed the query.
    QueryError,
    /// The query (or its cleanup) timed out.
    Timeout,
}

impl ErrorCode {
    /// Stable string form of the code.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TenantConcurrencyExceeded => "TENANT_CONCURRENCY_EXCEEDED",
            Self::TenantRateExceeded => "TENANT_RATE_EXCEEDED",
            Self::SessionGuardrailUnsupportedProvider => "SESSION_GUARDRAIL_UNSUPPORTED_PROVIDER",
            Self::SessionGuardrailMisconfigured => "SESSION_GUARDRAIL_MISCONFIGURED",
            Self::SqlParseError => "SQL_PARSE_ERROR",
            Self::ComplexityRejected => "COMPLEXITY_REJECTED",
            Self::SandboxStateDrift => "SANDBOX_STATE_DRIFT",
            Self::QueryError => "QUERY_ERROR",
            Self::Timeout => "TIMEOUT",
        }
    }

    /// High-level category of the code.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::TenantConcurrencyExceeded | Self::TenantRateExceeded => ErrorCategory::Admission,
            Self::SessionGuardrailUnsupportedProvider | Self::SessionGuardrailMisconfigured => {
                ErrorCategory::Policy
            }
            Self::SqlParseError | Self::ComplexityRejected => ErrorCategory::Complexity,
            Self::SandboxStateDrift => ErrorCategory::Sandbox,
            Self::QueryError | Self::Timeout => ErrorCategory::Execution,
        }
    }

    /// Default retryability for the code.
    ///
    /// Admission rejections clear on their own and timeouts are transient;
    /// everything else requires the caller to change something (the query,
    /// the configuration, or the deployment) before trying again. A `Timeout`
    /// whose cleanup also failed is downgraded to non-retryable where the
    /// concrete error is built.
    pub fn default_retryable(&self) -> bool {
        matches!(
            self,
            Self::TenantConcurrencyExceeded | Self::TenantRateExceeded | Self::Timeout
        )
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl From<ErrorCode> for String {
    fn from(code: ErrorCode) -> String {
        code.as_str().to_string()
    }
}

impl TryFrom<String> for ErrorCode {
    type Error = String;

    fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
        match s.as_str() {
            "TENANT_CONCURRENCY_EXCEEDED" => Ok(Self::TenantConcurrencyExceeded),
            "TENANT_RATE_EXCEEDED" => Ok(Self::TenantRateExceeded),
            "SESSION_GUARDRAIL_UNSUPPORTED_PROVIDER" => {
                Ok(Self::SessionGuardrailUnsupportedProvider)
            }
            "SESSION_GUARDRAIL_MISCONFIGURED" => Ok(Self::SessionGuardrailMisconfigured),
            "SQL_PARSE_ERROR" => Ok(Self::SqlParseError),
            "COMPLEXITY_REJECTED" => Ok(Self::ComplexityRejected),
            "SANDBOX_STATE_DRIFT" => Ok(Self::SandboxStateDrift),
            "QUERY_ERROR" => Ok(Self::QueryError),
            "TIMEOUT" => Ok(Self::Timeout),
            other => Err(format!("Unknown error code: {}", other)),
        }
    }
}

/// High-level error category for callers that branch on class rather than
/// exact code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum ErrorCategory {
    Admission,
    Policy,
    Complexity,
    Sandbox,
    Execution,
}
