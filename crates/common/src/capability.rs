//! Per-provider backend capability flags.
//!
//! Guardrail features are only meaningful on engines that actually support
//! them; activating a feature the backend silently ignores is worse than
//! refusing it. `capabilities_for` is the single source of truth consulted
//! before any guardrail is switched on, and it is total: every provider
//! string maps to a capability set, with unknown providers falling back to
//! conservative defaults that assume no extra guarantees.

use serde::{Deserialize, Serialize};

/// How tenant isolation is enforced on a backend, if at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TenantEnforcementMode {
    /// Row-level security bound to session state (e.g. Postgres RLS).
    RlsSession,
    /// Predicate injection into the generated SQL.
    SqlRewrite,
    /// No enforcement mechanism available.
    Unsupported,
}

/// Whether query submission blocks until completion or returns a job handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionModel {
    Sync,
    Async,
}

/// Immutable feature flags for one database provider.
///
/// Built once at startup from [`capabilities_for`]; never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendCapabilities {
    pub supports_tenant_enforcement: bool,
    pub tenant_enforcement_mode: TenantEnforcementMode,
    pub execution_model: ExecutionModel,
    pub supports_transactions: bool,
    pub supports_execution_role: bool,
    pub supports_restricted_session: bool,
    pub supports_cancel: bool,
    pub supports_pagination: bool,
    pub supports_row_cap: bool,
    pub supports_byte_cap: bool,
    pub supports_timeout: bool,
    /// Read-only is pinned at the session level rather than per transaction
    /// (Redshift, Snowflake, BigQuery).
    pub enforces_statement_read_only: bool,
    pub supports_arrays: bool,
    pub supports_json: bool,
    pub supports_foreign_keys: bool,
    pub supports_cost_estimation: bool,
}

impl BackendCapabilities {
    /// Conservative defaults for providers we know nothing about: no caps,
    /// no timeout, no session features, so no guarantee is silently assumed.
    pub fn conservative() -> Self {
        Self {
            supports_tenant_enforcement: false,
            tenant_enforcement_mode: TenantEnforcementMode::Unsupported,
            execution_model: ExecutionModel::Sync,
            supports_transactions: false,
            supports_execution_role: false,
            supports_restricted_session: false,
            supports_cancel: false,
            supports_pagination: false,
            supports_row_cap: false,
            supports_byte_cap: false,
            supports_timeout: false,
            enforces_statement_read_only: false,
            supports_arrays: false,
            supports_json: false,
            supports_foreign_keys: false,
            supports_cost_estimation: false,
        }
    }
}

/// Providers with hand-curated capability sets.
pub const KNOWN_PROVIDERS: &[&str] = &[
    "postgres",
    "mysql",
    "sqlite",
    "redshift",
    "snowflake",
    "bigquery",
    "athena",
    "databricks",
    "cockroachdb",
    "duckdb",
    "clickhouse",
];

/// Total, pure, deterministic capability lookup.
pub fn capabilities_for(provider: &str) -> BackendCapabilities {
    let base = BackendCapabilities::conservative();
    match provider.to_ascii_lowercase().as_str() {
        "postgres" | "postgresql" => BackendCapabilities {
            supports_tenant_enforcement: true,
            tenant_enforcement_mode: TenantEnforcementMode::RlsSession,
            supports_transactions: true,
            supports_execution_role: true,
            supports_restricted_session: true,
            supports_cancel: true,
            supports_pagination: true,
            supports_row_cap: true,
            supports_byte_cap: true,
            supports_timeout: true,
            supports_arrays: true,
            supports_json: true,
            supports_foreign_keys: true,
            supports_cost_estimation: true,
            ..base
        },
        "mysql" => BackendCapabilities {
            supports_tenant_enforcement: true,
            tenant_enforcement_mode: TenantEnforcementMode::SqlRewrite,
            supports_transactions: true,
            supports_cancel: true,
            supports_pagination: true,
            supports_row_cap: true,
            supports_timeout: true,
            supports_json: true,
            supports_foreign_keys: true,
            ..base
        },
        "sqlite" => BackendCapabilities {
            supports_tenant_enforcement: true,
            tenant_enforcement_mode: TenantEnforcementMode::SqlRewrite,
            supports_transactions: true,
            supports_pagination: true,
            supports_row_cap: true,
            supports_json: true,
            supports_foreign_keys: true,
            ..base
        },
        "redshift" => BackendCapabilities {
            supports_tenant_enforcement: true,
            tenant_enforcement_mode: TenantEnforcementMode::RlsSession,
            supports_transactions: true,
            supports_execution_role: true,
            supports_cancel: true,
            supports_pagination: true,
            supports_row_cap: true,
            supports_timeout: true,
            enforces_statement_read_only: true,
            supports_json: true,
            supports_cost_estimation: true,
            ..base
        },
        "snowflake" => BackendCapabilities {
            supports_tenant_enforcement: true,
            tenant_enforcement_mode: TenantEnforcementMode::RlsSession,
            execution_model: ExecutionModel::Async,
            supports_execution_role: true,
            supports_cancel: true,
            supports_pagination: true,
            supports_row_cap: true,
            supports_timeout: true,
            enforces_statement_read_only: true,
            supports_arrays: true,
            supports_json: true,
            ..base
        },
        "bigquery" => BackendCapabilities {
            supports_tenant_enforcement: true,
            tenant_enforcement_mode: TenantEnforcementMode::SqlRewrite,
            execution_model: ExecutionModel::Async,
            supports_cancel: true,
            supports_pagination: true,
            supports_row_cap: true,
            supports_byte_cap: true,
            supports_timeout: true,
            enforces_statement_read_only: true,
            supports_arrays: true,
            supports_json: true,
            supports_cost_estimation: true,
            ..base
        },
        "athena" => BackendCapabilities {
            supports_tenant_enforcement: true,
            tenant_enforcement_mode: TenantEnforcementMode::SqlRewrite,
            execution_model: ExecutionModel::Async,
            supports_cancel: true,
            supports_pagination: true,
            supports_byte_cap: true,
            supports_timeout: true,
            enforces_statement_read_only: true,
            supports_arrays: true,
            supports_json: true,
            ..base
        },
        "databricks" => BackendCapabilities {
            supports_tenant_enforcement: true,
            tenant_enforcement_mode: TenantEnforcementMode::SqlRewrite,
            execution_model: ExecutionModel::Async,
            supports_cancel: true,
            supports_pagination: true,
            supports_row_cap: true,
            supports_timeout: true,
            enforces_statement_read_only: true,
            supports_arrays: true,
            supports_json: true,
            ..base
        },
        "cockroachdb" | "cockroach" => BackendCapabilities {
            supports_tenant_enforcement: true,
            tenant_enforcement_mode: TenantEnforcementMode::SqlRewrite,
            supports_transactions: true,
            supports_execution_role: true,
            supports_cancel: true,
            supports_pagination: true,
            supports_row_cap: true,
            supports_timeout: true,
            supports_arrays: true,
            supports_json: true,
            supports_foreign_keys: true,
            supports_cost_estimation: true,
            ..base
        },
        "duckdb" => BackendCapabilities {
            supports_tenant_enforcement: true,
            tenant_enforcement_mode: TenantEnforcementMode::SqlRewrite,
            supports_transactions: true,
            supports_pagination: true,
            supports_row_cap: true,
            supports_arrays: true,
            supports_json: true,
            ..base
        },
        "clickhouse" => BackendCapabilities {
            supports_tenant_enforcement: true,
            tenant_enforcement_mode: TenantEnforcementMode::SqlRewrite,
            supports_restricted_session: true,
            supports_cancel: true,
            supports_pagination: true,
            supports_row_cap: true,
            supports_byte_cap: true,
            supports_timeout: true,
            enforces_statement_read_only: true,
            supports_arrays: true,
            supports_json: true,
            ..base
        },
        _ => base,
    }
}
