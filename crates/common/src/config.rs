//! Governor configuration.
//!
//! Config structs follow the usual layering: serde defaults for every field,
//! an optional YAML file source, then flat environment overrides applied on
//! top (the environment variable names are the public operational contract,
//! see [`EnvOverrides`]). Everything is validated before first use.

use crate::capability::BackendCapabilities;
use anyhow::{Context, Result};
use serde::Deserialize;
use validator::Validate;

// Default constants
pub const DEFAULT_PER_TENANT_CONCURRENCY_LIMIT: u32 = 4;
pub const DEFAULT_WARM_START_CONCURRENCY_LIMIT: u32 = 1;
pub const DEFAULT_WARM_START_COOLDOWN_SECONDS: u64 = 30;
pub const DEFAULT_RATE_REFILL_PER_SEC: f64 = 5.0;
pub const DEFAULT_RATE_BURST_CAPACITY: f64 = 10.0;
pub const DEFAULT_WARM_START_BURST_CAPACITY: f64 = 3.0;
pub const DEFAULT_MAX_TRACKED_TENANTS: usize = 10_000;
pub const DEFAULT_IDLE_TTL_SECONDS: u64 = 900;

pub const DEFAULT_MAX_JOINS: u32 = 8;
pub const DEFAULT_MAX_CTES: u32 = 6;
pub const DEFAULT_MAX_SUBQUERY_DEPTH: u32 = 3;
pub const DEFAULT_MAX_COMPLEXITY_SCORE: u32 = 60;

/// Per-tenant admission limits.
#[derive(Debug, Deserialize, Clone, Validate)]
pub struct TenantAdmissionConfig {
    #[serde(default = "default_per_tenant_limit")]
    #[validate(range(min = 1))]
    pub per_tenant_concurrency_limit: u32,

    /// Stricter ceiling applied during the warm-start cooldown window.
    #[serde(default = "default_warm_start_limit")]
    #[validate(range(min = 1))]
    pub warm_start_concurrency_limit: u32,

    #[serde(default = "default_warm_start_cooldown")]
    pub warm_start_cooldown_seconds: u64,

    #[serde(default = "default_refill_per_sec")]
    #[validate(range(min = 0.001))]
    pub rate_refill_per_sec: f64,

    #[serde(default = "default_burst_capacity")]
    #[validate(range(min = 1.0))]
    pub rate_burst_capacity: f64,

    #[serde(default = "default_warm_start_burst")]
    #[validate(range(min = 1.0))]
    pub warm_start_burst_capacity: f64,

    #[serde(default = "default_max_tracked_tenants")]
    #[validate(range(min = 1))]
    pub max_tracked_tenants: usize,

    #[serde(default = "default_idle_ttl")]
    pub idle_ttl_seconds: u64,
}

impl Default for TenantAdmissionConfig {
    fn default() -> Self {
        Self {
            per_tenant_concurrency_limit: default_per_tenant_limit(),
            warm_start_concurrency_limit: default_warm_start_limit(),
            warm_start_cooldown_seconds: default_warm_start_cooldown(),
            rate_refill_per_sec: default_refill_per_sec(),
            rate_burst_capacity: default_burst_capacity(),
            warm_start_burst_capacity: default_warm_start_burst(),
            max_tracked_tenants: default_max_tracked_tenants(),
            idle_ttl_seconds: default_idle_ttl(),
        }
    }
}

fn default_per_tenant_limit() -> u32 {
    DEFAULT_PER_TENANT_CONCURRENCY_LIMIT
}
fn default_warm_start_limit() -> u32 {
    DEFAULT_WARM_START_CONCURRENCY_LIMIT
}
fn default_warm_start_cooldown() -> u64 {
    DEFAULT_WARM_START_COOLDOWN_SECONDS
}
fn default_refill_per_sec() -> f64 {
    DEFAULT_RATE_REFILL_PER_SEC
}
fn default_burst_capacity() -> f64 {
    DEFAULT_RATE_BURST_CAPACITY
}
fn default_warm_start_burst() -> f64 {
    DEFAULT_WARM_START_BURST_CAPACITY
}
fn default_max_tracked_tenants() -> usize {
    DEFAULT_MAX_TRACKED_TENANTS
}
fn default_idle_ttl() -> u64 {
    DEFAULT_IDLE_TTL_SECONDS
}

/// Session-level guardrail switches, resolved once at startup.
#[derive(Debug, Deserialize, Clone)]
pub struct SessionGuardrailSettings {
    #[serde(default)]
    pub restricted_session_enabled: bool,
    #[serde(default)]
    pub execution_role_enabled: bool,
    #[serde(default)]
    pub execution_role_name: Option<String>,
    #[serde(default = "default_sandbox_enabled")]
    pub sandbox_enabled: bool,
    /// Re-read live session state after reset and fail on any drift.
    #[serde(default)]
    pub strict_state_check: bool,
}

fn default_sandbox_enabled() -> bool {
    true
}

impl Default for SessionGuardrailSettings {
    fn default() -> Self {
        Self {
            restricted_session_enabled: false,
            execution_role_enabled: false,
            execution_role_name: None,
            sandbox_enabled: default_sandbox_enabled(),
            strict_state_check: false,
        }
    }
}

/// A guardrail/capability mismatch detected before first use.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PolicyViolation {
    #[error("Provider '{provider}' does not support {feature}")]
    UnsupportedProvider { provider: String, feature: String },
    #[error("Session guardrail misconfigured: {reason}")]
    Misconfigured { reason: String },
}

impl SessionGuardrailSettings {
    /// Fail closed: every enabled guardrail must be supported by the target
    /// backend, and the settings themselves must be coherent.
    pub fn validate_against(
        &self,
        provider: &str,
        caps: &BackendCapabilities,
    ) -> Result<(), PolicyViolation> {
        if self.execution_role_enabled {
            match &self.execution_role_name {
                None => {
                    return Err(PolicyViolation::Misconfigured {
                        reason: "execution role enabled but no role name configured".to_string(),
                    })
                }
                Some(name) if name.trim().is_empty() => {
                    return Err(PolicyViolation::Misconfigured {
                        reason: "execution role name is empty".to_string(),
                    })
                }
                Some(_) => {}
            }
            if !caps.supports_execution_role {
                return Err(PolicyViolation::UnsupportedProvider {
                    provider: provider.to_string(),
                    feature: "execution role switching".to_string(),
                });
            }
        }
        if self.restricted_session_enabled && !caps.supports_restricted_session {
            return Err(PolicyViolation::UnsupportedProvider {
                provider: provider.to_string(),
                feature: "restricted sessions".to_string(),
            });
        }
        Ok(())
    }
}

/// Structural limits for the complexity analyzer.
#[derive(Debug, Deserialize, Clone, Validate)]
pub struct ComplexityLimits {
    #[serde(default = "default_max_joins")]
    pub max_joins: u32,
    #[serde(default = "default_max_ctes")]
    pub max_ctes: u32,
    #[serde(default = "default_max_subquery_depth")]
    pub max_subquery_depth: u32,
    #[serde(default = "default_disallow_cartesian")]
    pub disallow_cartesian: bool,
    #[serde(default = "default_max_score")]
    pub max_complexity_score: u32,
    /// Disabled when unset.
    #[serde(default)]
    pub max_projection_count: Option<u32>,
}

impl Default for ComplexityLimits {
    fn default() -> Self {
        Self {
            max_joins: default_max_joins(),
            max_ctes: default_max_ctes(),
            max_subquery_depth: default_max_subquery_depth(),
            disallow_cartesian: default_disallow_cartesian(),
            max_complexity_score: default_max_score(),
            max_projection_count: None,
        }
    }
}

fn default_max_joins() -> u32 {
    DEFAULT_MAX_JOINS
}
fn default_max_ctes() -> u32 {
    DEFAULT_MAX_CTES
}
fn default_max_subquery_depth() -> u32 {
    DEFAULT_MAX_SUBQUERY_DEPTH
}
fn default_disallow_cartesian() -> bool {
    true
}
fn default_max_score() -> u32 {
    DEFAULT_MAX_COMPLEXITY_SCORE
}

#[derive(Debug, Deserialize, Clone)]
pub struct TelemetryConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_otlp_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: default_otlp_endpoint(),
            service_name: default_service_name(),
        }
    }
}

fn default_otlp_endpoint() -> String {
    "http://localhost:4317".to_string()
}

fn default_service_name() -> String {
    "keelson-governor".to_string()
}

/// Top-level configuration for the governance core.
#[derive(Debug, Deserialize, Clone, Default, Validate)]
pub struct GovernorConfig {
    #[serde(default)]
    #[validate(nested)]
    pub tenant: TenantAdmissionConfig,
    #[serde(default)]
    pub session: SessionGuardrailSettings,
    #[serde(default)]
    #[validate(nested)]
    pub complexity: ComplexityLimits,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Flat environment overrides.
///
/// These names are the operational contract; each maps onto a field of the
/// nested config. All are optional; unset variables leave the file/default
/// value in place.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct EnvOverrides {
    pub per_tenant_concurrency_limit: Option<u32>,
    pub tenant_warm_start_concurrency_limit: Option<u32>,
    pub tenant_warm_start_cooldown_seconds: Option<u64>,
    pub tenant_rate_refill_per_sec: Option<f64>,
    pub tenant_rate_burst_capacity: Option<f64>,
    pub tenant_warm_start_burst_capacity: Option<f64>,
    pub max_tracked_tenants: Option<usize>,
    pub tenant_idle_ttl_seconds: Option<u64>,

    pub session_restricted_enabled: Option<bool>,
    pub session_execution_role_enabled: Option<bool>,
    pub session_execution_role_name: Option<String>,
    pub sandbox_strict_state_check: Option<bool>,

    pub max_joins: Option<u32>,
    pub max_ctes: Option<u32>,
    pub max_subquery_depth: Option<u32>,
    pub disallow_cartesian: Option<bool>,
    pub max_complexity_score: Option<u32>,
    pub max_select_projections: Option<u32>,
}

impl GovernorConfig {
    /// Load from an optional YAML file plus environment overrides.
    pub fn from_file(path: &str) -> Result<Self> {
        let builder = config::Config::builder();
        let builder = if std::path::Path::new(path).exists() {
            builder.add_source(config::File::with_name(path))
        } else {
            builder
        };
        let cfg = builder.build().context("Failed to build configuration")?;

        let mut governor: GovernorConfig = cfg
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        governor.apply(Self::env_overrides()?);
        governor
            .validate()
            .map_err(|e| anyhow::anyhow!("Configuration validation failed: {:?}", e))?;
        Ok(governor)
    }

    /// Load purely from defaults plus environment overrides.
    pub fn from_env() -> Result<Self> {
        let mut governor = GovernorConfig::default();
        governor.apply(Self::env_overrides()?);
        governor
            .validate()
            .map_err(|e| anyhow::anyhow!("Configuration validation failed: {:?}", e))?;
        Ok(governor)
    }

    fn env_overrides() -> Result<EnvOverrides> {
        let cfg = config::Config::builder()
            .add_source(config::Environment::default().try_parsing(true))
            .build()
            .context("Failed to read environment")?;
        cfg.try_deserialize()
            .context("Failed to deserialize environment overrides")
    }

    /// Apply flat overrides over the current values.
    pub fn apply(&mut self, env: EnvOverrides) {
        let t = &mut self.tenant;
        if let Some(v) = env.per_tenant_concurrency_limit {
            t.per_tenant_concurrency_limit = v;
        }
        if let Some(v) = env.tenant_warm_start_concurrency_limit {
            t.warm_start_concurrency_limit = v;
        }
        if let Some(v) = env.tenant_warm_start_cooldown_seconds {
            t.warm_start_cooldown_seconds = v;
        }
        if let Some(v) = env.tenant_rate_refill_per_sec {
            t.rate_refill_per_sec = v;
        }
        if let Some(v) = env.tenant_rate_burst_capacity {
            t.rate_burst_capacity = v;
        }
        if let Some(v) = env.tenant_warm_start_burst_capacity {
            t.warm_start_burst_capacity = v;
        }
        if let Some(v) = env.max_tracked_tenants {
            t.max_tracked_tenants = v;
        }
        if let Some(v) = env.tenant_idle_ttl_seconds {
            t.idle_ttl_seconds = v;
        }

        let s = &mut self.session;
        if let Some(v) = env.session_restricted_enabled {
            s.restricted_session_enabled = v;
        }
        if let Some(v) = env.session_execution_role_enabled {
            s.execution_role_enabled = v;
        }
        if let Some(v) = env.session_execution_role_name {
            s.execution_role_name = Some(v);
        }
        if let Some(v) = env.sandbox_strict_state_check {
            s.strict_state_check = v;
        }

        let c = &mut self.complexity;
        if let Some(v) = env.max_joins {
            c.max_joins = v;
        }
        if let Some(v) = env.max_ctes {
            c.max_ctes = v;
        }
        if let Some(v) = env.max_subquery_depth {
            c.max_subquery_depth = v;
        }
        if let Some(v) = env.disallow_cartesian {
            c.disallow_cartesian = v;
        }
        if let Some(v) = env.max_complexity_score {
            c.max_complexity_score = v;
        }
        if let Some(v) = env.max_select_projections {
            c.max_projection_count = Some(v);
        }
    }
}
