//! Governance facade.
//!
//! `Governor::execute` is the single entry point: admission, capability
//! validation, complexity analysis, then sandboxed execution, in that order.
//! Every rejection and failure comes back as a [`GuardError`] with a stable
//! code, structured context and a hint, so the calling agent can branch
//! without parsing prose.

use crate::admission::{AdmissionController, AdmissionError, CONCURRENCY_RETRY_HINT_SECONDS};
use crate::pool::ConnectionPool;
use crate::sandbox::{fetch_body, ExecutionSandbox, SandboxError, SessionBaseline};
use keelson_common::capability::capabilities_for;
use keelson_common::config::{
    ComplexityLimits, GovernorConfig, PolicyViolation, SessionGuardrailSettings,
};
use keelson_common::models::QueryOutput;
use keelson_error::{ErrorCode, ErrorContext, GuardError};
use keelson_sql::{analyze, evaluate, ComplexityError, ComplexityViolation};
use std::sync::Arc;
use tracing::Instrument;

/// Everything the governor needs at construction time.
pub struct GovernorOptions {
    pub config: GovernorConfig,
    pub pool: Arc<dyn ConnectionPool>,
}

/// Execution governor: the facade in front of admission, analysis and the
/// sandbox. Cheap to share behind an `Arc`.
pub struct Governor {
    admission: AdmissionController,
    session: SessionGuardrailSettings,
    limits: ComplexityLimits,
    pool: Arc<dyn ConnectionPool>,
    baseline: SessionBaseline,
}

impl Governor {
    pub fn new(options: GovernorOptions) -> Self {
        Self {
            admission: AdmissionController::new(options.config.tenant),
            session: options.config.session,
            limits: options.config.complexity,
            pool: options.pool,
            baseline: SessionBaseline::default(),
        }
    }

    /// Override the expected post-reset session baseline for strict checks.
    pub fn with_baseline(mut self, baseline: SessionBaseline) -> Self {
        self.baseline = baseline;
        self
    }

    /// Govern one query end to end for a tenant against a provider.
    ///
    /// The admission lease is held for the entire execution and released on
    /// every exit path. Pre-execution rejections (policy, parse, complexity)
    /// never touch the connection pool.
    pub async fn execute(
        &self,
        tenant_id: i64,
        sql: &str,
        provider: &str,
    ) -> Result<QueryOutput, GuardError> {
        let span = tracing::info_span!("govern_execute", tenant_id, provider);
        async move {
            let _lease = self
                .admission
                .acquire(tenant_id)
                .map_err(admission_to_guard)?;

            let caps = capabilities_for(provider);
            self.session
                .validate_against(provider, &caps)
                .map_err(|violation| policy_to_guard(provider, violation))?;

            let metrics =
                analyze(sql, provider).map_err(|e| parse_to_guard(provider, e))?;
            if let Some(violation) = evaluate(&metrics, &self.limits) {
                tracing::info!(
                    limit = %violation.limit_name,
                    measured = violation.measured,
                    "query rejected on complexity"
                );
                return Err(complexity_to_guard(violation));
            }

            let mut conn = self.pool.acquire().await.map_err(|e| {
                GuardError::new(
                    ErrorCode::QueryError,
                    format!("failed to acquire a pooled connection: {e}"),
                )
            })?;

            let sandbox = ExecutionSandbox::new(caps, self.session.clone())
                .with_baseline(self.baseline.clone());
            let outcome = sandbox
                .run(conn.as_mut(), fetch_body(sql))
                .await
                .map_err(sandbox_to_guard)?;

            tracing::debug!(rows = outcome.value.row_count(), "query governed");
            Ok(outcome.value)
        }
        .instrument(span)
        .await
    }
}

fn admission_to_guard(err: AdmissionError) -> GuardError {
    let message = err.to_string();
    match err {
        AdmissionError::ConcurrencyExceeded {
            tenant_id,
            limit,
            active,
            retry_after_seconds,
        } => GuardError::new(ErrorCode::TenantConcurrencyExceeded, message)
            .with_context(ErrorContext::Admission {
                tenant_id,
                limit_kind: "concurrency".to_string(),
                limit: limit as f64,
                active: Some(active),
                tokens_remaining: None,
                retry_after_seconds,
            })
            .with_hint(format!(
                "Wait for an in-flight query to finish and retry in {:.1}s",
                CONCURRENCY_RETRY_HINT_SECONDS
            )),
        AdmissionError::RateExceeded {
            tenant_id,
            burst_capacity,
            tokens_remaining,
            retry_after_seconds,
        } => GuardError::new(ErrorCode::TenantRateExceeded, message)
            .with_context(ErrorContext::Admission {
                tenant_id,
                limit_kind: "rate".to_string(),
                limit: burst_capacity,
                active: None,
                tokens_remaining: Some(tokens_remaining),
                retry_after_seconds,
            })
            .with_hint(format!("Retry after {:.2}s", retry_after_seconds)),
    }
}

fn policy_to_guard(provider: &str, violation: PolicyViolation) -> GuardError {
    let message = violation.to_string();
    match violation {
        PolicyViolation::UnsupportedProvider { provider, feature } => GuardError::new(
            ErrorCode::SessionGuardrailUnsupportedProvider,
            message.clone(),
        )
        .with_context(ErrorContext::Capability {
            provider,
            feature,
            reason: message,
        })
        .with_hint("Disable the guardrail or route this tenant to a backend that supports it"),
        PolicyViolation::Misconfigured { reason } => {
            GuardError::new(ErrorCode::SessionGuardrailMisconfigured, message)
                .with_context(ErrorContext::Capability {
                    provider: provider.to_string(),
                    feature: "session guardrails".to_string(),
                    reason,
                })
                .with_hint("Fix the session guardrail configuration before retrying")
        }
    }
}

fn parse_to_guard(provider: &str, err: ComplexityError) -> GuardError {
    GuardError::new(ErrorCode::SqlParseError, err.to_string())
        .with_context(ErrorContext::Parse {
            dialect: provider.to_string(),
            detail: err.to_string(),
        })
        .with_hint("Regenerate the SQL; it is not valid for this provider's dialect")
}

fn complexity_to_guard(violation: ComplexityViolation) -> GuardError {
    let message = format!(
        "query complexity limit breached: {} = {} exceeds {}",
        violation.limit_name, violation.measured, violation.limit
    );
    let hint = format!(
        "Rewrite the query to keep {} at or below {}",
        violation.limit_name, violation.limit
    );
    GuardError::new(ErrorCode::ComplexityRejected, message)
        .with_context(ErrorContext::Complexity {
            limit_name: violation.limit_name,
            measured: violation.measured,
            limit: violation.limit,
        })
        .with_hint(hint)
}

fn sandbox_to_guard(err: SandboxError) -> GuardError {
    match err {
        SandboxError::StateDrift { ref result, .. } => {
            let context = ErrorContext::Sandbox {
                failure_reason: result.failure_reason.as_str().to_string(),
                rolled_back: result.rolled_back,
                rollback_failed: result.rollback_failed,
                state_clean: result.state_clean,
            };
            GuardError::new(ErrorCode::SandboxStateDrift, err.to_string())
                .with_context(context)
                .with_hint(
                    "Quarantine this connection; session state survived the reset",
                )
        }
        SandboxError::Execution {
            reason,
            source,
            result,
        } => {
            let code = match reason {
                crate::failure::FailureReason::Timeout => ErrorCode::Timeout,
                _ => ErrorCode::QueryError,
            };
            let retryable = code.default_retryable() && !result.rollback_failed;
            GuardError::new(code, source.to_string())
                .with_retryable(retryable)
                .with_context(ErrorContext::Sandbox {
                    failure_reason: reason.as_str().to_string(),
                    rolled_back: result.rolled_back,
                    rollback_failed: result.rollback_failed,
                    state_clean: result.state_clean,
                })
        }
    }
}
