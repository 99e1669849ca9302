//! Execution sandbox.
//!
//! Every query runs inside a fixed session discipline on its pooled
//! connection: optional restricted-session and read-only transaction setup,
//! optional role switch, the query itself, commit or rollback, and a session
//! reset that runs exactly once on every path. Pooled connections are reused
//! by other tenants, so a leaked `SET ROLE` or `search_path` is a security
//! bug, not a hygiene issue.

use crate::failure::{classify, FailureReason};
use crate::pool::{DriverError, PooledConnection};
use futures::future::BoxFuture;
use keelson_common::capability::BackendCapabilities;
use keelson_common::config::SessionGuardrailSettings;
use keelson_common::models::QueryOutput;
use serde::Serialize;

/// Probe statement for the strict post-reset state check.
pub const SESSION_PROBE_SQL: &str =
    "SELECT current_setting('role'), current_setting('search_path'), \
     current_setting('statement_timeout')";

/// Session values expected after a full reset, as reported by
/// [`SESSION_PROBE_SQL`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionBaseline {
    pub role: String,
    pub search_path: String,
    pub statement_timeout: String,
}

impl Default for SessionBaseline {
    fn default() -> Self {
        Self {
            role: "none".to_string(),
            search_path: "public".to_string(),
            statement_timeout: "0".to_string(),
        }
    }
}

/// What actually happened to the connection during one sandboxed execution.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SandboxResult {
    pub committed: bool,
    pub rolled_back: bool,
    /// The session reset (and strict check, when enabled) left the
    /// connection in its baseline state.
    pub state_clean: bool,
    pub failure_reason: FailureReason,
    pub reset_role_attempted: bool,
    pub reset_all_attempted: bool,
    pub rollback_failed: bool,
}

impl Default for SandboxResult {
    fn default() -> Self {
        Self {
            committed: false,
            rolled_back: false,
            state_clean: false,
            failure_reason: FailureReason::None,
            reset_role_attempted: false,
            reset_all_attempted: false,
            rollback_failed: false,
        }
    }
}

/// Successful sandbox run: the body's value plus the session audit trail.
#[derive(Debug)]
pub struct SandboxOutcome<T> {
    pub value: T,
    pub result: SandboxResult,
}

/// Sandbox failure. Both variants carry the audit trail so callers can see
/// whether rollback and reset succeeded before deciding to retry.
#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    #[error("query execution failed ({reason}): {source}")]
    Execution {
        reason: FailureReason,
        #[source]
        source: DriverError,
        result: SandboxResult,
    },

    #[error("session state drift after reset: {field} expected {expected:?}, observed {observed:?}")]
    StateDrift {
        field: String,
        expected: String,
        observed: String,
        result: SandboxResult,
    },
}

impl SandboxError {
    pub fn result(&self) -> &SandboxResult {
        match self {
            Self::Execution { result, .. } | Self::StateDrift { result, .. } => result,
        }
    }
}

/// Sandbox lifecycle phases, for tracing only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    TransactionOpen,
    Executing,
    Committing,
    RollingBack,
    StateReset,
    Closed,
}

fn transition(phase: &mut Phase, next: Phase) {
    tracing::trace!(from = ?phase, to = ?next, "sandbox transition");
    *phase = next;
}

/// Wrap a fetch of one SQL string as a sandbox body.
pub fn fetch_body(
    sql: impl Into<String>,
) -> impl for<'c> FnOnce(&'c mut dyn PooledConnection) -> BoxFuture<'c, Result<QueryOutput, DriverError>>
{
    let sql = sql.into();
    move |conn| Box::pin(async move { conn.fetch(&sql).await })
}

/// Runs query bodies under the session discipline configured for one
/// provider. Stateless; one instance per (provider, settings) pair.
pub struct ExecutionSandbox {
    caps: BackendCapabilities,
    settings: SessionGuardrailSettings,
    baseline: SessionBaseline,
}

impl ExecutionSandbox {
    /// Settings must already be validated against `caps`
    /// ([`SessionGuardrailSettings::validate_against`]); the sandbox trusts
    /// them.
    pub fn new(caps: BackendCapabilities, settings: SessionGuardrailSettings) -> Self {
        Self {
            caps,
            settings,
            baseline: SessionBaseline::default(),
        }
    }

    /// Override the expected post-reset session baseline.
    pub fn with_baseline(mut self, baseline: SessionBaseline) -> Self {
        self.baseline = baseline;
        self
    }

    /// Run `body` under the full discipline.
    ///
    /// On every path, success or failure, the session reset runs exactly
    /// once before this returns. A failure of the reset itself is surfaced:
    /// as a degraded `state_clean` on an already-failing run, or as the
    /// error on an otherwise clean one.
    pub async fn run<T>(
        &self,
        conn: &mut dyn PooledConnection,
        body: impl for<'c> FnOnce(&'c mut dyn PooledConnection) -> BoxFuture<'c, Result<T, DriverError>>,
    ) -> Result<SandboxOutcome<T>, SandboxError> {
        let mut result = SandboxResult::default();
        let mut phase = Phase::Idle;
        let use_txn = self.settings.sandbox_enabled && self.caps.supports_transactions;

        let executed: Result<T, DriverError> = match self.enter(conn, use_txn, &mut phase).await {
            Ok(()) => {
                transition(&mut phase, Phase::Executing);
                match body(conn).await {
                    Ok(value) if use_txn => {
                        transition(&mut phase, Phase::Committing);
                        match conn.execute("COMMIT").await {
                            Ok(_) => {
                                result.committed = true;
                                Ok(value)
                            }
                            Err(e) => Err(e),
                        }
                    }
                    other => other,
                }
            }
            Err(e) => Err(e),
        };

        match executed {
            Ok(value) => {
                transition(&mut phase, Phase::StateReset);
                if let Some(reset_err) = self.reset(conn, &mut result).await {
                    // The query succeeded but the connection's state is now
                    // unknown; that cannot be reported as success.
                    result.failure_reason = classify(&reset_err);
                    transition(&mut phase, Phase::Closed);
                    return Err(SandboxError::Execution {
                        reason: result.failure_reason,
                        source: reset_err,
                        result,
                    });
                }
                result.state_clean = true;
                if self.settings.strict_state_check {
                    result = self.verify_baseline(conn, result).await?;
                }
                transition(&mut phase, Phase::Closed);
                Ok(SandboxOutcome { value, result })
            }
            Err(source) => {
                let reason = classify(&source);
                result.failure_reason = reason;
                if use_txn {
                    transition(&mut phase, Phase::RollingBack);
                    result.rolled_back = true;
                    if let Err(rb) = conn.execute("ROLLBACK").await {
                        result.rollback_failed = true;
                        tracing::warn!(error = %rb, "rollback failed after execution error");
                    }
                }
                transition(&mut phase, Phase::StateReset);
                let mut cleanup_clean = !result.rollback_failed;
                if let Some(reset_err) = self.reset(conn, &mut result).await {
                    cleanup_clean = false;
                    result.rollback_failed = true;
                    tracing::warn!(error = %reset_err, "session reset failed during error cleanup");
                }
                result.state_clean = cleanup_clean;
                transition(&mut phase, Phase::Closed);
                Err(SandboxError::Execution {
                    reason,
                    source,
                    result,
                })
            }
        }
    }

    async fn enter(
        &self,
        conn: &mut dyn PooledConnection,
        use_txn: bool,
        phase: &mut Phase,
    ) -> Result<(), DriverError> {
        if self.settings.restricted_session_enabled {
            conn.execute("SET default_transaction_read_only = on").await?;
        }
        if use_txn {
            transition(phase, Phase::TransactionOpen);
            if self.caps.enforces_statement_read_only {
                // Read-only is session-scoped on this engine; the transaction
                // only delimits rollback.
                conn.execute("SET SESSION CHARACTERISTICS AS TRANSACTION READ ONLY")
                    .await?;
                conn.execute("BEGIN").await?;
            } else {
                conn.execute("BEGIN READ ONLY").await?;
            }
        }
        if self.settings.execution_role_enabled {
            let name = self
                .settings
                .execution_role_name
                .as_deref()
                .unwrap_or_default();
            let role = safe_role(name)?;
            let stmt = if use_txn {
                format!("SET LOCAL ROLE {role}")
            } else {
                format!("SET ROLE {role}")
            };
            conn.execute(&stmt).await?;
        }
        Ok(())
    }

    /// Reset session state. `RESET ALL` is attempted even when `RESET ROLE`
    /// fails; the first error is returned.
    async fn reset(
        &self,
        conn: &mut dyn PooledConnection,
        result: &mut SandboxResult,
    ) -> Option<DriverError> {
        let mut first_err: Option<DriverError> = None;
        result.reset_role_attempted = true;
        if let Err(e) = conn.execute("RESET ROLE").await {
            tracing::warn!(error = %e, "RESET ROLE failed");
            first_err.get_or_insert(e);
        }
        result.reset_all_attempted = true;
        if let Err(e) = conn.execute("RESET ALL").await {
            tracing::warn!(error = %e, "RESET ALL failed");
            first_err.get_or_insert(e);
        }
        first_err
    }

    /// Re-read live session state and compare against the baseline. Any
    /// mismatch, and any failure of the probe itself, is drift.
    async fn verify_baseline(
        &self,
        conn: &mut dyn PooledConnection,
        mut result: SandboxResult,
    ) -> Result<SandboxResult, SandboxError> {
        let output = match conn.fetch(SESSION_PROBE_SQL).await {
            Ok(output) => output,
            Err(e) => {
                result.state_clean = false;
                result.failure_reason = FailureReason::StateDrift;
                return Err(SandboxError::StateDrift {
                    field: "probe".to_string(),
                    expected: "session state readable".to_string(),
                    observed: e.to_string(),
                    result,
                });
            }
        };

        let observed: Vec<String> = output
            .rows
            .first()
            .map(|row| row.iter().map(value_as_string).collect())
            .unwrap_or_default();
        let expected = [
            ("role", &self.baseline.role),
            ("search_path", &self.baseline.search_path),
            ("statement_timeout", &self.baseline.statement_timeout),
        ];
        for (idx, (field, want)) in expected.iter().enumerate() {
            let got = observed.get(idx).cloned().unwrap_or_default();
            if got != **want {
                result.state_clean = false;
                result.failure_reason = FailureReason::StateDrift;
                tracing::error!(
                    field,
                    expected = %want,
                    observed = %got,
                    "session state drift after reset"
                );
                return Err(SandboxError::StateDrift {
                    field: field.to_string(),
                    expected: (*want).clone(),
                    observed: got,
                    result,
                });
            }
        }
        Ok(result)
    }
}

fn value_as_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Role names are interpolated into `SET ROLE`; reject anything that could
/// break out of the identifier position. Configuration validation catches
/// empty names earlier, this is the last line.
fn safe_role(name: &str) -> Result<&str, DriverError> {
    let bad_char = |c: char| {
        c.is_whitespace() || matches!(c, '"' | '\'' | ';' | '`' | '\\' | '\0' | '(' | ')')
    };
    if name.is_empty() || name.len() > 128 || name.chars().any(bad_char) {
        return Err(DriverError::query(format!(
            "invalid execution role name: {name:?}"
        )));
    }
    Ok(name)
}
