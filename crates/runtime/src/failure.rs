//! Driver failure classification.
//!
//! Maps raw driver errors to a small closed set of reasons via an ordered
//! rule table. Typed timeouts short-circuit; everything unmatched is a plain
//! query error so unknown failures never masquerade as transient.

use crate::pool::{DriverError, DriverErrorKind};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;

/// Closed set of sandbox failure reasons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureReason {
    /// No failure recorded.
    None,
    /// The backend rejected or failed the query.
    QueryError,
    /// The query was cancelled by a deadline or statement timeout.
    Timeout,
    /// Post-reset session state did not match the baseline.
    StateDrift,
}

impl FailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "NONE",
            Self::QueryError => "QUERY_ERROR",
            Self::Timeout => "TIMEOUT",
            Self::StateDrift => "STATE_DRIFT",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

struct Rule {
    pattern: Regex,
    reason: FailureReason,
}

fn rule(pattern: &str, reason: FailureReason) -> Rule {
    Rule {
        // Patterns are literals known to compile.
        pattern: Regex::new(pattern).unwrap_or_else(|e| {
            panic!("invalid failure classification pattern {pattern:?}: {e}")
        }),
        reason,
    }
}

/// Ordered rule table for message-based classification. Covers the timeout
/// phrasings of the engines we route to plus the Postgres query_canceled
/// SQLSTATE.
static RULES: LazyLock<Vec<Rule>> = LazyLock::new(|| {
    vec![
        rule(r"(?i)statement timeout", FailureReason::Timeout),
        rule(
            r"(?i)canceling statement due to",
            FailureReason::Timeout,
        ),
        rule(r"(?i)deadline exceeded", FailureReason::Timeout),
        rule(r"(?i)\btimed?[ _-]?out\b", FailureReason::Timeout),
        rule(r"(?i)query exceeded.*(time|duration)", FailureReason::Timeout),
        rule(r"\b57014\b", FailureReason::Timeout),
    ]
});

/// Classify a driver error. `DriverErrorKind::Timeout` wins unconditionally;
/// otherwise the first matching message rule decides, defaulting to
/// [`FailureReason::QueryError`].
pub fn classify(error: &DriverError) -> FailureReason {
    if error.kind == DriverErrorKind::Timeout {
        return FailureReason::Timeout;
    }
    for rule in RULES.iter() {
        if rule.pattern.is_match(&error.message) {
            return rule.reason;
        }
    }
    FailureReason::QueryError
}
