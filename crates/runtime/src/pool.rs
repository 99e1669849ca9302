//! Connection pool seams.
//!
//! The governor never talks to a concrete driver; it runs against these two
//! traits so the sandbox discipline (transactions, role switch, session
//! reset) is testable without a live database and portable across drivers.

use async_trait::async_trait;
use keelson_common::models::QueryOutput;
use std::fmt;

/// Coarse classification a driver can attach to its errors. Drivers that
/// cannot tell leave `Query` and let the message-based classifier decide.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverErrorKind {
    /// The statement was cancelled by a deadline or server-side timeout.
    Timeout,
    /// The backend rejected or failed the statement.
    Query,
    /// The connection itself is broken.
    Connection,
}

/// Error surfaced by a driver for a single statement.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct DriverError {
    pub kind: DriverErrorKind,
    pub message: String,
}

impl DriverError {
    pub fn timeout(message: impl Into<String>) -> Self {
        Self {
            kind: DriverErrorKind::Timeout,
            message: message.into(),
        }
    }

    pub fn query(message: impl Into<String>) -> Self {
        Self {
            kind: DriverErrorKind::Query,
            message: message.into(),
        }
    }

    pub fn connection(message: impl Into<String>) -> Self {
        Self {
            kind: DriverErrorKind::Connection,
            message: message.into(),
        }
    }
}

impl fmt::Display for DriverErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Timeout => "timeout",
            Self::Query => "query",
            Self::Connection => "connection",
        };
        write!(f, "{}", s)
    }
}

/// One checked-out connection. Session state set on it survives until reset,
/// which is exactly why the sandbox exists.
#[async_trait]
pub trait PooledConnection: Send {
    /// Run a statement that returns no rows (DDL, SET, BEGIN, ...).
    async fn execute(&mut self, sql: &str) -> Result<u64, DriverError>;

    /// Run a statement and collect its result rows.
    async fn fetch(&mut self, sql: &str) -> Result<QueryOutput, DriverError>;
}

/// Hands out pooled connections. Implementations decide sizing and reuse;
/// the governor only requires that `acquire` yields a usable connection.
#[async_trait]
pub trait ConnectionPool: Send + Sync {
    async fn acquire(&self) -> Result<Box<dyn PooledConnection>, DriverError>;
}
