//! Keelson runtime: admission control, the execution sandbox and the
//! governance facade.
//!
//! The facade is [`governor::Governor`]; everything else here is its
//! machinery. Connection pooling is abstracted behind [`pool`] so the
//! runtime stays driver-agnostic.

pub mod admission;
pub mod failure;
pub mod governor;
pub mod pool;
pub mod sandbox;

pub use admission::{AdmissionController, AdmissionError, TenantLease};
pub use failure::{classify, FailureReason};
pub use governor::{Governor, GovernorOptions};
pub use pool::{ConnectionPool, DriverError, DriverErrorKind, PooledConnection};
pub use sandbox::{
    ExecutionSandbox, SandboxError, SandboxOutcome, SandboxResult, SessionBaseline,
};
