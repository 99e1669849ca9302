//! Shared test fixture: an in-process pool that simulates one reusable
//! database session, so tests can observe exactly which statements ran and
//! what state the connection was left in.
#![allow(dead_code)]

use async_trait::async_trait;
use keelson_common::models::QueryOutput;
use keelson_runtime::pool::{ConnectionPool, DriverError, PooledConnection};
use keelson_runtime::sandbox::SESSION_PROBE_SQL;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;

/// Mutable session state of the simulated physical connection.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionState {
    pub role: String,
    pub search_path: String,
    pub statement_timeout: String,
    pub in_transaction: bool,
    pub txn_read_only: bool,
    pub session_read_only: bool,
    saved_role: Option<String>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            role: "none".to_string(),
            search_path: "public".to_string(),
            statement_timeout: "0".to_string(),
            in_transaction: false,
            txn_read_only: false,
            session_read_only: false,
            saved_role: None,
        }
    }
}

/// Fault injection switches.
#[derive(Debug, Clone, Default)]
pub struct SimFaults {
    pub fail_rollback: bool,
    pub fail_reset_role: bool,
    pub fail_reset_all: bool,
    /// `RESET ROLE` reports success but leaves the role in place.
    pub sticky_role: bool,
}

/// State shared by every connection the pool hands out; models a pool of
/// size one where session state survives check-in.
pub struct SimShared {
    pub state: Mutex<SessionState>,
    pub log: Mutex<Vec<String>>,
    pub faults: Mutex<SimFaults>,
    pub acquires: AtomicUsize,
    /// Queries containing `BLOCK` wait for a permit here.
    pub block_gate: Semaphore,
}

impl SimShared {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(SessionState::default()),
            log: Mutex::new(Vec::new()),
            faults: Mutex::new(SimFaults::default()),
            acquires: AtomicUsize::new(0),
            block_gate: Semaphore::new(0),
        })
    }

    pub fn log(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    pub fn state(&self) -> SessionState {
        self.state.lock().unwrap().clone()
    }

    pub fn set_faults(&self, faults: SimFaults) {
        *self.faults.lock().unwrap() = faults;
    }

    pub fn acquires(&self) -> usize {
        self.acquires.load(Ordering::SeqCst)
    }

    pub fn release_blocked(&self, n: usize) {
        self.block_gate.add_permits(n);
    }
}

pub struct SimPool {
    pub shared: Arc<SimShared>,
}

impl SimPool {
    pub fn new(shared: Arc<SimShared>) -> Self {
        Self { shared }
    }
}

#[async_trait]
impl ConnectionPool for SimPool {
    async fn acquire(&self) -> Result<Box<dyn PooledConnection>, DriverError> {
        self.shared.acquires.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(SimConnection {
            shared: Arc::clone(&self.shared),
        }))
    }
}

pub struct SimConnection {
    pub shared: Arc<SimShared>,
}

impl SimConnection {
    pub fn new(shared: Arc<SimShared>) -> Self {
        Self { shared }
    }

    fn apply_control(&self, sql: &str) -> Result<(), DriverError> {
        let faults = self.shared.faults.lock().unwrap().clone();
        let mut state = self.shared.state.lock().unwrap();
        match sql {
            "SET default_transaction_read_only = on"
            | "SET SESSION CHARACTERISTICS AS TRANSACTION READ ONLY" => {
                state.session_read_only = true;
            }
            "BEGIN" | "BEGIN READ ONLY" => {
                state.in_transaction = true;
                state.txn_read_only = sql.contains("READ ONLY") || state.session_read_only;
                state.saved_role = Some(state.role.clone());
            }
            "COMMIT" => {
                state.in_transaction = false;
                if let Some(role) = state.saved_role.take() {
                    state.role = role;
                }
            }
            "ROLLBACK" => {
                if faults.fail_rollback {
                    return Err(DriverError::query("rollback failed: connection busy"));
                }
                state.in_transaction = false;
                if let Some(role) = state.saved_role.take() {
                    state.role = role;
                }
            }
            "RESET ROLE" => {
                if faults.fail_reset_role {
                    return Err(DriverError::connection(
                        "server closed the connection unexpectedly",
                    ));
                }
                if !faults.sticky_role {
                    state.role = "none".to_string();
                }
            }
            "RESET ALL" => {
                if faults.fail_reset_all {
                    return Err(DriverError::connection(
                        "server closed the connection unexpectedly",
                    ));
                }
                state.search_path = "public".to_string();
                state.statement_timeout = "0".to_string();
                state.session_read_only = false;
            }
            other => {
                if let Some(role) = other.strip_prefix("SET LOCAL ROLE ") {
                    if !state.in_transaction {
                        return Err(DriverError::query(
                            "SET LOCAL can only be used in transaction blocks",
                        ));
                    }
                    state.role = role.to_string();
                } else if let Some(role) = other.strip_prefix("SET ROLE ") {
                    state.role = role.to_string();
                    state.saved_role = None;
                }
                // Anything else is accepted without effect.
            }
        }
        Ok(())
    }
}

#[async_trait]
impl PooledConnection for SimConnection {
    async fn execute(&mut self, sql: &str) -> Result<u64, DriverError> {
        self.shared.log.lock().unwrap().push(sql.to_string());
        self.apply_control(sql)?;
        Ok(0)
    }

    async fn fetch(&mut self, sql: &str) -> Result<QueryOutput, DriverError> {
        self.shared.log.lock().unwrap().push(sql.to_string());
        if sql == SESSION_PROBE_SQL {
            let state = self.shared.state.lock().unwrap();
            return Ok(QueryOutput {
                columns: vec![
                    "role".to_string(),
                    "search_path".to_string(),
                    "statement_timeout".to_string(),
                ],
                rows: vec![vec![
                    state.role.clone().into(),
                    state.search_path.clone().into(),
                    state.statement_timeout.clone().into(),
                ]],
            });
        }
        if sql.contains("BLOCK") {
            let permit = self
                .shared
                .block_gate
                .acquire()
                .await
                .map_err(|_| DriverError::connection("block gate closed"))?;
            permit.forget();
        }
        if sql.contains("SLOW") {
            return Err(DriverError::query(
                "ERROR: canceling statement due to statement timeout",
            ));
        }
        if sql.contains("FAIL") {
            return Err(DriverError::query(
                "ERROR: relation \"missing\" does not exist",
            ));
        }
        Ok(QueryOutput {
            columns: vec!["result".to_string()],
            rows: vec![vec![serde_json::json!(1)]],
        })
    }
}
