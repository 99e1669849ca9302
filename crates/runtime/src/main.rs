//! Demo entry point: wires the governor to a stub in-process pool and runs a
//! couple of governed queries. Real deployments embed [`keelson_runtime`] as
//! a library and supply their own [`ConnectionPool`].

use async_trait::async_trait;
use keelson_common::config::GovernorConfig;
use keelson_common::models::QueryOutput;
use keelson_common::telemetry;
use keelson_runtime::pool::{ConnectionPool, DriverError, PooledConnection};
use keelson_runtime::sandbox::SESSION_PROBE_SQL;
use keelson_runtime::{Governor, GovernorOptions};
use std::sync::Arc;

/// Accepts every statement and returns a canned row. Session statements are
/// acknowledged without effect.
struct StubConnection;

#[async_trait]
impl PooledConnection for StubConnection {
    async fn execute(&mut self, _sql: &str) -> Result<u64, DriverError> {
        Ok(0)
    }

    async fn fetch(&mut self, sql: &str) -> Result<QueryOutput, DriverError> {
        if sql == SESSION_PROBE_SQL {
            return Ok(QueryOutput {
                columns: vec![
                    "role".to_string(),
                    "search_path".to_string(),
                    "statement_timeout".to_string(),
                ],
                rows: vec![vec![
                    "none".into(),
                    "public".into(),
                    "0".into(),
                ]],
            });
        }
        Ok(QueryOutput {
            columns: vec!["ok".to_string()],
            rows: vec![vec![serde_json::json!(1)]],
        })
    }
}

struct StubPool;

#[async_trait]
impl ConnectionPool for StubPool {
    async fn acquire(&self) -> Result<Box<dyn PooledConnection>, DriverError> {
        Ok(Box::new(StubConnection))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = GovernorConfig::from_file("config/keelson.yaml")?;
    telemetry::init_tracing(&config.telemetry)?;
    tracing::info!("Keelson governor starting");

    let governor = Governor::new(GovernorOptions {
        config,
        pool: Arc::new(StubPool),
    });

    for sql in [
        "SELECT id, total FROM orders WHERE tenant_ok = true LIMIT 10",
        "SELECT * FROM a, b, c, d, e, f, g, h, i, j",
    ] {
        match governor.execute(1, sql, "postgres").await {
            Ok(output) => {
                tracing::info!(rows = output.row_count(), "query admitted");
                println!("{}", serde_json::to_string_pretty(&output)?);
            }
            Err(err) => {
                tracing::warn!(code = %err.code, "query rejected");
                println!("{}", err.to_json());
            }
        }
    }

    telemetry::shutdown_telemetry();
    Ok(())
}
