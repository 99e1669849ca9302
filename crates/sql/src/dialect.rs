//! Provider-name to parser-dialect routing.

use sqlparser::dialect::{
    AnsiDialect, BigQueryDialect, ClickHouseDialect, DatabricksDialect, Dialect, DuckDbDialect,
    GenericDialect, MySqlDialect, PostgreSqlDialect, RedshiftSqlDialect, SQLiteDialect,
    SnowflakeDialect,
};

/// Resolve the parser dialect for a provider name.
///
/// Total: unknown providers fall back to the generic dialect so analysis can
/// still run (capability lookup handles the policy side of unknown engines).
pub fn dialect_for(provider: &str) -> Box<dyn Dialect> {
    match provider.to_ascii_lowercase().as_str() {
        "postgres" | "postgresql" => Box::new(PostgreSqlDialect {}),
        "cockroachdb" | "cockroach" => Box::new(PostgreSqlDialect {}),
        "mysql" => Box::new(MySqlDialect {}),
        "sqlite" => Box::new(SQLiteDialect {}),
        "redshift" => Box::new(RedshiftSqlDialect {}),
        "snowflake" => Box::new(SnowflakeDialect {}),
        "bigquery" => Box::new(BigQueryDialect {}),
        // Athena speaks Trino SQL, which the ANSI dialect covers closely
        // enough for structural analysis.
        "athena" => Box::new(AnsiDialect {}),
        "databricks" => Box::new(DatabricksDialect {}),
        "duckdb" => Box::new(DuckDbDialect {}),
        "clickhouse" => Box::new(ClickHouseDialect {}),
        _ => Box::new(GenericDialect {}),
    }
}
