//! End-to-end analyzer behavior across dialects and limit interactions.

use keelson_common::config::ComplexityLimits;
use keelson_sql::{analyze, evaluate};

fn nine_join_query() -> String {
    let mut sql = String::from("WITH w1 AS (SELECT 1 AS id), w2 AS (SELECT 2 AS id), \
         w3 AS (SELECT 3 AS id), w4 AS (SELECT 4 AS id), w5 AS (SELECT 5 AS id), \
         w6 AS (SELECT 6 AS id), w7 AS (SELECT 7 AS id) SELECT t0.id FROM t0");
    for i in 1..=9 {
        sql.push_str(&format!(" JOIN t{i} ON t0.id = t{i}.id"));
    }
    sql
}

#[test]
fn nine_joins_beat_cte_breach_deterministically() {
    // 9 joins and 7 CTEs, with MAX_JOINS=8 and MAX_CTES=6 both violated.
    // The joins violation must win, every time.
    let limits = ComplexityLimits::default();
    let sql = nine_join_query();

    for _ in 0..10 {
        let metrics = analyze(&sql, "postgres").unwrap();
        assert_eq!(metrics.joins, 9);
        assert_eq!(metrics.ctes, 7);
        let violation = evaluate(&metrics, &limits).unwrap();
        assert_eq!(violation.limit_name, "joins");
        assert_eq!(violation.measured, 9);
        assert_eq!(violation.limit, 8);
    }
}

#[test]
fn identical_sql_yields_identical_metrics() {
    let sql = "SELECT a, b FROM t1 JOIN t2 ON t1.id = t2.id WHERE a IN (SELECT x FROM t3)";
    let first = analyze(sql, "snowflake").unwrap();
    let second = analyze(sql, "snowflake").unwrap();
    assert_eq!(first, second);
}

#[test]
fn dialect_specific_sql_parses_with_routed_dialect() {
    // Backtick-quoted identifiers are MySQL/BigQuery syntax.
    let sql = "SELECT `col one` FROM `my table`";
    assert!(analyze(sql, "mysql").is_ok());
    assert!(analyze(sql, "postgres").is_err());
}

#[test]
fn within_limits_passes() {
    let limits = ComplexityLimits::default();
    let metrics = analyze(
        "SELECT a, b FROM t1 JOIN t2 ON t1.id = t2.id",
        "postgres",
    )
    .unwrap();
    assert_eq!(evaluate(&metrics, &limits), None);
}

#[test]
fn cartesian_rejection_respects_disallow_flag() {
    let metrics = analyze("SELECT * FROM a CROSS JOIN b", "postgres").unwrap();

    let strict = ComplexityLimits::default();
    assert_eq!(
        evaluate(&metrics, &strict).unwrap().limit_name,
        "cartesian"
    );

    let permissive = ComplexityLimits {
        disallow_cartesian: false,
        ..Default::default()
    };
    assert_eq!(evaluate(&metrics, &permissive), None);
}
