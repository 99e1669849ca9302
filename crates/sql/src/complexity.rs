//! Structural complexity analysis of SQL queries.
//!
//! Generated SQL is analyzed before any database contact: the AST is walked
//! for joins (explicit operators plus implicit comma joins), CTEs, nested
//! expression subqueries, cartesian products, and projection width, and the
//! resulting metrics are checked against configured limits in a fixed
//! priority order so rejection is deterministic even when several limits are
//! breached at once.

use crate::dialect::dialect_for;
use keelson_common::config::ComplexityLimits;
use serde::{Deserialize, Serialize};
use sqlparser::ast::{
    Expr, GroupByExpr, JoinConstraint, JoinOperator, Query, Select, SelectItem, SetExpr, Statement,
    TableFactor, TableWithJoins,
};
use sqlparser::parser::{Parser, ParserError};

/// Score weights. A cartesian product dominates everything else because its
/// cost is multiplicative, not additive.
const JOIN_WEIGHT: u32 = 3;
const CTE_WEIGHT: u32 = 2;
const DEPTH_WEIGHT: u32 = 4;
const CARTESIAN_WEIGHT: u32 = 10;
const FREE_PROJECTIONS: u32 = 10;

/// Structural metrics computed for one query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplexityMetrics {
    pub joins: u32,
    pub ctes: u32,
    pub subquery_depth: u32,
    pub has_cartesian: bool,
    pub projection_count: u32,
    pub score: u32,
}

/// The first limit breached during evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplexityViolation {
    pub limit_name: String,
    pub measured: u64,
    pub limit: u64,
}

/// Analysis failure: the SQL never made it to metrics.
#[derive(Debug, thiserror::Error)]
pub enum ComplexityError {
    #[error("SQL parse error: {0}")]
    Parse(#[from] ParserError),
    #[error("SQL input contains no statement")]
    Empty,
}

/// Parse `sql` with the provider's dialect and compute structural metrics.
///
/// Multi-statement input aggregates joins/CTEs across statements and takes
/// the maximum subquery depth; the projection count comes from the first
/// top-level SELECT.
pub fn analyze(sql: &str, provider: &str) -> Result<ComplexityMetrics, ComplexityError> {
    let dialect = dialect_for(provider);
    let statements = Parser::parse_sql(dialect.as_ref(), sql)?;
    if statements.is_empty() {
        return Err(ComplexityError::Empty);
    }

    let mut walker = AstWalker::default();
    let mut depth = 0u32;
    for statement in &statements {
        if let Statement::Query(query) = statement {
            depth = depth.max(walker.query(query, true));
        }
    }

    let projection_count = walker.projection_count.unwrap_or(0);
    let metrics = ComplexityMetrics {
        joins: walker.joins,
        ctes: walker.ctes,
        subquery_depth: depth,
        has_cartesian: walker.has_cartesian,
        projection_count,
        score: score(
            walker.joins,
            walker.ctes,
            depth,
            walker.has_cartesian,
            projection_count,
        ),
    };
    tracing::debug!(?metrics, "computed complexity metrics");
    Ok(metrics)
}

fn score(joins: u32, ctes: u32, depth: u32, cartesian: bool, projections: u32) -> u32 {
    JOIN_WEIGHT * joins
        + CTE_WEIGHT * ctes
        + DEPTH_WEIGHT * depth
        + if cartesian { CARTESIAN_WEIGHT } else { 0 }
        + projections.saturating_sub(FREE_PROJECTIONS)
}

/// Check metrics against limits in fixed priority order:
/// joins → ctes → subquery_depth → cartesian → projection_count → score.
/// Returns the first breach only.
pub fn evaluate(
    metrics: &ComplexityMetrics,
    limits: &ComplexityLimits,
) -> Option<ComplexityViolation> {
    if metrics.joins > limits.max_joins {
        return Some(violation("joins", metrics.joins, limits.max_joins));
    }
    if metrics.ctes > limits.max_ctes {
        return Some(violation("ctes", metrics.ctes, limits.max_ctes));
    }
    if metrics.subquery_depth > limits.max_subquery_depth {
        return Some(violation(
            "subquery_depth",
            metrics.subquery_depth,
            limits.max_subquery_depth,
        ));
    }
    if limits.disallow_cartesian && metrics.has_cartesian {
        return Some(violation("cartesian", 1, 0));
    }
    if let Some(max_projections) = limits.max_projection_count {
        if metrics.projection_count > max_projections {
            return Some(violation(
                "projection_count",
                metrics.projection_count,
                max_projections,
            ));
        }
    }
    if metrics.score > limits.max_complexity_score {
        return Some(violation("score", metrics.score, limits.max_complexity_score));
    }
    None
}

fn violation(name: &str, measured: u32, limit: u32) -> ComplexityViolation {
    ComplexityViolation {
        limit_name: name.to_string(),
        measured: measured as u64,
        limit: limit as u64,
    }
}

/// Recursive-descent metric collector.
///
/// Join counting covers explicit operators plus implicit comma joins (FROM
/// entries beyond the first behave as joins without the syntax). Depth counts
/// expression-level subqueries only; derived tables and set operations are
/// descended without incrementing.
#[derive(Default)]
struct AstWalker {
    joins: u32,
    ctes: u32,
    has_cartesian: bool,
    projection_count: Option<u32>,
}

impl AstWalker {
    fn query(&mut self, query: &Query, top: bool) -> u32 {
        let mut depth = 0;
        if let Some(with) = &query.with {
            self.ctes += with.cte_tables.len() as u32;
            for cte in &with.cte_tables {
                depth = depth.max(self.query(&cte.query, false));
            }
        }
        depth.max(self.set_expr(&query.body, top))
    }

    fn set_expr(&mut self, body: &SetExpr, top: bool) -> u32 {
        match body {
            SetExpr::Select(select) => self.select(select, top),
            SetExpr::Query(query) => self.query(query, top),
            // The first SELECT of a set operation carries the query's
            // projection shape.
            SetExpr::SetOperation { left, right, .. } => {
                self.set_expr(left, top).max(self.set_expr(right, false))
            }
            _ => 0,
        }
    }

    fn select(&mut self, select: &Select, top: bool) -> u32 {
        if top && self.projection_count.is_none() {
            self.projection_count = Some(select.projection.len() as u32);
        }

        // Implicit comma joins
        self.joins += select.from.len().saturating_sub(1) as u32;

        let mut depth = 0;
        for table in &select.from {
            depth = depth.max(self.table_with_joins(table));
        }
        for item in &select.projection {
            match item {
                SelectItem::UnnamedExpr(expr) | SelectItem::ExprWithAlias { expr, .. } => {
                    depth = depth.max(self.expr(expr));
                }
                _ => {}
            }
        }
        if let Some(expr) = &select.selection {
            depth = depth.max(self.expr(expr));
        }
        if let GroupByExpr::Expressions(exprs, _) = &select.group_by {
            for expr in exprs {
                depth = depth.max(self.expr(expr));
            }
        }
        if let Some(expr) = &select.having {
            depth = depth.max(self.expr(expr));
        }
        depth
    }

    fn table_with_joins(&mut self, table: &TableWithJoins) -> u32 {
        let mut depth = self.table_factor(&table.relation);
        for join in &table.joins {
            self.joins += 1;
            depth = depth.max(self.table_factor(&join.relation));
            match &join.join_operator {
                JoinOperator::CrossJoin => self.has_cartesian = true,
                JoinOperator::Join(constraint)
                | JoinOperator::Inner(constraint)
                | JoinOperator::Left(constraint)
                | JoinOperator::LeftOuter(constraint)
                | JoinOperator::Right(constraint)
                | JoinOperator::RightOuter(constraint)
                | JoinOperator::FullOuter(constraint)
                | JoinOperator::Semi(constraint)
                | JoinOperator::LeftSemi(constraint)
                | JoinOperator::RightSemi(constraint)
                | JoinOperator::Anti(constraint)
                | JoinOperator::LeftAnti(constraint)
                | JoinOperator::RightAnti(constraint) => match constraint {
                    JoinConstraint::On(expr) => depth = depth.max(self.expr(expr)),
                    JoinConstraint::Using(_) | JoinConstraint::Natural => {}
                    JoinConstraint::None => self.has_cartesian = true,
                },
                _ => {}
            }
        }
        depth
    }

    fn table_factor(&mut self, factor: &TableFactor) -> u32 {
        match factor {
            TableFactor::Derived { subquery, .. } => self.query(subquery, false),
            TableFactor::NestedJoin {
                table_with_joins, ..
            } => self.table_with_joins(table_with_joins),
            _ => 0,
        }
    }

    fn expr(&mut self, expr: &Expr) -> u32 {
        match expr {
            Expr::Subquery(query) => 1 + self.query(query, false),
            Expr::Exists { subquery, .. } => 1 + self.query(subquery, false),
            Expr::InSubquery { expr, subquery, .. } => {
                self.expr(expr).max(1 + self.query(subquery, false))
            }
            Expr::BinaryOp { left, right, .. } => self.expr(left).max(self.expr(right)),
            Expr::AnyOp { left, right, .. } | Expr::AllOp { left, right, .. } => {
                self.expr(left).max(self.expr(right))
            }
            Expr::UnaryOp { expr, .. }
            | Expr::Nested(expr)
            | Expr::Cast { expr, .. }
            | Expr::IsNull(expr)
            | Expr::IsNotNull(expr)
            | Expr::IsTrue(expr)
            | Expr::IsNotTrue(expr)
            | Expr::IsFalse(expr)
            | Expr::IsNotFalse(expr) => self.expr(expr),
            Expr::InList { expr, list, .. } => {
                let mut depth = self.expr(expr);
                for item in list {
                    depth = depth.max(self.expr(item));
                }
                depth
            }
            Expr::Between {
                expr, low, high, ..
            } => self.expr(expr).max(self.expr(low)).max(self.expr(high)),
            Expr::Tuple(exprs) => exprs.iter().map(|e| self.expr(e)).fold(0, u32::max),
            _ => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics(sql: &str) -> ComplexityMetrics {
        analyze(sql, "postgres").unwrap()
    }

    #[test]
    fn test_counts_explicit_joins() {
        let m = metrics("SELECT * FROM a INNER JOIN b ON a.id = b.id LEFT JOIN c ON b.id = c.id");
        assert_eq!(m.joins, 2);
        assert!(!m.has_cartesian);
    }

    #[test]
    fn test_counts_implicit_comma_joins() {
        let m = metrics("SELECT * FROM a, b, c WHERE a.id = b.id AND b.id = c.id");
        assert_eq!(m.joins, 2);
        assert!(!m.has_cartesian);
    }

    #[test]
    fn test_cross_join_is_cartesian() {
        let m = metrics("SELECT * FROM a CROSS JOIN b");
        assert_eq!(m.joins, 1);
        assert!(m.has_cartesian);
    }

    #[test]
    fn test_join_without_predicate_is_cartesian() {
        let m = metrics("SELECT * FROM a JOIN b");
        assert!(m.has_cartesian);
    }

    #[test]
    fn test_natural_and_using_joins_are_not_cartesian() {
        assert!(!metrics("SELECT * FROM a NATURAL JOIN b").has_cartesian);
        assert!(!metrics("SELECT * FROM a JOIN b USING (id)").has_cartesian);
    }

    #[test]
    fn test_subquery_depth_nested() {
        let m = metrics(
            "SELECT * FROM t1 WHERE EXISTS \
             (SELECT 1 FROM t2 WHERE t2.x IN (SELECT y FROM t3))",
        );
        assert_eq!(m.subquery_depth, 2);
    }

    #[test]
    fn test_derived_table_does_not_increment_depth() {
        let m = metrics("SELECT * FROM (SELECT a FROM t) sub");
        assert_eq!(m.subquery_depth, 0);
    }

    #[test]
    fn test_derived_table_inner_subquery_still_counts() {
        let m = metrics("SELECT * FROM (SELECT a FROM t WHERE a IN (SELECT b FROM u)) sub");
        assert_eq!(m.subquery_depth, 1);
    }

    #[test]
    fn test_counts_ctes() {
        let m = metrics("WITH x AS (SELECT 1), y AS (SELECT 2) SELECT * FROM x, y");
        assert_eq!(m.ctes, 2);
    }

    #[test]
    fn test_projection_count_is_top_level_only() {
        let m = metrics("SELECT a, b, (SELECT max(c) FROM t2) FROM t1");
        assert_eq!(m.projection_count, 3);
        assert_eq!(m.subquery_depth, 1);
    }

    #[test]
    fn test_union_projection_count_comes_from_first_branch() {
        let m = metrics("SELECT a, b FROM t UNION SELECT c, d FROM u");
        assert_eq!(m.projection_count, 2);

        let wide = ComplexityMetrics {
            projection_count: 0,
            ..m
        };
        let limits = ComplexityLimits {
            max_projection_count: Some(1),
            ..Default::default()
        };
        // The gate must see the real projection width, not zero.
        assert!(evaluate(&m, &limits).is_some());
        assert!(evaluate(&wide, &limits).is_none());
    }

    #[test]
    fn test_score_formula() {
        // 2 joins, 1 cte, depth 1, no cartesian, 3 projections
        let m = metrics(
            "WITH x AS (SELECT 1 AS id) \
             SELECT a.p, b.q, c.r FROM a \
             JOIN b ON a.id = b.id JOIN c ON b.id = c.id \
             WHERE a.id IN (SELECT id FROM x)",
        );
        assert_eq!(m.joins, 2);
        assert_eq!(m.ctes, 1);
        assert_eq!(m.subquery_depth, 1);
        assert_eq!(m.projection_count, 3);
        assert_eq!(m.score, 3 * 2 + 2 * 1 + 4 * 1);
    }

    #[test]
    fn test_parse_error_is_distinct() {
        let err = analyze("SELEKT * FORM t", "postgres").unwrap_err();
        assert!(matches!(err, ComplexityError::Parse(_)));
    }

    #[test]
    fn test_empty_input_is_distinct() {
        let err = analyze("  ", "postgres").unwrap_err();
        assert!(matches!(
            err,
            ComplexityError::Empty | ComplexityError::Parse(_)
        ));
    }

    #[test]
    fn test_evaluate_priority_order() {
        // Both joins and ctes breached; joins must win.
        let m = ComplexityMetrics {
            joins: 9,
            ctes: 9,
            subquery_depth: 9,
            has_cartesian: true,
            projection_count: 99,
            score: 999,
        };
        let limits = ComplexityLimits {
            max_joins: 8,
            max_ctes: 6,
            max_subquery_depth: 3,
            disallow_cartesian: true,
            max_complexity_score: 60,
            max_projection_count: Some(10),
        };
        let v = evaluate(&m, &limits).unwrap();
        assert_eq!(v.limit_name, "joins");
        assert_eq!(v.measured, 9);
        assert_eq!(v.limit, 8);
    }

    #[test]
    fn test_evaluate_projection_gate_disabled_when_unset() {
        let m = ComplexityMetrics {
            joins: 0,
            ctes: 0,
            subquery_depth: 0,
            has_cartesian: false,
            projection_count: 500,
            score: 490,
        };
        let limits = ComplexityLimits {
            max_complexity_score: 1000,
            ..Default::default()
        };
        assert_eq!(evaluate(&m, &limits), None);
    }

    #[test]
    fn test_evaluate_score_is_last() {
        let m = ComplexityMetrics {
            joins: 1,
            ctes: 0,
            subquery_depth: 0,
            has_cartesian: false,
            projection_count: 1,
            score: 100,
        };
        let limits = ComplexityLimits {
            max_complexity_score: 50,
            ..Default::default()
        };
        let v = evaluate(&m, &limits).unwrap();
        assert_eq!(v.limit_name, "score");
    }
}
