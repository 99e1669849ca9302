//! Core SQL analysis for Keelson.
//!
//! This crate inspects SQL destined for heterogeneous backends before any
//! database contact happens:
//! - **Dialects**: provider-name to `sqlparser` dialect routing (`dialect`).
//! - **Complexity**: structural risk metrics and limit evaluation
//!   (`complexity`).
pub mod complexity;
pub mod dialect;

pub use complexity::{
    analyze, evaluate, ComplexityError, ComplexityMetrics, ComplexityViolation,
};
pub use dialect::dialect_for;
