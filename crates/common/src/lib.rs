//! Common utilities, types, and configuration shared across Keelson crates.
//!
//! This crate contains the base building blocks for the governance core:
//! - **Capabilities**: per-provider backend feature flags (`capability`).
//! - **Configuration**: strongly typed governor configuration (`config`).
//! - **Models**: shared value types such as query output (`models`).
//! - **Telemetry**: observability setup (`telemetry`).
pub mod capability;
pub mod config;
pub mod models;
pub mod telemetry;
