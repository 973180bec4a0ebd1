//! Core types and calculations for CSP telemetry.
//!
//! Holds the data model, the directive alias table, the percentage reporter
//! and the command-line settings shared by the data and binary crates.

pub mod directives;
pub mod error;
pub mod formatting;
pub mod models;
pub mod percentile;
pub mod settings;
pub mod summary;

pub use error::{Result, TelemetryError};
