//! Data ingestion layer for CSP telemetry.
//!
//! Reads CSP violation logs, URL safety maps and load-time measurements from
//! disk and folds them into the finished values defined in `telemetry-core`.

pub mod aggregator;
pub mod classifier;
pub mod evaluation;
pub mod load_times;
pub mod reader;

pub use telemetry_core as core;
