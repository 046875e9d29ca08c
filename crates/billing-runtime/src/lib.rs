//! Runtime layer for the billing normalizer.
//!
//! Fetches provider exports from local files, runs the provider pipelines
//! concurrently, persists the resulting reports and writes the archival CSV
//! export.

pub mod export;
pub mod orchestrator;
pub mod sources;
pub mod store;

pub use billing_core as core;
pub use billing_data as data;
