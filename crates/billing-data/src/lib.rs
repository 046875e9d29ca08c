//! Transformation stages of the billing normalizer.
//!
//! Cleans raw delimited exports, maps provider rows onto the canonical
//! report, consolidates duplicate identities and turns cumulative
//! month-to-date totals into daily deltas.

pub mod aggregator;
pub mod cumulative;
pub mod pipeline;
pub mod providers;
pub mod reader;

pub use billing_core as core;
