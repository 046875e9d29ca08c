//! Shared types for the billing normalizer.
//!
//! Holds the canonical report model, record identity derivation, the error
//! taxonomy, reference-time handling and the defensive field parsers used by
//! every provider normalizer.

pub mod data_processors;
pub mod error;
pub mod models;
pub mod settings;
pub mod time_utils;

pub use error::{BillingError, CleaningPhase, Result};
pub use models::{BillingPeriod, CanonicalReport, Identity, Provider, SnapshotQuery, UsageSnapshot};
