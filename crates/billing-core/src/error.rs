use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::models::{Identity, Provider};

/// Boxed error returned by external collaborators (stores, fetchers).
pub type SourceError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Cleaning stage that removed the last remaining row of an export.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleaningPhase {
    /// The underlying reader produced no rows at all.
    Read,
    /// Every row was empty or whitespace-only.
    EmptyRows,
    /// Every non-empty row was shorter than the minimum width.
    ShortRows,
}

impl fmt::Display for CleaningPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            CleaningPhase::Read => "reading rows",
            CleaningPhase::EmptyRows => "removing empty rows",
            CleaningPhase::ShortRows => "removing short rows",
        };
        f.write_str(label)
    }
}

/// All errors produced by the billing pipeline.
///
/// Every variant is scoped to a single provider's batch; callers decide how
/// to aggregate failures across providers.
#[derive(Error, Debug)]
pub enum BillingError {
    /// A configuration value is missing or invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Cleaning removed every row of an export.
    #[error("Report is empty: {phase} returned no valid rows")]
    CleaningExhausted { phase: CleaningPhase },

    /// An export had a header but not a single parsable data row.
    #[error("No valid {provider} usage rows found")]
    NoValidRows { provider: Provider },

    /// The cumulative snapshot lookup failed for an identity.
    #[error("Failed to get usage to date for {identity}: {source}")]
    Lookup {
        identity: Identity,
        #[source]
        source: SourceError,
    },

    /// Fetching a provider export failed.
    #[error("Failed to fetch {provider} usage: {source}")]
    Fetch {
        provider: Provider,
        #[source]
        source: SourceError,
    },

    /// Saving reports to the persistence collaborator failed.
    #[error("Failed to save reports: {0}")]
    Persistence(String),

    /// A file could not be opened or written.
    #[error("Failed to access file {path}: {source}")]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The delimited text could not be read or written.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// A JSON document could not be parsed or serialised.
    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// Pass-through for any raw I/O error that does not carry a path.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Catch-all for errors from third-party crates via `anyhow`.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Convenience alias used throughout the billing crates.
pub type Result<T> = std::result::Result<T, BillingError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_config() {
        let err = BillingError::Config("maximum width must be a positive integer".to_string());
        assert_eq!(
            err.to_string(),
            "Configuration error: maximum width must be a positive integer"
        );
    }

    #[test]
    fn test_error_display_cleaning_exhausted_names_phase() {
        let err = BillingError::CleaningExhausted {
            phase: CleaningPhase::EmptyRows,
        };
        assert_eq!(
            err.to_string(),
            "Report is empty: removing empty rows returned no valid rows"
        );

        let err = BillingError::CleaningExhausted {
            phase: CleaningPhase::ShortRows,
        };
        assert!(err.to_string().contains("removing short rows"));
    }

    #[test]
    fn test_error_display_no_valid_rows() {
        let err = BillingError::NoValidRows {
            provider: Provider::Gcp,
        };
        assert_eq!(err.to_string(), "No valid GCP usage rows found");
    }

    #[test]
    fn test_error_display_lookup_keeps_source() {
        let io_err = std::io::Error::new(std::io::ErrorKind::TimedOut, "store unreachable");
        let identity = Identity::derive(
            Provider::Aws,
            "123",
            "Amazon EC2",
            "us-east-1a",
            crate::models::BillingPeriod::new(1, 2, 2016),
        );
        let err = BillingError::Lookup {
            identity: identity.clone(),
            source: Box::new(io_err),
        };
        let msg = err.to_string();
        assert!(msg.contains(identity.as_str()));
        assert!(msg.contains("store unreachable"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_error_display_fetch() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
        let err = BillingError::Fetch {
            provider: Provider::Aws,
            source: Box::new(io_err),
        };
        assert_eq!(err.to_string(), "Failed to fetch AWS usage: no such file");
    }

    #[test]
    fn test_error_display_file() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err = BillingError::File {
            path: PathBuf::from("/some/state.json"),
            source: io_err,
        };
        let msg = err.to_string();
        assert!(msg.contains("/some/state.json"));
        assert!(msg.contains("denied"));
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: BillingError = io_err.into();
        assert!(err.to_string().contains("denied"));
    }

    #[test]
    fn test_error_from_serde_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("{invalid}").unwrap_err();
        let err: BillingError = json_err.into();
        assert!(err.to_string().contains("Failed to parse JSON"));
    }
}
