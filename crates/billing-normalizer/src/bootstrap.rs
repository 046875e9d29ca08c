use std::path::Path;
use std::sync::Arc;

use billing_core::models::Provider;
use billing_core::settings::Settings;
use billing_runtime::sources::{DirectorySource, ExportSource, FileSource};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

// ── Directory bootstrap ────────────────────────────────────────────────────────

/// Ensure the directory holding the state file exists.
pub fn ensure_directories(state_file: &Path) -> anyhow::Result<()> {
    if let Some(parent) = state_file.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

// ── Logging bootstrap ──────────────────────────────────────────────────────────

/// Map a `--log-level` name to a tracing filter directive.
fn filter_directive(log_level: &str) -> String {
    match log_level.to_uppercase().as_str() {
        "DEBUG" => "debug".to_string(),
        "INFO" => "info".to_string(),
        "WARNING" => "warn".to_string(),
        "ERROR" => "error".to_string(),
        other => other.to_lowercase(),
    }
}

/// Initialise the global `tracing` subscriber on stderr.
///
/// Falls back to `"info"` if the level string is not recognised.
pub fn setup_logging(log_level: &str) -> anyhow::Result<()> {
    let filter =
        EnvFilter::try_new(filter_directive(log_level)).unwrap_or_else(|_| EnvFilter::new("info"));

    let subscriber = fmt::layer()
        .with_target(false)
        .with_thread_ids(false)
        .with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(filter)
        .with(subscriber)
        .try_init()?;

    Ok(())
}

// ── Export sources ─────────────────────────────────────────────────────────────

/// Export sources for every provider input named on the command line.
pub fn sources_from_settings(settings: &Settings) -> Vec<Arc<dyn ExportSource>> {
    let mut sources: Vec<Arc<dyn ExportSource>> = Vec::new();

    if let Some(path) = &settings.aws {
        sources.push(Arc::new(FileSource::new(Provider::Aws, vec![path.clone()])));
    }
    if let Some(path) = &settings.azure {
        sources.push(Arc::new(FileSource::new(Provider::Azure, vec![path.clone()])));
    }
    if !settings.gcp.is_empty() {
        sources.push(Arc::new(FileSource::new(Provider::Gcp, settings.gcp.clone())));
    }
    if let Some(dir) = &settings.gcp_dir {
        sources.push(Arc::new(DirectorySource::new(Provider::Gcp, dir.clone())));
    }

    sources
}

// ── Tests ──────────────────────────────────────────────────────────────────────
