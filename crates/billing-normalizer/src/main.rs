mod bootstrap;

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use billing_core::settings::Settings;
use billing_runtime::export::CsvExporter;
use billing_runtime::orchestrator::BatchRunner;
use billing_runtime::store::JsonFileStore;

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::load();

    bootstrap::setup_logging(&settings.log_level)?;

    tracing::info!("Billing Normalizer v{} starting", env!("CARGO_PKG_VERSION"));

    let config = settings.pipeline_config()?;
    tracing::info!(
        "Timezone: {}, AWS export day: {:?}, lookup day: {:?}",
        config.reference.timezone(),
        config.aws_export_day,
        config.lookup_day
    );

    let state_file = settings.state_file_path();
    bootstrap::ensure_directories(&state_file)?;
    let store = Arc::new(
        JsonFileStore::open(&state_file)
            .with_context(|| format!("opening state file {}", state_file.display()))?,
    );

    let mut runner = BatchRunner::new(config, store);
    for source in bootstrap::sources_from_settings(&settings) {
        runner = runner.with_source(source);
    }
    if !settings.no_export {
        runner = runner.with_exporter(CsvExporter::new(&settings.output_dir));
    }
    if settings.no_save {
        runner = runner.without_saving();
    }

    let summary = runner.run().await;

    for outcome in &summary.outcomes {
        match &outcome.result {
            Ok(reports) => println!("{}: {} reports", outcome.provider, reports.len()),
            Err(e) => println!("{}: failed: {}", outcome.provider, e),
        }
    }
    if let Some(path) = &summary.export_path {
        println!("Export written to {}", path.display());
    }

    let failed = summary.failed_providers();
    if !failed.is_empty() {
        let names: Vec<String> = failed.iter().map(|p| p.to_string()).collect();
        bail!("{} provider(s) failed: {}", failed.len(), names.join(", "));
    }
    if let Some(e) = summary.export_error {
        return Err(e).context("writing normalized export");
    }

    Ok(())
}
