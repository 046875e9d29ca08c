//! Batch orchestrator.
//!
//! Runs one pipeline per configured provider on the blocking pool, then
//! persists each successful provider's reports and writes the archival CSV.
//! A failing provider never stops the others; its error is carried in the
//! returned [`BatchSummary`].

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::anyhow;
use billing_core::error::{BillingError, Result};
use billing_core::models::{CanonicalReport, Provider};
use billing_core::settings::PipelineConfig;
use billing_data::cumulative::UsageToDateLookup;
use billing_data::pipeline::build_pipeline;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::export::CsvExporter;
use crate::sources::ExportSource;
use crate::store::ReportSink;

// ── Public types ──────────────────────────────────────────────────────────────

/// Result of one provider's run.
#[derive(Debug)]
pub struct ProviderOutcome {
    pub provider: Provider,
    pub result: Result<Vec<CanonicalReport>>,
}

impl ProviderOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    /// Reports produced by a successful run; empty for a failed one.
    pub fn reports(&self) -> &[CanonicalReport] {
        match &self.result {
            Ok(reports) => reports,
            Err(_) => &[],
        }
    }

    pub fn error(&self) -> Option<&BillingError> {
        self.result.as_ref().err()
    }
}

/// Everything a batch run produced.
#[derive(Debug, Default)]
pub struct BatchSummary {
    /// One outcome per configured provider, in [`Provider::ALL`] order.
    pub outcomes: Vec<ProviderOutcome>,
    /// Archival export written by this run, if any.
    pub export_path: Option<PathBuf>,
    pub export_error: Option<BillingError>,
}

impl BatchSummary {
    pub fn all_succeeded(&self) -> bool {
        self.outcomes.iter().all(ProviderOutcome::is_success) && self.export_error.is_none()
    }

    pub fn failed_providers(&self) -> Vec<Provider> {
        self.outcomes
            .iter()
            .filter(|o| !o.is_success())
            .map(|o| o.provider)
            .collect()
    }

    /// Reports of every successful provider, in outcome order. The archival
    /// export is written in this order.
    pub fn reports(&self) -> Vec<CanonicalReport> {
        self.outcomes
            .iter()
            .flat_map(|o| o.reports().iter().cloned())
            .collect()
    }
}

// ── BatchRunner ───────────────────────────────────────────────────────────────

/// Runs the configured providers once.
pub struct BatchRunner {
    config: PipelineConfig,
    sources: Vec<Arc<dyn ExportSource>>,
    sink: Arc<dyn ReportSink>,
    lookup: Arc<dyn UsageToDateLookup>,
    exporter: Option<CsvExporter>,
    save: bool,
}

impl BatchRunner {
    /// Runner that saves to and looks up snapshots in `store`.
    pub fn new<S>(config: PipelineConfig, store: Arc<S>) -> Self
    where
        S: ReportSink + UsageToDateLookup + 'static,
    {
        let sink: Arc<dyn ReportSink> = store.clone();
        let lookup: Arc<dyn UsageToDateLookup> = store;
        Self {
            config,
            sources: Vec::new(),
            sink,
            lookup,
            exporter: None,
            save: true,
        }
    }

    /// Add an export source. Several sources for one provider are read in the
    /// order they were added and processed as one batch.
    pub fn with_source(mut self, source: Arc<dyn ExportSource>) -> Self {
        self.sources.push(source);
        self
    }

    pub fn with_exporter(mut self, exporter: CsvExporter) -> Self {
        self.exporter = Some(exporter);
        self
    }

    /// Skip persistence; reports are still returned and exported.
    pub fn without_saving(mut self) -> Self {
        self.save = false;
        self
    }

    /// Providers with at least one source, in [`Provider::ALL`] order.
    pub fn providers(&self) -> Vec<Provider> {
        Provider::ALL
            .into_iter()
            .filter(|p| self.sources.iter().any(|s| s.provider() == *p))
            .collect()
    }

    /// Run every configured provider concurrently and persist the results.
    pub async fn run(&self) -> BatchSummary {
        let mut outcomes = self.run_pipelines().await;

        if self.save {
            for outcome in &mut outcomes {
                self.save_outcome(outcome);
            }
        }

        for outcome in &outcomes {
            match &outcome.result {
                Ok(reports) => {
                    info!(provider = %outcome.provider, reports = reports.len(), "provider finished")
                }
                Err(e) => error!(provider = %outcome.provider, error = %e, "provider failed"),
            }
        }

        let mut summary = BatchSummary {
            outcomes,
            ..BatchSummary::default()
        };
        self.export(&mut summary);
        summary
    }

    // ── Private implementation ────────────────────────────────────────────

    async fn run_pipelines(&self) -> Vec<ProviderOutcome> {
        let mut tasks = JoinSet::new();

        for provider in self.providers() {
            let sources: Vec<Arc<dyn ExportSource>> = self
                .sources
                .iter()
                .filter(|s| s.provider() == provider)
                .cloned()
                .collect();
            let config = self.config.clone();
            let lookup = Arc::clone(&self.lookup);

            tasks.spawn(async move {
                let result = tokio::task::spawn_blocking(move || {
                    run_provider(provider, &sources, &config, lookup)
                })
                .await
                .unwrap_or_else(|e| {
                    Err(BillingError::Other(anyhow!(
                        "{provider} pipeline task failed: {e}"
                    )))
                });
                ProviderOutcome { provider, result }
            });
        }

        let mut outcomes = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => error!(error = %e, "provider task did not complete"),
            }
        }
        outcomes.sort_by_key(|o| Provider::ALL.iter().position(|p| *p == o.provider));
        outcomes
    }

    /// Persist a successful outcome. A failed save turns it into a failure.
    fn save_outcome(&self, outcome: &mut ProviderOutcome) {
        let reports = match &outcome.result {
            Ok(reports) if reports.is_empty() => {
                debug!(provider = %outcome.provider, "nothing to save");
                return;
            }
            Ok(reports) => reports,
            Err(_) => return,
        };

        if let Err(e) = self.sink.save_reports(reports) {
            outcome.result = Err(e);
        }
    }

    fn export(&self, summary: &mut BatchSummary) {
        let Some(exporter) = &self.exporter else {
            return;
        };
        let reports = summary.reports();
        if reports.is_empty() {
            warn!("no reports to export");
            return;
        }

        match exporter.write(self.config.reference.today(), &reports) {
            Ok(path) => summary.export_path = Some(path),
            Err(e) => {
                error!(error = %e, "failed to write export");
                summary.export_error = Some(e);
            }
        }
    }
}

fn run_provider(
    provider: Provider,
    sources: &[Arc<dyn ExportSource>],
    config: &PipelineConfig,
    lookup: Arc<dyn UsageToDateLookup>,
) -> Result<Vec<CanonicalReport>> {
    let pipeline = build_pipeline(provider, config, lookup)?;

    let mut exports = Vec::new();
    for source in sources {
        exports.extend(source.fetch()?);
    }
    debug!(%provider, exports = exports.len(), "fetched exports");

    pipeline.run(&exports)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
