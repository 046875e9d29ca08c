use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, ValueEnum};

use crate::error::{BillingError, Result};
use crate::time_utils::{parse_timezone, Clock, ReferenceTime, SystemClock};

/// Reference timezone used when none is configured.
pub const DEFAULT_TIMEZONE: &str = "America/Los_Angeles";

// ── Policy enums ───────────────────────────────────────────────────────────────

/// Day a cumulative export without per-row dates is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ExportDay {
    /// The export covers usage up to and including today.
    Today,
    /// The export was produced after midnight and covers up to yesterday.
    #[default]
    Yesterday,
}

/// Period used to key the cumulative snapshot lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum LookupDay {
    /// Key on the report's own period.
    #[default]
    Report,
    /// Key on the day before the report's period, counting usage recorded
    /// through that day. Nothing is subtracted on the first of a month.
    DayBefore,
}

// ── Settings (CLI) ─────────────────────────────────────────────────────────────

/// Normalize cloud billing exports into one canonical usage report
#[derive(Parser, Debug, Clone)]
#[command(
    name = "billing-normalizer",
    about = "Normalize cloud billing exports into one canonical usage report",
    version
)]
pub struct Settings {
    /// AWS month-to-date billing export (CSV)
    #[arg(long)]
    pub aws: Option<PathBuf>,

    /// Availability zone recorded as the region of every AWS report
    #[arg(long, env = "AWS_REGION", default_value = "")]
    pub aws_region: String,

    /// Day the AWS cumulative export is attributed to
    #[arg(long, value_enum, default_value_t = ExportDay::Yesterday)]
    pub aws_export_day: ExportDay,

    /// Azure enrollment detail export (CSV)
    #[arg(long)]
    pub azure: Option<PathBuf>,

    /// GCP daily billing export (CSV); may be repeated
    #[arg(long)]
    pub gcp: Vec<PathBuf>,

    /// Directory scanned recursively for GCP daily exports
    #[arg(long)]
    pub gcp_dir: Option<PathBuf>,

    /// Reference timezone (IANA name) for "today" and period defaults
    #[arg(long, default_value = DEFAULT_TIMEZONE)]
    pub timezone: String,

    /// Period used to key cumulative snapshot lookups
    #[arg(long, value_enum, default_value_t = LookupDay::Report)]
    pub lookup_day: LookupDay,

    /// JSON file holding persisted reports (defaults to ~/.billing-normalizer/reports.json)
    #[arg(long)]
    pub state_file: Option<PathBuf>,

    /// Directory the normalized CSV export is written to
    #[arg(long, default_value = ".")]
    pub output_dir: PathBuf,

    /// Skip writing the normalized CSV export
    #[arg(long)]
    pub no_export: bool,

    /// Skip saving reports to the state file
    #[arg(long)]
    pub no_save: bool,

    /// Logging level
    #[arg(long, default_value = "INFO", value_parser = ["DEBUG", "INFO", "WARNING", "ERROR"])]
    pub log_level: String,

    /// Enable debug logging
    #[arg(long)]
    pub debug: bool,
}

impl Settings {
    /// Parse the process arguments.
    pub fn load() -> Self {
        Self::load_from_args(std::env::args_os())
    }

    /// Same as [`load`](Self::load) but accepts an explicit argument list.
    pub fn load_from_args<I, T>(args: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let mut settings = Settings::parse_from(args);
        // --debug overrides log level.
        if settings.debug {
            settings.log_level = "DEBUG".to_string();
        }
        settings
    }

    /// `true` when at least one provider export is configured.
    pub fn has_inputs(&self) -> bool {
        self.aws.is_some() || self.azure.is_some() || !self.gcp.is_empty() || self.gcp_dir.is_some()
    }

    /// State file path, falling back to `~/.billing-normalizer/reports.json`.
    pub fn state_file_path(&self) -> PathBuf {
        match &self.state_file {
            Some(path) => path.clone(),
            None => Self::default_state_file_in(
                &dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")),
            ),
        }
    }

    /// Default state file rooted at `base_dir` (used for testing).
    pub fn default_state_file_in(base_dir: &Path) -> PathBuf {
        base_dir.join(".billing-normalizer").join("reports.json")
    }

    /// Validate the settings and build the pipeline configuration.
    pub fn pipeline_config(&self) -> Result<PipelineConfig> {
        self.pipeline_config_with_clock(Arc::new(SystemClock))
    }

    /// Like [`pipeline_config`](Self::pipeline_config) with an injected clock.
    pub fn pipeline_config_with_clock(&self, clock: Arc<dyn Clock>) -> Result<PipelineConfig> {
        if !self.has_inputs() {
            return Err(BillingError::Config(
                "no provider exports configured; pass --aws, --azure, --gcp or --gcp-dir"
                    .to_string(),
            ));
        }
        let tz = parse_timezone(&self.timezone)?;
        Ok(PipelineConfig {
            reference: ReferenceTime::new(tz, clock),
            aws_region: self.aws_region.trim().to_string(),
            aws_export_day: self.aws_export_day,
            lookup_day: self.lookup_day,
        })
    }
}

// ── PipelineConfig ─────────────────────────────────────────────────────────────

/// Validated configuration shared by every provider pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub reference: ReferenceTime,
    pub aws_region: String,
    pub aws_export_day: ExportDay,
    pub lookup_day: LookupDay,
}

impl PipelineConfig {
    /// Configuration with default policies and the given reference time.
    pub fn new(reference: ReferenceTime) -> Self {
        Self {
            reference,
            aws_region: String::new(),
            aws_export_day: ExportDay::default(),
            lookup_day: LookupDay::default(),
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────
