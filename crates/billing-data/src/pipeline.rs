//! Per-provider pipeline: clean, parse, normalize, consolidate and, for
//! cumulative providers, convert to daily deltas.

use std::sync::Arc;

use billing_core::error::{BillingError, Result};
use billing_core::models::{CanonicalReport, Provider};
use billing_core::settings::PipelineConfig;
use tracing::{debug, warn};

use crate::aggregator::consolidate;
use crate::cumulative::{DeltaCalculator, UsageToDateLookup};
use crate::providers::{AwsNormalizer, AzureNormalizer, GcpNormalizer, Normalizer};
use crate::reader::{deserialize_rows, TableReader, TableWidth};

/// Object-safe handle on one provider's pipeline.
pub trait ProviderPipeline: Send + Sync {
    fn provider(&self) -> Provider;

    /// Turn the provider's raw exports into final reports.
    fn run(&self, exports: &[Vec<u8>]) -> Result<Vec<CanonicalReport>>;
}

// ── NormalizationPipeline ─────────────────────────────────────────────────────

/// Pipeline driven by a [`Normalizer`].
pub struct NormalizationPipeline<N> {
    normalizer: N,
    width: TableWidth,
    delta: Option<DeltaCalculator>,
}

impl<N: Normalizer> NormalizationPipeline<N> {
    pub fn new(normalizer: N) -> Result<Self> {
        let width = TableWidth::new(N::MAX_COLUMNS, N::MIN_COLUMNS)?;
        Ok(Self {
            normalizer,
            width,
            delta: None,
        })
    }

    /// Apply cumulative-to-delta conversion after consolidation.
    pub fn with_delta(mut self, delta: DeltaCalculator) -> Self {
        self.delta = Some(delta);
        self
    }

    /// Clean, parse and normalize a single export.
    pub fn normalize_export(&self, bytes: &[u8]) -> Result<Vec<CanonicalReport>> {
        let provider = self.normalizer.provider();
        let rows = TableReader::from_bytes(bytes, self.width).read_all()?;
        let records: Vec<N::Raw> = deserialize_rows(provider, rows)?;
        let reports = self.normalizer.normalize(&records);
        debug!(%provider, records = records.len(), reports = reports.len(), "normalized export");
        Ok(reports)
    }

    fn normalize_daily(&self, exports: &[Vec<u8>]) -> Result<Vec<CanonicalReport>> {
        let provider = self.normalizer.provider();
        let mut reports = Vec::new();
        let mut succeeded = 0usize;
        let mut last_error = None;

        for (index, export) in exports.iter().enumerate() {
            match self.normalize_export(export) {
                Ok(day) => {
                    succeeded += 1;
                    reports.extend(day);
                }
                Err(e) => {
                    warn!(%provider, export = index, error = %e, "skipping daily export");
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(e) if succeeded == 0 => Err(e),
            _ => Ok(reports),
        }
    }
}

impl<N: Normalizer> ProviderPipeline for NormalizationPipeline<N> {
    fn provider(&self) -> Provider {
        self.normalizer.provider()
    }

    fn run(&self, exports: &[Vec<u8>]) -> Result<Vec<CanonicalReport>> {
        let provider = self.normalizer.provider();
        if exports.is_empty() {
            return Err(BillingError::NoValidRows { provider });
        }

        let reports = if N::DAILY_EXPORTS {
            self.normalize_daily(exports)?
        } else {
            let mut reports = Vec::new();
            for export in exports {
                reports.extend(self.normalize_export(export)?);
            }
            reports
        };

        let reports = consolidate(reports);
        match &self.delta {
            Some(delta) => delta.apply(&reports),
            None => Ok(reports),
        }
    }
}

// ── Construction ──────────────────────────────────────────────────────────────

/// Pipeline for `provider`, with delta conversion when the provider's export
/// is cumulative.
pub fn build_pipeline(
    provider: Provider,
    config: &PipelineConfig,
    lookup: Arc<dyn UsageToDateLookup>,
) -> Result<Box<dyn ProviderPipeline>> {
    let delta = DeltaCalculator::new(lookup, config.lookup_day);
    match provider {
        Provider::Aws => boxed(AwsNormalizer::from_config(config), delta),
        Provider::Azure => boxed(AzureNormalizer::from_config(config), delta),
        Provider::Gcp => boxed(GcpNormalizer::from_config(config), delta),
    }
}

fn boxed<N: Normalizer + 'static>(
    normalizer: N,
    delta: DeltaCalculator,
) -> Result<Box<dyn ProviderPipeline>> {
    let cumulative = normalizer.provider().is_cumulative();
    let pipeline = NormalizationPipeline::new(normalizer)?;
    Ok(if cumulative {
        Box::new(pipeline.with_delta(delta))
    } else {
        Box::new(pipeline)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use billing_core::error::CleaningPhase;
    use billing_core::models::{BillingPeriod, SnapshotQuery, UsageSnapshot};
    use billing_core::time_utils::ReferenceTime;
    use crate::providers::{AwsUsage, AzureUsage, GcpUsage};
    use chrono::{DateTime, Utc};
    use chrono_tz::Tz;

    /// Build an export with `header` and one line per entry of `rows`;
    /// columns not named in a row are left empty.
    fn export(header: &[&str], rows: &[&[(&str, &str)]]) -> Vec<u8> {
        let mut text = header.join(",");
        text.push('\n');
        for row in rows {
            let cells: Vec<&str> = header
                .iter()
                .map(|column| {
                    row.iter()
                        .find(|(name, _)| name == column)
                        .map(|(_, value)| *value)
                        .unwrap_or("")
                })
                .collect();
            text.push_str(&cells.join(","));
            text.push('\n');
        }
        text.into_bytes()
    }

    fn config() -> PipelineConfig {
        let now = DateTime::parse_from_rfc3339("2016-03-06T18:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let mut config = PipelineConfig::new(ReferenceTime::fixed(Tz::UTC, now));
        config.aws_region = "us-east-1a".to_string();
        config
    }

    /// Answers every query with the same snapshot.
    struct ConstantLookup(Option<UsageSnapshot>);

    impl UsageToDateLookup for ConstantLookup {
        fn usage_to_date(&self, _query: &SnapshotQuery) -> Result<Option<UsageSnapshot>> {
            Ok(self.0)
        }
    }

    fn no_snapshots() -> Arc<dyn UsageToDateLookup> {
        Arc::new(ConstantLookup(None))
    }

    fn azure_row<'a>(quantity: &'a str, cost: &'a str) -> Vec<(&'a str, &'a str)> {
        vec![
            ("SubscriptionGuid", "guid-1"),
            ("Subscription Name", "Team A"),
            ("Day", "4"),
            ("Month", "2"),
            ("Year", "2016"),
            ("Meter Region", "US West"),
            ("Consumed Service", "Microsoft.Storage"),
            ("Consumed Quantity", quantity),
            ("ExtendedCost", cost),
            ("Unit Of Measure", "GB"),
        ]
    }

    fn gcp_day(day: &str) -> Vec<u8> {
        let start = format!("2016-02-{day}T00:00:00-08:00");
        let row = [
            ("Account ID", "ACCT-1"),
            ("Line Item", "com.google.cloud/compute"),
            ("Start Time", start.as_str()),
            ("Measurement1 Total Consumption", "10"),
            ("Measurement1 Units", "seconds"),
            ("Cost", "1.5"),
            ("Project Number", "42"),
            ("Description", "Compute Engine"),
        ];
        export(&GcpUsage::COLUMNS, &[row.as_slice()])
    }

    // ── Azure ─────────────────────────────────────────────────────────────────

    #[test]
    fn test_azure_duplicates_are_consolidated() {
        let first = azure_row("0.1", "0.3");
        let second = azure_row("0.5", "0.01");
        let bytes = export(&AzureUsage::COLUMNS, &[first.as_slice(), second.as_slice()]);

        let pipeline = build_pipeline(Provider::Azure, &config(), no_snapshots()).unwrap();
        let reports = pipeline.run(&[bytes]).unwrap();

        assert_eq!(reports.len(), 1);
        assert!((reports[0].usage_quantity - 0.6).abs() < 1e-9);
        assert!((reports[0].cost - 0.31).abs() < 1e-9);
        assert_eq!(reports[0].period(), BillingPeriod::new(4, 2, 2016));
    }

    #[test]
    fn test_azure_banner_lines_are_ignored() {
        let row = azure_row("1", "2");
        let mut bytes = b"Usage Detail Report\nEnrollment Number,123\n\n".to_vec();
        bytes.extend(export(&AzureUsage::COLUMNS, &[row.as_slice()]));

        let pipeline = build_pipeline(Provider::Azure, &config(), no_snapshots()).unwrap();
        let reports = pipeline.run(&[bytes]).unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].account_number, "guid-1");
    }

    #[test]
    fn test_azure_is_not_delta_adjusted() {
        let row = azure_row("10", "100");
        let bytes = export(&AzureUsage::COLUMNS, &[row.as_slice()]);
        let lookup: Arc<dyn UsageToDateLookup> = Arc::new(ConstantLookup(Some(UsageSnapshot {
            usage_quantity: 9.0,
            cost: 90.0,
        })));

        let pipeline = build_pipeline(Provider::Azure, &config(), lookup).unwrap();
        let reports = pipeline.run(&[bytes]).unwrap();
        assert_eq!(reports[0].usage_quantity, 10.0);
        assert_eq!(reports[0].cost, 100.0);
    }

    // ── AWS ───────────────────────────────────────────────────────────────────

    #[test]
    fn test_aws_is_delta_adjusted() {
        let line_item = [
            ("PayerAccountId", "P1"),
            ("PayerAccountName", "Acme"),
            ("RecordType", "PayerLineItem"),
            ("ProductName", "Amazon EC2"),
            ("UsageQuantity", "10"),
            ("TotalCost", "100"),
        ];
        let invoice_total = [
            ("PayerAccountId", "P1"),
            ("RecordType", "InvoiceTotal"),
            ("TotalCost", "100"),
        ];
        let bytes = export(
            &AwsUsage::COLUMNS,
            &[line_item.as_slice(), invoice_total.as_slice()],
        );
        let lookup: Arc<dyn UsageToDateLookup> = Arc::new(ConstantLookup(Some(UsageSnapshot {
            usage_quantity: 9.0,
            cost: 90.0,
        })));

        let pipeline = build_pipeline(Provider::Aws, &config(), lookup).unwrap();
        let reports = pipeline.run(&[bytes]).unwrap();

        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].account_number, "P1");
        assert_eq!(reports[0].region, "us-east-1a");
        assert_eq!(reports[0].period(), BillingPeriod::new(5, 3, 2016));
        assert_eq!(reports[0].usage_quantity, 1.0);
        assert_eq!(reports[0].cost, 10.0);
    }

    #[test]
    fn test_aws_empty_export_names_cleaning_phase() {
        let pipeline = build_pipeline(Provider::Aws, &config(), no_snapshots()).unwrap();
        let err = pipeline.run(&[b"\n  \n".to_vec()]).unwrap_err();
        assert!(matches!(
            err,
            BillingError::CleaningExhausted {
                phase: CleaningPhase::Read | CleaningPhase::EmptyRows
            }
        ));
    }

    // ── GCP ───────────────────────────────────────────────────────────────────

    #[test]
    fn test_gcp_days_are_combined() {
        let pipeline = build_pipeline(Provider::Gcp, &config(), no_snapshots()).unwrap();
        let reports = pipeline.run(&[gcp_day("01"), gcp_day("02")]).unwrap();

        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].day, 1);
        assert_eq!(reports[1].day, 2);
    }

    #[test]
    fn test_gcp_failing_day_is_skipped() {
        let pipeline = build_pipeline(Provider::Gcp, &config(), no_snapshots()).unwrap();
        let reports = pipeline
            .run(&[gcp_day("01"), b"garbage".to_vec()])
            .unwrap();
        assert_eq!(reports.len(), 1);
    }

    #[test]
    fn test_gcp_fails_when_every_day_fails() {
        let pipeline = build_pipeline(Provider::Gcp, &config(), no_snapshots()).unwrap();
        let err = pipeline
            .run(&[b"garbage".to_vec(), Vec::new()])
            .unwrap_err();
        assert!(matches!(err, BillingError::CleaningExhausted { .. }));
    }

    #[test]
    fn test_no_exports_is_no_valid_rows() {
        let pipeline = build_pipeline(Provider::Gcp, &config(), no_snapshots()).unwrap();
        assert!(matches!(
            pipeline.run(&[]),
            Err(BillingError::NoValidRows {
                provider: Provider::Gcp
            })
        ));
    }

    #[test]
    fn test_pipeline_reports_provider() {
        for provider in Provider::ALL {
            let pipeline = build_pipeline(provider, &config(), no_snapshots()).unwrap();
            assert_eq!(pipeline.provider(), provider);
        }
    }
}
