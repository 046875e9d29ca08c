//! GCP daily billing export.
//!
//! GCP writes one file per day, either 15 or 18 columns wide depending on
//! whether the project columns are present.

use billing_core::data_processors::{parse_amount, period_from_timestamp, resolve_account};
use billing_core::models::{CanonicalReport, Provider};
use billing_core::settings::PipelineConfig;
use billing_core::time_utils::ReferenceTime;
use serde::Deserialize;
use tracing::debug;

use super::{Normalizer, ReportDraft};

/// One row of a GCP daily export.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GcpUsage {
    #[serde(rename = "Account ID")]
    pub account_id: String,
    #[serde(rename = "Line Item")]
    pub line_item: String,
    #[serde(rename = "Start Time")]
    pub start_time: String,
    #[serde(rename = "End Time")]
    pub end_time: String,
    #[serde(rename = "Project")]
    pub project: String,
    #[serde(rename = "Measurement1")]
    pub measurement1: String,
    #[serde(rename = "Measurement1 Total Consumption")]
    pub measurement1_total_consumption: String,
    #[serde(rename = "Measurement1 Units")]
    pub measurement1_units: String,
    #[serde(rename = "Credit1")]
    pub credit1: String,
    #[serde(rename = "Credit1 Amount")]
    pub credit1_amount: String,
    #[serde(rename = "Credit1 Currency")]
    pub credit1_currency: String,
    #[serde(rename = "Cost")]
    pub cost: String,
    #[serde(rename = "Currency")]
    pub currency: String,
    #[serde(rename = "Project Number")]
    pub project_number: String,
    #[serde(rename = "Project ID")]
    pub project_id: String,
    #[serde(rename = "Project Name")]
    pub project_name: String,
    #[serde(rename = "Project Labels")]
    pub project_labels: String,
    #[serde(rename = "Description")]
    pub description: String,
}

impl GcpUsage {
    /// Header of the full export layout, in column order.
    pub const COLUMNS: [&'static str; 18] = [
        "Account ID",
        "Line Item",
        "Start Time",
        "End Time",
        "Project",
        "Measurement1",
        "Measurement1 Total Consumption",
        "Measurement1 Units",
        "Credit1",
        "Credit1 Amount",
        "Credit1 Currency",
        "Cost",
        "Currency",
        "Project Number",
        "Project ID",
        "Project Name",
        "Project Labels",
        "Description",
    ];

    /// Width of the layout without the project ID, name and labels columns.
    pub const SHORT_LAYOUT_COLUMNS: usize = 15;
}

/// Normalizer for [`GcpUsage`] rows.
#[derive(Debug, Clone)]
pub struct GcpNormalizer {
    reference: ReferenceTime,
}

impl GcpNormalizer {
    pub fn new(reference: ReferenceTime) -> Self {
        Self { reference }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config.reference.clone())
    }
}

impl Normalizer for GcpNormalizer {
    type Raw = GcpUsage;

    const MAX_COLUMNS: usize = GcpUsage::COLUMNS.len();
    const MIN_COLUMNS: Option<usize> = Some(GcpUsage::SHORT_LAYOUT_COLUMNS);
    const DAILY_EXPORTS: bool = true;

    fn provider(&self) -> Provider {
        Provider::Gcp
    }

    fn normalize_record(&self, raw: &GcpUsage) -> Option<CanonicalReport> {
        if raw.line_item.trim().is_empty() {
            debug!(description = %raw.description, "skipping GCP row without line item");
            return None;
        }

        let draft = ReportDraft {
            provider: Provider::Gcp,
            account: resolve_account(
                &raw.project_number,
                &raw.project_id,
                &raw.account_id,
                &raw.account_id,
            ),
            service_type: raw.description.trim().to_string(),
            region: String::new(),
            period: period_from_timestamp(Provider::Gcp, &raw.start_time, &self.reference),
            usage_quantity: parse_amount(
                Provider::Gcp,
                "Measurement1 Total Consumption",
                &raw.measurement1_total_consumption,
            ),
            unit_of_measure: raw.measurement1_units.trim().to_string(),
            cost: parse_amount(Provider::Gcp, "Cost", &raw.cost),
        };
        Some(draft.into_report())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::{deserialize_rows, TableReader, TableWidth};
    use billing_core::models::BillingPeriod;
    use chrono::{DateTime, Utc};
    use chrono_tz::Tz;

    fn normalizer() -> GcpNormalizer {
        let now = DateTime::parse_from_rfc3339("2016-03-15T18:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        GcpNormalizer::new(ReferenceTime::fixed(Tz::UTC, now))
    }

    fn usage() -> GcpUsage {
        GcpUsage {
            account_id: "ACCT-1".to_string(),
            line_item: "com.google.cloud/services/compute-engine/VmimageN1Standard_1".to_string(),
            start_time: "2016-02-01T00:00:00-08:00".to_string(),
            measurement1_total_consumption: "3600".to_string(),
            measurement1_units: "seconds".to_string(),
            cost: "0.05".to_string(),
            project_number: "1234".to_string(),
            project_id: "my-project".to_string(),
            description: "Compute Engine".to_string(),
            ..GcpUsage::default()
        }
    }

    #[test]
    fn test_normalize_row() {
        let report = normalizer().normalize_record(&usage()).unwrap();

        assert_eq!(report.provider, Provider::Gcp);
        assert_eq!(report.account_number, "1234");
        assert_eq!(report.account_name, "my-project");
        assert_eq!(report.service_type, "Compute Engine");
        assert_eq!(report.region, "");
        assert_eq!(report.unit_of_measure, "seconds");
        assert_eq!(report.period(), BillingPeriod::new(1, 2, 2016));
        assert_eq!(report.usage_quantity, 3600.0);
        assert_eq!(report.cost, 0.05);
    }

    #[test]
    fn test_row_without_line_item_is_skipped() {
        let mut raw = usage();
        raw.line_item = String::new();
        assert!(normalizer().normalize_record(&raw).is_none());
    }

    #[test]
    fn test_missing_project_uses_account_id_for_both() {
        let mut raw = usage();
        raw.project_number = String::new();
        let report = normalizer().normalize_record(&raw).unwrap();
        assert_eq!(report.account_number, "ACCT-1");
        assert_eq!(report.account_name, "ACCT-1");
    }

    #[test]
    fn test_unparsable_start_time_defaults_to_today() {
        let mut raw = usage();
        raw.start_time = "02/01/2016".to_string();
        let report = normalizer().normalize_record(&raw).unwrap();
        assert_eq!(report.period(), BillingPeriod::new(15, 3, 2016));
    }

    #[test]
    fn test_parse_short_layout_export() {
        let text = "Account ID,Line Item,Start Time,End Time,Project,Measurement1,\
Measurement1 Total Consumption,Measurement1 Units,Credit1,Credit1 Amount,Credit1 Currency,\
Cost,Currency,Project Number,Description\n\
ACCT-1,com.google.cloud/storage,2016-02-02T00:00:00-08:00,2016-02-03T00:00:00-08:00,,\
byte-seconds,42,byte-seconds,,,,0.01,USD,99,Cloud Storage\n";

        let width = TableWidth::new(GcpNormalizer::MAX_COLUMNS, GcpNormalizer::MIN_COLUMNS).unwrap();
        let rows = TableReader::from_bytes(text.as_bytes(), width)
            .read_all()
            .unwrap();
        let usages: Vec<GcpUsage> = deserialize_rows(Provider::Gcp, rows).unwrap();
        let reports = normalizer().normalize(&usages);

        assert_eq!(reports.len(), 1);
        // No project id in the short layout, so the account id stands in.
        assert_eq!(reports[0].account_number, "ACCT-1");
        assert_eq!(reports[0].service_type, "Cloud Storage");
        assert_eq!(reports[0].period(), BillingPeriod::new(2, 2, 2016));
        assert_eq!(reports[0].usage_quantity, 42.0);
    }
}
