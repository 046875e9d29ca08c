//! AWS detailed billing export.
//!
//! The export is a month-to-date running total with no usable per-row date,
//! so every report is attributed to one export day and the region is the
//! configured availability zone.

use billing_core::data_processors::{parse_amount, resolve_account};
use billing_core::models::{BillingPeriod, CanonicalReport, Provider};
use billing_core::settings::{ExportDay, PipelineConfig};
use billing_core::time_utils::ReferenceTime;
use serde::Deserialize;
use tracing::debug;

use super::{Normalizer, ReportDraft};

/// Record types that carry billable usage; everything else is a roll-up.
const LINE_ITEM_RECORD_TYPES: [&str; 2] = ["PayerLineItem", "LinkedLineItem"];

/// One row of the AWS export.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct AwsUsage {
    #[serde(rename = "InvoiceID")]
    pub invoice_id: String,
    pub payer_account_id: String,
    pub linked_account_id: String,
    pub record_type: String,
    #[serde(rename = "RecordID")]
    pub record_id: String,
    pub billing_period_start_date: String,
    pub billing_period_end_date: String,
    pub invoice_date: String,
    pub payer_account_name: String,
    pub linked_account_name: String,
    pub taxation_address: String,
    #[serde(rename = "PayerPONumber")]
    pub payer_po_number: String,
    pub product_code: String,
    pub product_name: String,
    pub seller_of_record: String,
    pub usage_type: String,
    pub operation: String,
    pub rate_id: String,
    pub item_description: String,
    pub usage_start_date: String,
    pub usage_end_date: String,
    pub usage_quantity: String,
    pub blended_rate: String,
    pub currency_code: String,
    pub cost_before_tax: String,
    pub credits: String,
    pub tax_amount: String,
    pub tax_type: String,
    pub total_cost: String,
}

impl AwsUsage {
    /// Header of the export, in column order.
    pub const COLUMNS: [&'static str; 29] = [
        "InvoiceID",
        "PayerAccountId",
        "LinkedAccountId",
        "RecordType",
        "RecordID",
        "BillingPeriodStartDate",
        "BillingPeriodEndDate",
        "InvoiceDate",
        "PayerAccountName",
        "LinkedAccountName",
        "TaxationAddress",
        "PayerPONumber",
        "ProductCode",
        "ProductName",
        "SellerOfRecord",
        "UsageType",
        "Operation",
        "RateId",
        "ItemDescription",
        "UsageStartDate",
        "UsageEndDate",
        "UsageQuantity",
        "BlendedRate",
        "CurrencyCode",
        "CostBeforeTax",
        "Credits",
        "TaxAmount",
        "TaxType",
        "TotalCost",
    ];

    pub fn is_line_item(&self) -> bool {
        LINE_ITEM_RECORD_TYPES.contains(&self.record_type.trim())
    }
}

/// Normalizer for [`AwsUsage`] rows.
#[derive(Debug, Clone)]
pub struct AwsNormalizer {
    region: String,
    period: BillingPeriod,
}

impl AwsNormalizer {
    /// The export day is resolved once, so a run that crosses midnight still
    /// attributes every row to the same day.
    pub fn new(reference: &ReferenceTime, region: impl Into<String>, export_day: ExportDay) -> Self {
        let period = match export_day {
            ExportDay::Today => reference.today(),
            ExportDay::Yesterday => reference.yesterday(),
        };
        Self {
            region: region.into(),
            period,
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(&config.reference, config.aws_region.clone(), config.aws_export_day)
    }

    pub fn period(&self) -> BillingPeriod {
        self.period
    }
}

impl Normalizer for AwsNormalizer {
    type Raw = AwsUsage;

    const MAX_COLUMNS: usize = AwsUsage::COLUMNS.len();

    fn provider(&self) -> Provider {
        Provider::Aws
    }

    fn normalize_record(&self, raw: &AwsUsage) -> Option<CanonicalReport> {
        if !raw.is_line_item() {
            debug!(record_type = %raw.record_type, "skipping AWS roll-up row");
            return None;
        }

        let draft = ReportDraft {
            provider: Provider::Aws,
            account: resolve_account(
                &raw.linked_account_id,
                &raw.linked_account_name,
                &raw.payer_account_id,
                &raw.payer_account_name,
            ),
            service_type: raw.product_name.trim().to_string(),
            region: self.region.clone(),
            period: self.period,
            usage_quantity: parse_amount(Provider::Aws, "UsageQuantity", &raw.usage_quantity),
            unit_of_measure: String::new(),
            cost: parse_amount(Provider::Aws, "TotalCost", &raw.total_cost),
        };
        Some(draft.into_report())
    }
}
