//! Azure enrollment usage detail export.

use billing_core::data_processors::{parse_amount, resolve_account, resolve_period};
use billing_core::models::{CanonicalReport, Provider};
use billing_core::settings::PipelineConfig;
use billing_core::time_utils::ReferenceTime;
use serde::Deserialize;
use tracing::debug;

use super::{Normalizer, ReportDraft};

/// One row of the Azure export.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AzureUsage {
    #[serde(rename = "AccountOwnerId")]
    pub account_owner_id: String,
    #[serde(rename = "Account Name")]
    pub account_name: String,
    #[serde(rename = "ServiceAdministratorId")]
    pub service_administrator_id: String,
    #[serde(rename = "SubscriptionId")]
    pub subscription_id: String,
    #[serde(rename = "SubscriptionGuid")]
    pub subscription_guid: String,
    #[serde(rename = "Subscription Name")]
    pub subscription_name: String,
    #[serde(rename = "Date")]
    pub date: String,
    #[serde(rename = "Month")]
    pub month: String,
    #[serde(rename = "Day")]
    pub day: String,
    #[serde(rename = "Year")]
    pub year: String,
    #[serde(rename = "Product")]
    pub product: String,
    #[serde(rename = "Meter ID")]
    pub meter_id: String,
    #[serde(rename = "Meter Category")]
    pub meter_category: String,
    #[serde(rename = "Meter Sub-Category")]
    pub meter_sub_category: String,
    #[serde(rename = "Meter Region")]
    pub meter_region: String,
    #[serde(rename = "Meter Name")]
    pub meter_name: String,
    #[serde(rename = "Consumed Quantity")]
    pub consumed_quantity: String,
    #[serde(rename = "ResourceRate")]
    pub resource_rate: String,
    #[serde(rename = "ExtendedCost")]
    pub extended_cost: String,
    #[serde(rename = "Resource Location")]
    pub resource_location: String,
    #[serde(rename = "Consumed Service")]
    pub consumed_service: String,
    #[serde(rename = "Instance ID")]
    pub instance_id: String,
    #[serde(rename = "ServiceInfo1")]
    pub service_info1: String,
    #[serde(rename = "ServiceInfo2")]
    pub service_info2: String,
    #[serde(rename = "AdditionalInfo")]
    pub additional_info: String,
    #[serde(rename = "Tags")]
    pub tags: String,
    #[serde(rename = "Store Service Identifier")]
    pub store_service_identifier: String,
    #[serde(rename = "Department Name")]
    pub department_name: String,
    #[serde(rename = "Cost Center")]
    pub cost_center: String,
    #[serde(rename = "Unit Of Measure")]
    pub unit_of_measure: String,
    #[serde(rename = "Resource Group")]
    pub resource_group: String,
}

impl AzureUsage {
    /// Header of the export, in column order.
    pub const COLUMNS: [&'static str; 31] = [
        "AccountOwnerId",
        "Account Name",
        "ServiceAdministratorId",
        "SubscriptionId",
        "SubscriptionGuid",
        "Subscription Name",
        "Date",
        "Month",
        "Day",
        "Year",
        "Product",
        "Meter ID",
        "Meter Category",
        "Meter Sub-Category",
        "Meter Region",
        "Meter Name",
        "Consumed Quantity",
        "ResourceRate",
        "ExtendedCost",
        "Resource Location",
        "Consumed Service",
        "Instance ID",
        "ServiceInfo1",
        "ServiceInfo2",
        "AdditionalInfo",
        "Tags",
        "Store Service Identifier",
        "Department Name",
        "Cost Center",
        "Unit Of Measure",
        "Resource Group",
    ];
}

/// Normalizer for [`AzureUsage`] rows.
#[derive(Debug, Clone)]
pub struct AzureNormalizer {
    reference: ReferenceTime,
}

impl AzureNormalizer {
    pub fn new(reference: ReferenceTime) -> Self {
        Self { reference }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config.reference.clone())
    }
}

impl Normalizer for AzureNormalizer {
    type Raw = AzureUsage;

    const MAX_COLUMNS: usize = AzureUsage::COLUMNS.len();

    fn provider(&self) -> Provider {
        Provider::Azure
    }

    fn normalize_record(&self, raw: &AzureUsage) -> Option<CanonicalReport> {
        let service = raw.consumed_service.trim();
        if service.is_empty() {
            debug!(meter = %raw.meter_name, "skipping Azure row without consumed service");
            return None;
        }

        let draft = ReportDraft {
            provider: Provider::Azure,
            account: resolve_account(
                &raw.subscription_guid,
                &raw.subscription_name,
                &raw.account_owner_id,
                &raw.account_name,
            ),
            service_type: service.to_string(),
            region: raw.meter_region.trim().to_string(),
            period: resolve_period(
                Provider::Azure,
                &raw.day,
                &raw.month,
                &raw.year,
                &self.reference,
            ),
            usage_quantity: parse_amount(
                Provider::Azure,
                "Consumed Quantity",
                &raw.consumed_quantity,
            ),
            unit_of_measure: raw.unit_of_measure.trim().to_string(),
            cost: parse_amount(Provider::Azure, "ExtendedCost", &raw.extended_cost),
        };
        Some(draft.into_report())
    }
}
