//! Provider-specific mapping of raw export rows onto [`CanonicalReport`].
//!
//! Each provider exposes a typed raw record (every column kept as text) and a
//! [`Normalizer`] that filters roll-up rows, resolves the account and period
//! and parses the additive measures defensively.

pub mod aws;
pub mod azure;
pub mod gcp;

use billing_core::data_processors::ResolvedAccount;
use billing_core::models::{BillingPeriod, CanonicalReport, Identity, Provider};
use serde::de::DeserializeOwned;

pub use aws::{AwsNormalizer, AwsUsage};
pub use azure::{AzureNormalizer, AzureUsage};
pub use gcp::{GcpNormalizer, GcpUsage};

/// Maps one provider's raw rows onto canonical reports.
pub trait Normalizer: Send + Sync {
    /// Typed row as exported by the provider.
    type Raw: DeserializeOwned;

    /// Widest accepted export row.
    const MAX_COLUMNS: usize;
    /// Narrowest accepted export row; `None` means exactly [`MAX_COLUMNS`](Self::MAX_COLUMNS).
    const MIN_COLUMNS: Option<usize> = None;
    /// Whether a billing month arrives as one export per day.
    const DAILY_EXPORTS: bool = false;

    fn provider(&self) -> Provider;

    /// Report for one raw row, or `None` for rows that are not line items.
    fn normalize_record(&self, raw: &Self::Raw) -> Option<CanonicalReport>;

    /// Reports for every line-item row, in input order.
    fn normalize(&self, records: &[Self::Raw]) -> Vec<CanonicalReport> {
        records
            .iter()
            .filter_map(|raw| self.normalize_record(raw))
            .collect()
    }
}

// ── ReportDraft ───────────────────────────────────────────────────────────────

/// Resolved fields of a report before its identity is derived.
#[derive(Debug, Clone)]
pub struct ReportDraft {
    pub provider: Provider,
    pub account: ResolvedAccount,
    pub service_type: String,
    pub region: String,
    pub period: BillingPeriod,
    pub usage_quantity: f64,
    pub unit_of_measure: String,
    pub cost: f64,
}

impl ReportDraft {
    /// Derive the identity and build the report.
    pub fn into_report(self) -> CanonicalReport {
        let id = Identity::derive(
            self.provider,
            &self.account.number,
            &self.service_type,
            &self.region,
            self.period,
        );
        CanonicalReport {
            id,
            account_number: self.account.number,
            account_name: self.account.name,
            day: self.period.day,
            month: self.period.month,
            year: self.period.year,
            service_type: self.service_type,
            region: self.region,
            provider: self.provider,
            usage_quantity: self.usage_quantity,
            unit_of_measure: self.unit_of_measure,
            cost: self.cost,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_draft_identity_matches_fields() {
        let report = ReportDraft {
            provider: Provider::Azure,
            account: ResolvedAccount {
                number: "sub-1".to_string(),
                name: "Team".to_string(),
            },
            service_type: "Storage".to_string(),
            region: "US West".to_string(),
            period: BillingPeriod::new(4, 2, 2016),
            usage_quantity: 2.0,
            unit_of_measure: "GB".to_string(),
            cost: 0.5,
        }
        .into_report();

        assert_eq!(
            report.id,
            Identity::derive(
                Provider::Azure,
                "sub-1",
                "Storage",
                "US West",
                BillingPeriod::new(4, 2, 2016)
            )
        );
        assert_eq!(report.period(), BillingPeriod::new(4, 2, 2016));
        assert_eq!(report.account_name, "Team");
        assert_eq!(report.unit_of_measure, "GB");
    }
}
