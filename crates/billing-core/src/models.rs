use std::fmt;

use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Cloud provider a billing export came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Provider {
    #[serde(rename = "AWS")]
    Aws,
    #[serde(rename = "Azure")]
    Azure,
    #[serde(rename = "GCP")]
    Gcp,
}

impl Provider {
    /// Every supported provider, in the order batches are run. This order is
    /// also the row order of the archival export.
    pub const ALL: [Provider; 3] = [Provider::Azure, Provider::Gcp, Provider::Aws];

    /// Source tag written into every canonical report.
    pub fn as_str(self) -> &'static str {
        match self {
            Provider::Aws => "AWS",
            Provider::Azure => "Azure",
            Provider::Gcp => "GCP",
        }
    }

    /// Whether the provider's export reports month-to-date running totals
    /// rather than per-day amounts.
    pub fn is_cumulative(self) -> bool {
        matches!(self, Provider::Aws)
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── BillingPeriod ─────────────────────────────────────────────────────────────

/// Calendar day a report is attributed to.
///
/// Components are validated loosely (month in 1..=12, day in 1..=31) by the
/// normalizers, so a period is not guaranteed to be a real calendar date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BillingPeriod {
    pub day: u32,
    pub month: u32,
    pub year: i32,
}

impl BillingPeriod {
    pub fn new(day: u32, month: u32, year: i32) -> Self {
        Self { day, month, year }
    }

    /// Period of any chrono date or date-time.
    pub fn from_date(date: &impl Datelike) -> Self {
        Self {
            day: date.day(),
            month: date.month(),
            year: date.year(),
        }
    }

    /// The period as a real calendar date, when it is one.
    pub fn to_date(self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.year, self.month, self.day)
    }

    /// The calendar day before this one, rolling over months and years.
    ///
    /// Returns `None` when the period is not a real calendar date.
    pub fn previous_day(self) -> Option<Self> {
        let date = self.to_date()? - Duration::days(1);
        Some(Self::from_date(&date))
    }

    /// English month name, e.g. `"February"`.
    pub fn month_name(self) -> &'static str {
        u8::try_from(self.month)
            .ok()
            .and_then(|m| chrono::Month::try_from(m).ok())
            .map(|m| m.name())
            .unwrap_or("Unknown")
    }

    /// Whether `other` falls in the same month of the same year.
    pub fn same_month(self, other: BillingPeriod) -> bool {
        self.year == other.year && self.month == other.month
    }
}

impl fmt::Display for BillingPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}-{:02}", self.year, self.month, self.day)
    }
}

// ── Identity ──────────────────────────────────────────────────────────────────

/// Deterministic key of a logical billing line within one day.
///
/// Groups duplicate reports during consolidation and keys the cumulative
/// snapshot lookup.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    /// Hash the identifying components of a report.
    ///
    /// Components are separated by the ASCII unit separator so that
    /// `("ab", "c")` and `("a", "bc")` never collide.
    pub fn derive(
        provider: Provider,
        account_number: &str,
        service_type: &str,
        region: &str,
        period: BillingPeriod,
    ) -> Self {
        let mut hasher = Sha256::new();
        let year = period.year.to_string();
        let month = period.month.to_string();
        let day = period.day.to_string();
        let parts = [
            provider.as_str(),
            account_number,
            service_type,
            region,
            year.as_str(),
            month.as_str(),
            day.as_str(),
        ];
        for (i, part) in parts.iter().enumerate() {
            if i > 0 {
                hasher.update([0x1f]);
            }
            hasher.update(part.as_bytes());
        }
        Self(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ── CanonicalReport ───────────────────────────────────────────────────────────

/// One normalized usage/cost line, identical in shape for every provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalReport {
    #[serde(rename = "ID")]
    pub id: Identity,
    #[serde(rename = "Account Number")]
    pub account_number: String,
    #[serde(rename = "Account Name")]
    pub account_name: String,
    #[serde(rename = "Day")]
    pub day: u32,
    #[serde(rename = "Month")]
    pub month: u32,
    #[serde(rename = "Year")]
    pub year: i32,
    #[serde(rename = "Service Type")]
    pub service_type: String,
    #[serde(rename = "Region")]
    pub region: String,
    #[serde(rename = "Provider")]
    pub provider: Provider,
    /// Additive; always finite.
    #[serde(rename = "Usage Quantity")]
    pub usage_quantity: f64,
    #[serde(rename = "Unit Of Measurement")]
    pub unit_of_measure: String,
    /// Additive; always finite.
    #[serde(rename = "Cost")]
    pub cost: f64,
}

impl CanonicalReport {
    pub fn period(&self) -> BillingPeriod {
        BillingPeriod::new(self.day, self.month, self.year)
    }

    /// Lookup key for this report's cumulative snapshot.
    pub fn snapshot_query(&self) -> SnapshotQuery {
        SnapshotQuery {
            identity: self.id.clone(),
            provider: self.provider,
            account_number: self.account_number.clone(),
            service_type: self.service_type.clone(),
            region: self.region.clone(),
            period: self.period(),
            includes_period: false,
        }
    }
}

// ── Cumulative state ──────────────────────────────────────────────────────────

/// Previously recorded usage and cost for an identity in the current period.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageSnapshot {
    pub usage_quantity: f64,
    pub cost: f64,
}

/// Point lookup into the persisted cumulative state.
///
/// Carries the identity plus the components it was derived from so a store
/// can answer month-to-date queries without reversing the hash.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SnapshotQuery {
    pub identity: Identity,
    pub provider: Provider,
    pub account_number: String,
    pub service_type: String,
    pub region: String,
    pub period: BillingPeriod,
    /// Whether usage recorded on `period` itself counts towards the snapshot.
    /// When `false` only earlier days of the month count.
    pub includes_period: bool,
}

impl SnapshotQuery {
    /// The same logical line keyed on `period`, counting usage recorded up
    /// to and including that day.
    pub fn through(&self, period: BillingPeriod) -> Self {
        Self {
            identity: Identity::derive(
                self.provider,
                &self.account_number,
                &self.service_type,
                &self.region,
                period,
            ),
            period,
            includes_period: true,
            ..self.clone()
        }
    }
}
