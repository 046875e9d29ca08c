//! Conversion of cumulative month-to-date totals into daily deltas.

use std::sync::Arc;

use billing_core::error::{BillingError, Result};
use billing_core::models::{CanonicalReport, SnapshotQuery, UsageSnapshot};
use billing_core::settings::LookupDay;
use tracing::{debug, warn};

/// Read access to previously recorded usage.
pub trait UsageToDateLookup: Send + Sync {
    /// Usage already recorded for the query's line this month, before the
    /// queried day or through it when [`SnapshotQuery::includes_period`] is
    /// set. `None` when nothing has been recorded.
    fn usage_to_date(&self, query: &SnapshotQuery) -> Result<Option<UsageSnapshot>>;
}

impl<T: UsageToDateLookup + ?Sized> UsageToDateLookup for Arc<T> {
    fn usage_to_date(&self, query: &SnapshotQuery) -> Result<Option<UsageSnapshot>> {
        (**self).usage_to_date(query)
    }
}

/// Subtracts recorded usage from cumulative reports.
#[derive(Clone)]
pub struct DeltaCalculator {
    lookup: Arc<dyn UsageToDateLookup>,
    lookup_day: LookupDay,
}

impl DeltaCalculator {
    pub fn new(lookup: Arc<dyn UsageToDateLookup>, lookup_day: LookupDay) -> Self {
        Self { lookup, lookup_day }
    }

    /// Query used to fetch the snapshot for `report`, or `None` when nothing
    /// can have been recorded for it yet.
    ///
    /// With [`LookupDay::DayBefore`] the query covers the month through the
    /// previous day, so a report on the first of a month has no snapshot.
    pub fn query_for(&self, report: &CanonicalReport) -> Option<SnapshotQuery> {
        let query = report.snapshot_query();
        match self.lookup_day {
            LookupDay::Report => Some(query),
            LookupDay::DayBefore => {
                let period = report.period();
                match period.previous_day() {
                    Some(previous) if previous.same_month(period) => Some(query.through(previous)),
                    Some(_) => None,
                    None => {
                        warn!(%period, "period is not a calendar date, looking up its own day");
                        Some(query)
                    }
                }
            }
        }
    }

    /// Rewrite each report's measures to the increment since the recorded
    /// snapshot. Reports without a snapshot are returned unchanged.
    ///
    /// A failed lookup fails the whole call; no partially adjusted list is
    /// ever returned.
    pub fn apply(&self, reports: &[CanonicalReport]) -> Result<Vec<CanonicalReport>> {
        let mut adjusted = Vec::with_capacity(reports.len());
        let mut found = 0usize;

        for report in reports {
            let mut report = report.clone();
            let Some(query) = self.query_for(&report) else {
                adjusted.push(report);
                continue;
            };

            let snapshot = self
                .lookup
                .usage_to_date(&query)
                .map_err(|e| BillingError::Lookup {
                    identity: query.identity.clone(),
                    source: Box::new(e),
                })?;

            if let Some(snapshot) = snapshot {
                report.usage_quantity -= snapshot.usage_quantity;
                report.cost -= snapshot.cost;
                found += 1;
            }
            adjusted.push(report);
        }

        debug!(reports = adjusted.len(), snapshots = found, "applied cumulative deltas");
        Ok(adjusted)
    }
}
