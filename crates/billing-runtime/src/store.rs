//! Report persistence and month-to-date lookups.
//!
//! Both stores keep the full report history in memory behind an `RwLock`.
//! [`JsonFileStore`] additionally mirrors it to a JSON file that is rewritten
//! atomically on every save.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::RwLock;

use billing_core::error::{BillingError, Result};
use billing_core::models::{CanonicalReport, Identity, SnapshotQuery, UsageSnapshot};
use billing_data::cumulative::UsageToDateLookup;
use tracing::{debug, info};

/// Destination for finished reports.
pub trait ReportSink: Send + Sync {
    /// Persist `reports`. A report whose ID is already stored is ignored.
    fn save_reports(&self, reports: &[CanonicalReport]) -> Result<()>;
}

// ── ReportTable ───────────────────────────────────────────────────────────────

/// Insert-ignore report history shared by the stores.
#[derive(Debug, Clone, Default)]
struct ReportTable {
    reports: Vec<CanonicalReport>,
    ids: HashSet<Identity>,
}

impl ReportTable {
    fn from_reports(reports: Vec<CanonicalReport>) -> Self {
        let mut table = Self::default();
        table.insert_ignore(&reports);
        table
    }

    /// Returns the number of reports actually inserted.
    fn insert_ignore(&mut self, reports: &[CanonicalReport]) -> usize {
        let mut inserted = 0;
        for report in reports {
            if self.ids.insert(report.id.clone()) {
                self.reports.push(report.clone());
                inserted += 1;
            }
        }
        inserted
    }

    /// Sum of the line's reports earlier in the same month, including the
    /// queried day itself when the query asks for it.
    fn usage_to_date(&self, query: &SnapshotQuery) -> Option<UsageSnapshot> {
        let last_day = query.period.day;
        let mut matched = false;
        let mut total = UsageSnapshot::default();
        for report in self.reports.iter().filter(|r| {
            r.provider == query.provider
                && r.account_number == query.account_number
                && r.service_type == query.service_type
                && r.region == query.region
                && r.period().same_month(query.period)
                && (r.day < last_day || (query.includes_period && r.day == last_day))
        }) {
            matched = true;
            total.usage_quantity += report.usage_quantity;
            total.cost += report.cost;
        }
        matched.then_some(total)
    }
}

fn check_not_empty(reports: &[CanonicalReport]) -> Result<()> {
    if reports.is_empty() {
        return Err(BillingError::Persistence("no reports to save".to_string()));
    }
    Ok(())
}

fn poisoned() -> BillingError {
    BillingError::Persistence("report store lock poisoned".to_string())
}

// ── MemoryStore ───────────────────────────────────────────────────────────────

/// Store that lives only as long as the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    table: RwLock<ReportTable>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_reports(reports: Vec<CanonicalReport>) -> Self {
        Self {
            table: RwLock::new(ReportTable::from_reports(reports)),
        }
    }

    /// Snapshot of every stored report, in insertion order.
    pub fn reports(&self) -> Result<Vec<CanonicalReport>> {
        let table = self.table.read().map_err(|_| poisoned())?;
        Ok(table.reports.clone())
    }
}

impl ReportSink for MemoryStore {
    fn save_reports(&self, reports: &[CanonicalReport]) -> Result<()> {
        check_not_empty(reports)?;
        let mut table = self.table.write().map_err(|_| poisoned())?;
        let inserted = table.insert_ignore(reports);
        debug!(inserted, ignored = reports.len() - inserted, "saved reports in memory");
        Ok(())
    }
}

impl UsageToDateLookup for MemoryStore {
    fn usage_to_date(&self, query: &SnapshotQuery) -> Result<Option<UsageSnapshot>> {
        let table = self.table.read().map_err(|_| poisoned())?;
        Ok(table.usage_to_date(query))
    }
}

// ── JsonFileStore ─────────────────────────────────────────────────────────────

/// Store persisted as a JSON array of reports.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    table: RwLock<ReportTable>,
}

impl JsonFileStore {
    /// Open the store at `path`. A missing file is an empty store.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let reports: Vec<CanonicalReport> = match std::fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(source) => return Err(BillingError::File { path, source }),
        };
        debug!(path = %path.display(), reports = reports.len(), "opened report store");
        Ok(Self {
            path,
            table: RwLock::new(ReportTable::from_reports(reports)),
        })
    }

    /// Snapshot of every stored report, in insertion order.
    pub fn reports(&self) -> Result<Vec<CanonicalReport>> {
        let table = self.table.read().map_err(|_| poisoned())?;
        Ok(table.reports.clone())
    }

    /// Atomically write `reports` to the store file.
    fn write_file(&self, reports: &[CanonicalReport]) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_vec_pretty(reports).map_err(std::io::Error::other)?;

        // Write to a temp file then rename for atomicity.
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, &json)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl ReportSink for JsonFileStore {
    fn save_reports(&self, reports: &[CanonicalReport]) -> Result<()> {
        check_not_empty(reports)?;
        let mut table = self.table.write().map_err(|_| poisoned())?;

        // Only publish the new table once it is on disk.
        let mut updated = table.clone();
        let inserted = updated.insert_ignore(reports);
        if inserted > 0 {
            self.write_file(&updated.reports).map_err(|e| {
                BillingError::Persistence(format!("{}: {e}", self.path.display()))
            })?;
        }
        *table = updated;

        info!(
            path = %self.path.display(),
            inserted,
            ignored = reports.len() - inserted,
            "saved reports"
        );
        Ok(())
    }
}

impl UsageToDateLookup for JsonFileStore {
    fn usage_to_date(&self, query: &SnapshotQuery) -> Result<Option<UsageSnapshot>> {
        let table = self.table.read().map_err(|_| poisoned())?;
        Ok(table.usage_to_date(query))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use billing_core::models::{BillingPeriod, Provider};
    use tempfile::TempDir;

    fn make_report(day: u32, quantity: f64, cost: f64) -> CanonicalReport {
        make_report_for("EC2", day, 3, quantity, cost)
    }

    fn make_report_for(service: &str, day: u32, month: u32, quantity: f64, cost: f64) -> CanonicalReport {
        let period = BillingPeriod::new(day, month, 2016);
        CanonicalReport {
            id: Identity::derive(Provider::Aws, "L1", service, "us-east-1a", period),
            account_number: "L1".to_string(),
            account_name: "Linked".to_string(),
            day,
            month,
            year: 2016,
            service_type: service.to_string(),
            region: "us-east-1a".to_string(),
            provider: Provider::Aws,
            usage_quantity: quantity,
            unit_of_measure: String::new(),
            cost,
        }
    }

    // ── MemoryStore ───────────────────────────────────────────────────────────

    #[test]
    fn test_memory_store_ignores_duplicate_ids() {
        let store = MemoryStore::new();
        store.save_reports(&[make_report(1, 1.0, 1.0)]).unwrap();
        store
            .save_reports(&[make_report(1, 5.0, 5.0), make_report(2, 2.0, 2.0)])
            .unwrap();

        let reports = store.reports().unwrap();
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].usage_quantity, 1.0);
    }

    #[test]
    fn test_saving_nothing_is_an_error() {
        let store = MemoryStore::new();
        let err = store.save_reports(&[]).unwrap_err();
        assert!(matches!(err, BillingError::Persistence(_)));
        assert!(err.to_string().contains("no reports to save"));
    }

    #[test]
    fn test_usage_to_date_sums_earlier_days_of_month() {
        let store = MemoryStore::with_reports(vec![
            make_report(1, 3.0, 30.0),
            make_report(2, 6.0, 60.0),
            make_report(3, 100.0, 100.0),
            make_report_for("S3", 1, 3, 50.0, 50.0),
            make_report_for("EC2", 28, 2, 70.0, 70.0),
        ]);

        let query = make_report(3, 0.0, 0.0).snapshot_query();
        let snapshot = store.usage_to_date(&query).unwrap().unwrap();
        assert_eq!(snapshot.usage_quantity, 9.0);
        assert_eq!(snapshot.cost, 90.0);
    }

    #[test]
    fn test_usage_to_date_through_day_includes_it() {
        let store = MemoryStore::with_reports(vec![
            make_report(1, 3.0, 30.0),
            make_report(2, 6.0, 60.0),
            make_report(3, 100.0, 100.0),
        ]);

        let query = make_report(3, 0.0, 0.0)
            .snapshot_query()
            .through(BillingPeriod::new(2, 3, 2016));
        let snapshot = store.usage_to_date(&query).unwrap().unwrap();
        assert_eq!(snapshot.usage_quantity, 9.0);
        assert_eq!(snapshot.cost, 90.0);
    }

    #[test]
    fn test_usage_to_date_first_of_month_is_none() {
        let store = MemoryStore::with_reports(vec![make_report_for("EC2", 28, 2, 1.0, 1.0)]);
        let query = make_report(1, 0.0, 0.0).snapshot_query();
        assert_eq!(store.usage_to_date(&query).unwrap(), None);
    }

    // ── JsonFileStore ─────────────────────────────────────────────────────────

    #[test]
    fn test_json_store_missing_file_is_empty() {
        let tmp = TempDir::new().expect("tempdir");
        let store = JsonFileStore::open(tmp.path().join("reports.json")).unwrap();
        assert!(store.reports().unwrap().is_empty());
    }

    #[test]
    fn test_json_store_persists_across_reopen() {
        let tmp = TempDir::new().expect("tempdir");
        let path = tmp.path().join("state").join("reports.json");

        let store = JsonFileStore::open(&path).unwrap();
        store
            .save_reports(&[make_report(1, 3.0, 30.0), make_report(2, 6.0, 60.0)])
            .unwrap();
        assert!(path.exists());
        assert!(!path.with_extension("json.tmp").exists());

        let reopened = JsonFileStore::open(&path).unwrap();
        assert_eq!(reopened.reports().unwrap(), store.reports().unwrap());

        let query = make_report(3, 0.0, 0.0).snapshot_query();
        let snapshot = reopened.usage_to_date(&query).unwrap().unwrap();
        assert_eq!(snapshot.cost, 90.0);
    }

    #[test]
    fn test_json_store_file_uses_report_column_names() {
        let tmp = TempDir::new().expect("tempdir");
        let path = tmp.path().join("reports.json");
        let store = JsonFileStore::open(&path).unwrap();
        store.save_reports(&[make_report(1, 1.0, 1.0)]).unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"Account Number\""));
        assert!(raw.contains("\"Provider\": \"AWS\""));
    }

    #[test]
    fn test_json_store_rejects_corrupt_file() {
        let tmp = TempDir::new().expect("tempdir");
        let path = tmp.path().join("reports.json");
        std::fs::write(&path, "{not json").unwrap();

        assert!(matches!(
            JsonFileStore::open(&path),
            Err(BillingError::JsonParse(_))
        ));
    }
}
