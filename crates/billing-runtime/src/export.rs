//! Archival CSV export of normalized reports.

use std::path::PathBuf;

use billing_core::error::{BillingError, Result};
use billing_core::models::{BillingPeriod, CanonicalReport};
use tracing::info;

/// Writes one CSV per billing month into a directory.
#[derive(Debug, Clone)]
pub struct CsvExporter {
    dir: PathBuf,
}

impl CsvExporter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// `{year}-{MonthName}-normalized-billing-data.csv`
    pub fn file_name(period: BillingPeriod) -> String {
        format!(
            "{}-{}-normalized-billing-data.csv",
            period.year,
            period.month_name()
        )
    }

    /// Write `reports` under the file name for `period`, replacing any
    /// previous export for that month. The header is written once, followed
    /// by the reports in the given order.
    pub fn write(&self, period: BillingPeriod, reports: &[CanonicalReport]) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.dir).map_err(|source| BillingError::File {
            path: self.dir.clone(),
            source,
        })?;

        let path = self.dir.join(Self::file_name(period));
        let tmp = path.with_extension("csv.tmp");

        let mut writer = csv::Writer::from_path(&tmp)?;
        for report in reports {
            writer.serialize(report)?;
        }
        writer.flush().map_err(|source| BillingError::File {
            path: tmp.clone(),
            source,
        })?;
        drop(writer);

        std::fs::rename(&tmp, &path).map_err(|source| BillingError::File {
            path: path.clone(),
            source,
        })?;

        info!(path = %path.display(), reports = reports.len(), "wrote normalized export");
        Ok(path)
    }
}
