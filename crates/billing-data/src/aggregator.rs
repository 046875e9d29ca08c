//! Identity-based consolidation of canonical reports.

use std::collections::HashMap;

use billing_core::models::{CanonicalReport, Identity};
use tracing::debug;

/// Merge reports that share an [`Identity`].
///
/// Each group becomes one report whose `usage_quantity` and `cost` are the
/// group sums; every other field comes from the first report seen. Output
/// keeps the order in which identities first appear.
pub fn consolidate(reports: Vec<CanonicalReport>) -> Vec<CanonicalReport> {
    let input = reports.len();
    let mut index: HashMap<Identity, usize> = HashMap::with_capacity(input);
    let mut merged: Vec<CanonicalReport> = Vec::with_capacity(input);

    for report in reports {
        match index.get(&report.id) {
            Some(&position) => {
                let target = &mut merged[position];
                target.usage_quantity += report.usage_quantity;
                target.cost += report.cost;
            }
            None => {
                index.insert(report.id.clone(), merged.len());
                merged.push(report);
            }
        }
    }

    debug!(input, output = merged.len(), "consolidated reports");
    merged
}
