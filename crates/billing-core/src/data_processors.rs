//! Defensive field parsers shared by the provider normalizers.
//!
//! Nothing here fails: a malformed value is replaced by a neutral default
//! (`0`, or "now" in the reference timezone) and a warning is logged.

use chrono::{DateTime, Datelike};
use tracing::warn;

use crate::models::{BillingPeriod, Provider};
use crate::time_utils::ReferenceTime;

/// Timestamp layout of timestamp-only exports, e.g. `2016-02-01T00:00:00-08:00`.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%:z";

// ── Numbers ───────────────────────────────────────────────────────────────────

/// Parse an additive measure, substituting `0.0` for anything that is not a
/// finite number.
pub fn parse_amount(provider: Provider, field: &str, raw: &str) -> f64 {
    match raw.trim().parse::<f64>() {
        Ok(value) if value.is_finite() => value,
        _ => {
            warn!(%provider, field, raw, "invalid numeric field, setting to 0");
            0.0
        }
    }
}

// ── Accounts ──────────────────────────────────────────────────────────────────

/// Account number and name a report is attributed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAccount {
    pub number: String,
    pub name: String,
}

/// Prefer the sub-account; fall back to the root account when either the
/// sub-account id or name is missing.
pub fn resolve_account(
    sub_id: &str,
    sub_name: &str,
    root_id: &str,
    root_name: &str,
) -> ResolvedAccount {
    let (number, name) = if sub_id.trim().is_empty() || sub_name.trim().is_empty() {
        (root_id, root_name)
    } else {
        (sub_id, sub_name)
    };
    ResolvedAccount {
        number: number.trim().to_string(),
        name: name.trim().to_string(),
    }
}

// ── Periods ───────────────────────────────────────────────────────────────────

/// Build a period from explicit day/month/year columns.
///
/// Each component that does not parse or is out of range is replaced by the
/// matching component of today in the reference timezone.
pub fn resolve_period(
    provider: Provider,
    day: &str,
    month: &str,
    year: &str,
    reference: &ReferenceTime,
) -> BillingPeriod {
    let today = reference.today();

    let month = match parse_in_range(month, 1, 12) {
        Some(m) => m,
        None => {
            warn!(%provider, raw = month, default = today.month, "month is invalid, defaulting to this month");
            today.month
        }
    };
    let day = match parse_in_range(day, 1, 31) {
        Some(d) => d,
        None => {
            warn!(%provider, raw = day, default = today.day, "day is invalid, defaulting to today");
            today.day
        }
    };
    let year = match year.trim().parse::<i32>() {
        Ok(y) if (1..=9999).contains(&y) => y,
        _ => {
            warn!(%provider, raw = year, default = today.year, "year is invalid, defaulting to this year");
            today.year
        }
    };

    BillingPeriod::new(day, month, year)
}

/// Build a period from a [`TIMESTAMP_FORMAT`] timestamp.
///
/// The period is the calendar date in the timestamp's own offset. An
/// unparsable timestamp defaults to today in the reference timezone.
pub fn period_from_timestamp(
    provider: Provider,
    raw: &str,
    reference: &ReferenceTime,
) -> BillingPeriod {
    let trimmed = raw.trim();
    let normalised = match trimmed.strip_suffix('Z') {
        Some(stripped) => format!("{stripped}+00:00"),
        None => trimmed.to_string(),
    };

    match DateTime::parse_from_str(&normalised, TIMESTAMP_FORMAT) {
        Ok(ts) => BillingPeriod::new(ts.day(), ts.month(), ts.year()),
        Err(_) => {
            let today = reference.today();
            warn!(%provider, raw, default = %today, "could not parse time, defaulting to today");
            today
        }
    }
}

fn parse_in_range(raw: &str, min: u32, max: u32) -> Option<u32> {
    raw.trim()
        .parse::<u32>()
        .ok()
        .filter(|v| (min..=max).contains(v))
}
