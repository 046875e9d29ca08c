use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;

use crate::error::{BillingError, Result};
use crate::models::BillingPeriod;

// ── Clock ─────────────────────────────────────────────────────────────────────

/// Source of the current instant.
pub trait Clock: Send + Sync {
    fn now_utc(&self) -> DateTime<Utc>;
}

/// Wall-clock time of the running process.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock frozen at one instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now_utc(&self) -> DateTime<Utc> {
        self.0
    }
}

// ── ReferenceTime ─────────────────────────────────────────────────────────────

/// "Now" as seen from the configured reference timezone.
///
/// Normalizers default unparsable periods to this, never to the host zone.
#[derive(Clone)]
pub struct ReferenceTime {
    tz: Tz,
    clock: Arc<dyn Clock>,
}

impl ReferenceTime {
    pub fn new(tz: Tz, clock: Arc<dyn Clock>) -> Self {
        Self { tz, clock }
    }

    /// Reference time backed by the system clock.
    pub fn system(tz: Tz) -> Self {
        Self::new(tz, Arc::new(SystemClock))
    }

    /// Reference time frozen at `instant`.
    pub fn fixed(tz: Tz, instant: DateTime<Utc>) -> Self {
        Self::new(tz, Arc::new(FixedClock(instant)))
    }

    pub fn timezone(&self) -> Tz {
        self.tz
    }

    pub fn now(&self) -> DateTime<Tz> {
        self.clock.now_utc().with_timezone(&self.tz)
    }

    pub fn today(&self) -> BillingPeriod {
        BillingPeriod::from_date(&self.now().date_naive())
    }

    /// The day before [`today`](Self::today), rolling over months and years.
    pub fn yesterday(&self) -> BillingPeriod {
        let date = self.now().date_naive() - chrono::Duration::days(1);
        BillingPeriod::from_date(&date)
    }
}

impl fmt::Debug for ReferenceTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReferenceTime")
            .field("tz", &self.tz)
            .field("now", &self.now())
            .finish()
    }
}

// ── Timezone parsing ──────────────────────────────────────────────────────────

/// Parse an IANA timezone name.
pub fn parse_timezone(tz_name: &str) -> Result<Tz> {
    tz_name
        .trim()
        .parse::<Tz>()
        .map_err(|_| BillingError::Config(format!("unrecognised timezone \"{tz_name}\"")))
}
