//! Reference-date handling.
//!
//! Renewal windows are measured in whole calendar days from an "as of" date,
//! which is either supplied explicitly or taken as today in the reporting
//! timezone.

use chrono::{NaiveDate, Utc};
use chrono_tz::Tz;
use tracing::warn;

use crate::error::{LicenceError, Result};

/// Timezone used when none is configured.
pub const DEFAULT_TIMEZONE: &str = "Europe/London";

/// Detect the IANA timezone name of the running system.
///
/// Falls back to `"UTC"` if detection fails.
pub fn get_system_timezone() -> String {
    iana_time_zone::get_timezone().unwrap_or_else(|e| {
        warn!(error = %e, "could not detect system timezone; using UTC");
        "UTC".to_string()
    })
}

/// Resolve a timezone name. `"auto"` selects the system timezone.
pub fn resolve_timezone(name: &str) -> Result<Tz> {
    let name = if name.eq_ignore_ascii_case("auto") {
        get_system_timezone()
    } else {
        name.to_string()
    };
    name.parse::<Tz>()
        .map_err(|_| LicenceError::InvalidTimezone(name))
}

/// Today's calendar date in `tz`.
pub fn today_in(tz: Tz) -> NaiveDate {
    Utc::now().with_timezone(&tz).date_naive()
}

/// Parse a `YYYY-MM-DD` date.
pub fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .map_err(|_| LicenceError::InvalidDate(s.to_string()))
}

/// The "as of" date renewal windows are measured from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceDate {
    /// A pinned date, used for every cycle.
    Fixed(NaiveDate),
    /// Today in the given timezone, re-evaluated on every call.
    Today(Tz),
}

impl ReferenceDate {
    pub fn resolve(&self) -> NaiveDate {
        match self {
            ReferenceDate::Fixed(d) => *d,
            ReferenceDate::Today(tz) => today_in(*tz),
        }
    }
}

/// Whole days from `from` until `to`; negative when `to` is in the past.
pub fn days_until(from: NaiveDate, to: NaiveDate) -> i64 {
    (to - from).num_days()
}
