//! Timestamps and calendar periods.
//!
//! All periods are calendar periods in UTC. A period is identified by its
//! start, so two dates share a bucket exactly when their period starts match.

use chrono::{DateTime, Datelike, Months, TimeDelta, Timelike, Utc};
use serde::{Deserialize, Serialize};

pub type Timestamp = DateTime<Utc>;

/// 9999-12-31T23:59:59Z in seconds since the epoch.
const MAX_DATE_SECS: i64 = 253_402_300_799;

/// Returns the end date of the snapshot that is currently valid.
pub fn max_date() -> Timestamp {
    DateTime::<Utc>::from_timestamp(MAX_DATE_SECS, 0).unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Calendar granularity of a bucket or rollup row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Granularity {
    /// Keyed on (year, month, day, hour)
    Hourly,
    /// Keyed on (year, month, day)
    Daily,
    /// Keyed on (year, month)
    Monthly,
}

impl Granularity {
    /// Gets a short label for logs and row names.
    pub const fn label(self) -> &'static str {
        match self {
            Self::Hourly => "hour",
            Self::Daily => "day",
            Self::Monthly => "month",
        }
    }

    /// Returns the start of the period containing `date`.
    pub fn period_start(self, date: Timestamp) -> Timestamp {
        let day = date.date_naive();
        let start = match self {
            Self::Hourly => day.and_hms_opt(date.hour(), 0, 0),
            Self::Daily => day.and_hms_opt(0, 0, 0),
            Self::Monthly => day.with_day(1).and_then(|first| first.and_hms_opt(0, 0, 0)),
        };
        // Every UTC date has a midnight and a first of the month.
        start.map(|naive| naive.and_utc()).unwrap_or(date)
    }

    /// Returns the start of the period following the one containing `date`.
    pub fn next_period_start(self, date: Timestamp) -> Timestamp {
        self.shift(self.period_start(date), 1)
    }

    /// Returns the start of the period `periods` steps before the one containing `date`.
    pub fn periods_before(self, date: Timestamp, periods: u32) -> Timestamp {
        self.shift(self.period_start(date), -i64::from(periods))
    }

    /// Returns true when both dates fall into the same period.
    pub fn same_period(self, a: Timestamp, b: Timestamp) -> bool {
        self.period_start(a) == self.period_start(b)
    }

    fn shift(self, start: Timestamp, periods: i64) -> Timestamp {
        match self {
            Self::Hourly => start + TimeDelta::hours(periods),
            Self::Daily => start + TimeDelta::days(periods),
            Self::Monthly => {
                let months = Months::new(periods.unsigned_abs().min(u64::from(u32::MAX)) as u32);
                let shifted = if periods >= 0 {
                    start.checked_add_months(months)
                } else {
                    start.checked_sub_months(months)
                };
                shifted.unwrap_or(start)
            }
        }
    }
}

#[cfg(test)]
pub(crate) fn at(year: i32, month: u32, day: u32, hour: u32, minute: u32) -> Timestamp {
    use chrono::TimeZone;
    Utc.with_ymd_and_hms(year, month, day, hour, minute, 0)
        .single()
        .expect("valid test date")
}
