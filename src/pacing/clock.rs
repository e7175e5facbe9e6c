//! Wall-clock access and calendar-day arithmetic for the daily budget

use chrono::{
    DateTime, Duration as ChronoDuration, FixedOffset, NaiveDate, NaiveTime, Offset, TimeZone, Utc,
};
use std::sync::Mutex;

/// Source of the current time
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = to;
    }

    pub fn advance(&self, by: ChronoDuration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Calendar days in a fixed UTC offset
#[derive(Debug, Clone, Copy)]
pub struct DayBoundary {
    offset: FixedOffset,
}

impl DayBoundary {
    /// Creates a boundary for `utc_offset_minutes`
    ///
    /// Returns `None` if the offset is outside ±24h.
    pub fn new(utc_offset_minutes: i32) -> Option<Self> {
        let offset = FixedOffset::east_opt(utc_offset_minutes.checked_mul(60)?)?;
        Some(Self { offset })
    }

    pub fn utc() -> Self {
        Self { offset: Utc.fix() }
    }

    /// The calendar day `at` falls in
    pub fn day_of(&self, at: DateTime<Utc>) -> NaiveDate {
        at.with_timezone(&self.offset).date_naive()
    }

    /// The instant the day containing `at` started
    pub fn start_of_day(&self, at: DateTime<Utc>) -> DateTime<Utc> {
        let local_midnight = self.day_of(at).and_time(NaiveTime::MIN);
        let offset_secs = i64::from(self.offset.local_minus_utc());
        Utc.from_utc_datetime(&local_midnight) - ChronoDuration::seconds(offset_secs)
    }

    /// How long until the next day starts
    pub fn until_next_day(&self, at: DateTime<Utc>) -> std::time::Duration {
        let next = self.start_of_day(at) + ChronoDuration::days(1);
        (next - at).to_std().unwrap_or_default()
    }
}
