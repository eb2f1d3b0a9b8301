use std::sync::Mutex;

use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, Offset, TimeZone, Utc, Weekday};

/// Source of the current time.
///
/// All counters and caps are evaluated against this clock, so tests can drive time explicitly
/// with [`ManualClock`].
pub trait Clock: Send + Sync {
    /// Current time.
    fn now(&self) -> DateTime<Utc>;

    /// Current time in epoch seconds.
    fn now_seconds(&self) -> i64 {
        self.now().timestamp()
    }

    /// Current time in epoch milliseconds.
    fn now_millis(&self) -> i64 {
        self.now().timestamp_millis()
    }
}

/// Wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    /// Start at `now`.
    pub fn new(now: DateTime<Utc>) -> ManualClock {
        ManualClock {
            now: Mutex::new(now),
        }
    }

    /// Start at the given epoch second.
    pub fn from_seconds(seconds: i64) -> ManualClock {
        ManualClock::new(DateTime::from_timestamp(seconds, 0).unwrap_or_default())
    }

    /// Jump to `now`.
    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = now;
    }

    /// Move the clock forward by `by`.
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Local calendar used for day and week boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Calendar {
    pub utc_offset: FixedOffset,
    pub week_start: Weekday,
}

impl Default for Calendar {
    fn default() -> Self {
        Calendar {
            utc_offset: Utc.fix(),
            week_start: Weekday::Mon,
        }
    }
}

impl Calendar {
    /// Local date of `now`.
    pub fn local_date(&self, now: DateTime<Utc>) -> NaiveDate {
        now.with_timezone(&self.utc_offset).date_naive()
    }

    /// Epoch seconds of local midnight opening the week that contains `now`.
    pub fn start_of_week(&self, now: DateTime<Utc>) -> i64 {
        let today = self.local_date(now);
        let days_into_week = (7 + today.weekday().num_days_from_monday()
            - self.week_start.num_days_from_monday())
            % 7;
        let first_day = today - Duration::days(i64::from(days_into_week));
        self.start_of_day(first_day)
    }

    /// Epoch seconds of local midnight opening `date`.
    pub fn start_of_day(&self, date: NaiveDate) -> i64 {
        let midnight = date.and_time(chrono::NaiveTime::MIN);
        self.utc_offset
            .from_local_datetime(&midnight)
            .earliest()
            .map_or_else(|| midnight.and_utc().timestamp(), |dt| dt.timestamp())
    }
}
