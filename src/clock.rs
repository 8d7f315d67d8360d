//! The single reference clock. Every date decision (current period, TTL expiry, the conversion day
//! boundary) reads the same clock, which runs in the statement source's timezone.

use crate::model::Period;
use chrono::{Duration, FixedOffset, NaiveDate, NaiveDateTime, Offset, Utc};
use parking_lot::Mutex;

pub trait Clock: Send + Sync {
    /// The current wall-clock time in the source timezone.
    fn now(&self) -> NaiveDateTime;

    fn today(&self) -> NaiveDate {
        self.now().date()
    }

    fn period(&self) -> Period {
        Period::from_date(self.today())
    }

    /// Milliseconds since the epoch for `now`, used as the timestamp of persisted cache entries.
    fn timestamp_millis(&self) -> i64 {
        self.now().and_utc().timestamp_millis()
    }
}

/// Real time, shifted to the source timezone.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    offset: FixedOffset,
}

impl SystemClock {
    pub fn new(utc_offset_minutes: i32) -> Self {
        let offset = FixedOffset::east_opt(utc_offset_minutes * 60)
            .unwrap_or_else(|| Utc.fix());
        Self { offset }
    }
}

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Utc::now().with_timezone(&self.offset).naive_local()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<NaiveDateTime>,
}

impl FixedClock {
    pub fn new(now: NaiveDateTime) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn set(&self, now: NaiveDateTime) {
        *self.now.lock() = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        *now += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        *self.now.lock()
    }
}
