//! Injected time source.
//!
//! Every component that needs "now" receives a [`Clock`]; nothing in the
//! engine reads the system time directly.

use std::sync::Mutex;

use chrono::{DateTime, TimeDelta, Utc};

use crate::fixed::Seconds;

/// An instant on the game timeline.
pub type Timestamp = DateTime<Utc>;

/// Supplies the current instant.
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// Wall-clock time, truncated to whole seconds so that every timestamp
/// the engine stores is second-aligned.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        truncate_to_second(Utc::now())
    }
}

/// A clock that only moves when told to. Shared between threads in tests
/// so all workers observe the same instant.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<Timestamp>,
}

impl ManualClock {
    pub fn new(start: Timestamp) -> Self {
        Self {
            now: Mutex::new(truncate_to_second(start)),
        }
    }

    /// Clock starting at the unix epoch plus `secs`.
    pub fn at_unix(secs: i64) -> Self {
        Self::new(DateTime::from_timestamp(secs, 0).unwrap_or_default())
    }

    pub fn set(&self, instant: Timestamp) {
        *self.lock() = truncate_to_second(instant);
    }

    pub fn advance(&self, secs: Seconds) {
        let mut now = self.lock();
        *now += TimeDelta::seconds(secs);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Timestamp> {
        // A poisoned clock still holds a valid instant.
        self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        *self.lock()
    }
}

/// Offset an instant by whole seconds.
pub fn after(instant: Timestamp, secs: Seconds) -> Timestamp {
    instant + TimeDelta::seconds(secs)
}

/// [`after`], or `None` when the result leaves chrono's range.
pub fn checked_after(instant: Timestamp, secs: Seconds) -> Option<Timestamp> {
    instant.checked_add_signed(TimeDelta::try_seconds(secs)?)
}

/// Whole seconds from `from` to `to` (negative if `to` is earlier).
pub fn seconds_between(from: Timestamp, to: Timestamp) -> Seconds {
    (to - from).num_seconds()
}

fn truncate_to_second(instant: Timestamp) -> Timestamp {
    DateTime::from_timestamp(instant.timestamp(), 0).unwrap_or(instant)
}
