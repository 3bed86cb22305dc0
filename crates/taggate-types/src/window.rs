use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::time;

/// Hourly counter that resets lazily: the reset happens on the next read
/// that observes a window older than one hour, never on a timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaCounter {
    pub count: u32,
    pub window_start: DateTime<Utc>,
}

/// Returned when a counter is already at its limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowFull {
    pub resets_at: DateTime<Utc>,
}

impl QuotaCounter {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            count: 0,
            window_start: now,
        }
    }

    pub fn has_elapsed(&self, now: DateTime<Utc>) -> bool {
        now - self.window_start >= time::hour()
    }

    /// The counter as it should be seen at `now`.
    pub fn rolled(self, now: DateTime<Utc>) -> Self {
        if self.has_elapsed(now) {
            Self::new(now)
        } else {
            self
        }
    }

    pub fn resets_at(&self) -> DateTime<Utc> {
        self.window_start + time::hour()
    }

    /// Check `limit` against the rolled counter without mutating it.
    pub fn check(&self, now: DateTime<Utc>, limit: Option<u32>) -> Result<(), WindowFull> {
        let rolled = self.rolled(now);
        match limit {
            Some(limit) if rolled.count >= limit => Err(WindowFull {
                resets_at: rolled.resets_at(),
            }),
            _ => Ok(()),
        }
    }

    /// Reset if the window elapsed, then count one event if under `limit`.
    /// On failure `self` is left untouched.
    pub fn check_and_increment(
        &mut self,
        now: DateTime<Utc>,
        limit: Option<u32>,
    ) -> Result<(), WindowFull> {
        let rolled = self.rolled(now);
        rolled.check(now, limit)?;
        *self = Self {
            count: rolled.count + 1,
            ..rolled
        };
        Ok(())
    }
}
