// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Clock abstraction for testable time handling

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// A clock that provides the current time
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> Instant;

    /// Milliseconds since the Unix epoch. Wall-time budgets and the contents
    /// of heartbeat/stop files are expressed in these.
    fn epoch_millis(&self) -> i64;
}

/// Real system clock
#[derive(Clone, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn epoch_millis(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// Fake clock for testing with controllable time
#[derive(Clone)]
pub struct FakeClock {
    current: Arc<Mutex<FakeTime>>,
}

struct FakeTime {
    instant: Instant,
    millis: i64,
}

impl FakeClock {
    pub fn new() -> Self {
        Self {
            current: Arc::new(Mutex::new(FakeTime {
                instant: Instant::now(),
                millis: 1_700_000_000_000,
            })),
        }
    }

    /// Advance the clock by the given duration
    pub fn advance(&self, duration: Duration) {
        let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        current.instant += duration;
        current.millis += duration.as_millis() as i64;
    }

    /// Pin the epoch-millis component to a specific value
    pub fn set_millis(&self, millis: i64) {
        let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        current.millis = millis;
    }
}

impl Default for FakeClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for FakeClock {
    fn now(&self) -> Instant {
        self.current.lock().unwrap_or_else(|e| e.into_inner()).instant
    }

    fn epoch_millis(&self) -> i64 {
        self.current.lock().unwrap_or_else(|e| e.into_inner()).millis
    }
}

#[cfg(test)]
#[path = "clock_tests.rs"]
mod tests;
