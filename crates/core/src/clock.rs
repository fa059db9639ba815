// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Clock abstraction for testable time handling

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A clock that provides the current time.
///
/// Tombstone ages and background-task deadlines are measured against this
/// clock so tests can drive reaping without real sleeps.
pub trait Clock: Clone + Send + Sync + 'static {
    fn now(&self) -> Instant;
}

/// Real system clock
#[derive(Clone, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Fake clock for testing with controllable time
#[derive(Clone)]
pub struct FakeClock {
    current: Arc<Mutex<Instant>>,
}

impl FakeClock {
    pub fn new() -> Self {
        Self { current: Arc::new(Mutex::new(Instant::now())) }
    }

    /// Advance the clock by the given duration
    pub fn advance(&self, duration: Duration) {
        *self.current.lock() += duration;
    }

    /// Set the clock to a specific instant
    pub fn set(&self, instant: Instant) {
        *self.current.lock() = instant;
    }
}

impl Default for FakeClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for FakeClock {
    fn now(&self) -> Instant {
        *self.current.lock()
    }
}

#[cfg(test)]
#[path = "clock_tests.rs"]
mod tests;
