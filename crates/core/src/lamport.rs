// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Lamport clocks for ordering membership and event messages.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// A logical timestamp issued by a [`LamportClock`].
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct LamportTime(pub u64);

impl std::fmt::Display for LamportTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl LamportTime {
    /// Saturating subtraction, used for recent-buffer age checks.
    pub fn saturating_sub(self, n: u64) -> LamportTime {
        LamportTime(self.0.saturating_sub(n))
    }
}

/// Thread-safe monotonic logical clock.
///
/// Advanced by one on every locally issued message and pushed forward
/// past any remotely observed timestamp via [`LamportClock::witness`].
/// 64 bits is assumed ample; wraparound is not handled.
#[derive(Debug, Default)]
pub struct LamportClock {
    counter: AtomicU64,
}

impl LamportClock {
    pub fn new() -> Self {
        Self { counter: AtomicU64::new(0) }
    }

    /// Current time without advancing the clock.
    pub fn time(&self) -> LamportTime {
        LamportTime(self.counter.load(Ordering::SeqCst))
    }

    /// Advance by one and return the new value. Called before emitting.
    pub fn increment(&self) -> LamportTime {
        LamportTime(self.counter.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// Observe a remote timestamp: advance to `seen + 1` unless the local
    /// clock is already ahead.
    pub fn witness(&self, seen: LamportTime) {
        let mut current = self.counter.load(Ordering::SeqCst);
        while seen.0 >= current {
            match self.counter.compare_exchange_weak(
                current,
                seen.0 + 1,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return,
                Err(observed) => current = observed,
            }
        }
    }
}

#[cfg(test)]
#[path = "lamport_tests.rs"]
mod tests;
