// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn starts_at_zero() {
    let clock = LamportClock::new();
    assert_eq!(clock.time(), LamportTime(0));
}

#[test]
fn increment_returns_new_value() {
    let clock = LamportClock::new();
    assert_eq!(clock.increment(), LamportTime(1));
    assert_eq!(clock.increment(), LamportTime(2));
    assert_eq!(clock.time(), LamportTime(2));
}

#[test]
fn witness_advances_past_seen() {
    let clock = LamportClock::new();
    clock.witness(LamportTime(41));
    assert_eq!(clock.time(), LamportTime(42));
}

#[test]
fn witness_ignores_stale_time() {
    let clock = LamportClock::new();
    clock.witness(LamportTime(41));
    clock.witness(LamportTime(10));
    assert_eq!(clock.time(), LamportTime(42));
}

#[test]
fn witness_equal_time_still_advances() {
    let clock = LamportClock::new();
    clock.witness(LamportTime(5));
    clock.witness(LamportTime(6));
    assert_eq!(clock.time(), LamportTime(7));
}

#[test]
fn concurrent_increments_never_duplicate() {
    use std::sync::Arc;

    let clock = Arc::new(LamportClock::new());
    let mut handles = Vec::new();
    for _ in 0..8 {
        let clock = Arc::clone(&clock);
        handles.push(std::thread::spawn(move || {
            let mut seen = Vec::with_capacity(1000);
            for _ in 0..1000 {
                seen.push(clock.increment());
            }
            seen
        }));
    }

    let mut all: Vec<LamportTime> = handles
        .into_iter()
        .flat_map(|h| h.join().unwrap())
        .collect();
    all.sort();
    all.dedup();
    assert_eq!(all.len(), 8000);
    assert_eq!(clock.time(), LamportTime(8000));
}
