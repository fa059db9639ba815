// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Lifecycle gating specs.

use crate::specs::prelude::*;
use std::sync::Arc;

/// `Alive → Leaving → Left → Shutdown`, with readiness only in `Alive`.
#[tokio::test]
async fn lifecycle_gates_readiness() {
    let cluster = MemoryCluster::new();
    let (serf, _rx) = launch(&cluster, "n1", 7301, FakeClock::new(), |_| {}).await;

    assert_eq!(serf.state(), SerfState::Alive);
    assert!(serf.is_ready());

    serf.leave().await.unwrap();
    assert_eq!(serf.state(), SerfState::Left);
    assert!(!serf.is_ready());

    serf.shutdown().await.unwrap();
    assert_eq!(serf.state(), SerfState::Shutdown);
    assert!(!serf.is_ready());
}

/// State observations are repeatable and thread-safe: one hundred
/// concurrent readers agree.
#[tokio::test]
async fn concurrent_readiness_reads_agree() {
    let cluster = MemoryCluster::new();
    let (serf, _rx) = launch(&cluster, "n1", 7302, FakeClock::new(), |_| {}).await;
    let serf = Arc::new(serf);

    let mut readers = Vec::new();
    for _ in 0..100 {
        let serf = Arc::clone(&serf);
        readers.push(tokio::spawn(async move { serf.is_ready() }));
    }
    for reader in readers {
        assert!(reader.await.unwrap());
    }

    serf.leave().await.unwrap();
    let mut readers = Vec::new();
    for _ in 0..100 {
        let serf = Arc::clone(&serf);
        readers.push(tokio::spawn(async move { serf.is_ready() }));
    }
    for reader in readers {
        assert!(!reader.await.unwrap());
    }

    serf.shutdown().await.unwrap();
}

/// Shutdown returns within its bounded budget when only background
/// tasks are outstanding.
#[tokio::test]
#[serial_test::serial]
async fn shutdown_completes_within_budget() {
    let cluster = MemoryCluster::new();
    let (serf, _rx) = launch(&cluster, "n1", 7303, FakeClock::new(), |c| {
        c.reap_interval = Duration::from_secs(3600);
        c.reconnect_interval = Duration::from_secs(3600);
        c.snapshot_path = None;
    })
    .await;

    let started = std::time::Instant::now();
    serf.shutdown().await.unwrap();
    assert!(
        started.elapsed() < Duration::from_secs(2),
        "shutdown took {:?}",
        started.elapsed()
    );
}
