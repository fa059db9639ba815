// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! User event dissemination specs.

use crate::specs::prelude::*;
use muster_core::Error;

async fn next_user_event(rx: &mut mpsc::Receiver<Event>) -> muster_core::UserEvent {
    loop {
        let event = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("timed out waiting for user event")
            .expect("event channel closed");
        if let Event::User(e) = event {
            return e;
        }
    }
}

/// An oversized user event fails with a limit error naming the problem.
#[tokio::test]
async fn oversized_user_event_is_rejected() {
    let cluster = MemoryCluster::new();
    let (n1, _rx) = launch(&cluster, "n1", 7201, FakeClock::new(), |c| {
        c.user_event_size_limit = 512;
    })
    .await;

    let result = n1
        .user_event("this is too large an event", vec![0u8; 512], false)
        .await;
    match result {
        Err(Error::LimitExceeded(msg)) => assert!(msg.contains("user event exceeds")),
        other => panic!("expected LimitExceeded, got {other:?}"),
    }
    n1.shutdown().await.unwrap();
}

/// Payloads right at the boundary succeed; one byte past fails.
#[tokio::test]
async fn user_event_size_boundary_is_exact() {
    let cluster = MemoryCluster::new();
    let (n1, mut rx) = launch(&cluster, "n1", 7202, FakeClock::new(), |_| {}).await;

    let name = "edge";
    let fits = 512 - name.len() - muster_wire::USER_EVENT_OVERHEAD;
    n1.user_event(name, vec![7u8; fits], false).await.unwrap();
    assert_eq!(next_user_event(&mut rx).await.payload.len(), fits);

    assert!(matches!(
        n1.user_event(name, vec![7u8; fits + 1], false).await,
        Err(Error::LimitExceeded(_))
    ));
    n1.shutdown().await.unwrap();
}

/// An empty payload is legal and delivered empty.
#[tokio::test]
async fn empty_payload_round_trips() {
    let cluster = MemoryCluster::new();
    let (n1, mut rx) = launch(&cluster, "n1", 7203, FakeClock::new(), |_| {}).await;

    n1.user_event("ping", vec![], true).await.unwrap();
    let event = next_user_event(&mut rx).await;
    assert_eq!(event.name, "ping");
    assert!(event.payload.is_empty());
    assert!(event.coalesce);
    n1.shutdown().await.unwrap();
}

/// What the origin sends is what every observer sees, bit-exactly,
/// coalesce flag included.
#[tokio::test]
async fn user_event_is_bit_exact_across_the_cluster() {
    let cluster = MemoryCluster::new();
    let (n1, mut rx1) = launch(&cluster, "n1", 7204, FakeClock::new(), |_| {}).await;
    let (n2, mut rx2) = launch(&cluster, "n2", 7205, FakeClock::new(), |_| {}).await;
    n1.join(&[addr(7205)], false).await.unwrap();

    let payload: Vec<u8> = (0..=255u8).rev().collect();
    n1.user_event("blob", payload.clone(), true).await.unwrap();

    for rx in [&mut rx1, &mut rx2] {
        let event = next_user_event(rx).await;
        assert_eq!(event.name, "blob");
        assert_eq!(event.payload, payload);
        assert!(event.coalesce);
    }

    n1.shutdown().await.unwrap();
    n2.shutdown().await.unwrap();
}

/// Events from two senders interleave, but each sender's own events
/// arrive in Lamport order.
#[tokio::test]
async fn per_sender_events_arrive_in_lamport_order() {
    let cluster = MemoryCluster::new();
    let (n1, _rx1) = launch(&cluster, "n1", 7206, FakeClock::new(), |_| {}).await;
    let (n2, mut rx2) = launch(&cluster, "n2", 7207, FakeClock::new(), |_| {}).await;
    n1.join(&[addr(7207)], false).await.unwrap();

    for i in 0..5u8 {
        n1.user_event("seq", vec![i], false).await.unwrap();
    }

    let mut ltimes = Vec::new();
    for _ in 0..5 {
        ltimes.push(next_user_event(&mut rx2).await.ltime);
    }
    let mut sorted = ltimes.clone();
    sorted.sort();
    assert_eq!(ltimes, sorted, "events out of Lamport order: {ltimes:?}");

    n1.shutdown().await.unwrap();
    n2.shutdown().await.unwrap();
}
