// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tombstone reaper specs.

use crate::specs::prelude::*;

/// A failed member older than the reconnect timeout disappears from the
/// registry and the failed list.
#[tokio::test]
#[serial_test::serial]
async fn reaper_removes_expired_failed_member() {
    let wall = FakeClock::new();
    let cluster = MemoryCluster::new();
    let (n1, _rx1) = launch(&cluster, "n1", 7101, wall.clone(), |c| {
        c.reap_interval = Duration::from_millis(100);
        c.reconnect_timeout = Duration::from_millis(200);
        c.reconnect_interval = Duration::from_secs(3600);
    })
    .await;
    let (n2, _rx2) = launch(&cluster, "n2", 7102, wall.clone(), |_| {}).await;

    n1.join(&[addr(7102)], false).await.unwrap();
    cluster.partition("n2").await;
    assert_eq!(n1.get_member("n2").unwrap().status, MemberStatus::Failed);

    // Make the tombstone 300ms old; the 200ms timeout has passed.
    wall.advance(Duration::from_millis(300));
    let reaped = eventually(Duration::from_secs(2), || n1.get_member("n2").is_none()).await;
    assert!(reaped, "expired failed member was not reaped");
    assert_eq!(n1.num_members(), 1);

    n1.shutdown().await.unwrap();
    n2.shutdown().await.unwrap();
}

/// A failed member younger than the reconnect timeout survives reaping
/// untouched.
#[tokio::test]
#[serial_test::serial]
async fn reaper_preserves_recent_failed_member() {
    let wall = FakeClock::new();
    let cluster = MemoryCluster::new();
    let (n1, _rx1) = launch(&cluster, "n1", 7103, wall.clone(), |c| {
        c.reap_interval = Duration::from_millis(100);
        c.reconnect_timeout = Duration::from_secs(10);
        c.reconnect_interval = Duration::from_secs(3600);
    })
    .await;
    let (n2, _rx2) = launch(&cluster, "n2", 7104, wall.clone(), |_| {}).await;

    n1.join(&[addr(7104)], false).await.unwrap();
    cluster.partition("n2").await;

    wall.advance(Duration::from_millis(50));
    tokio::time::sleep(Duration::from_millis(300)).await;

    assert_eq!(n1.get_member("n2").unwrap().status, MemberStatus::Failed);
    assert_eq!(n1.num_members(), 2);

    n1.shutdown().await.unwrap();
    n2.shutdown().await.unwrap();
}

/// Members that left gracefully are reaped on the tombstone timeout,
/// not the reconnect timeout.
#[tokio::test]
#[serial_test::serial]
async fn reaper_expires_left_members_on_tombstone_timeout() {
    let wall = FakeClock::new();
    let cluster = MemoryCluster::new();
    let (n1, _rx1) = launch(&cluster, "n1", 7105, wall.clone(), |c| {
        c.reap_interval = Duration::from_millis(100);
        c.reconnect_timeout = Duration::from_secs(3600);
        c.tombstone_timeout = Duration::from_millis(200);
        c.reconnect_interval = Duration::from_secs(3600);
    })
    .await;
    let (n2, _rx2) = launch(&cluster, "n2", 7106, wall.clone(), |_| {}).await;

    n1.join(&[addr(7106)], false).await.unwrap();
    n2.leave().await.unwrap();
    assert_eq!(n1.get_member("n2").unwrap().status, MemberStatus::Left);

    wall.advance(Duration::from_millis(300));
    let reaped = eventually(Duration::from_secs(2), || n1.get_member("n2").is_none()).await;
    assert!(reaped, "expired left member was not reaped");

    n1.shutdown().await.unwrap();
    n2.shutdown().await.unwrap();
}
