// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Snapshot recovery and auto-rejoin specs.

use crate::specs::prelude::*;

/// After an ungraceful death, a node restarted from its recovery log
/// rejoins its last known peers on its own.
#[tokio::test]
#[serial_test::serial]
async fn restart_from_snapshot_rejoins_the_cluster() {
    let dir = tempfile::tempdir().unwrap();
    let snapshot = dir.path().join("n2.snapshot");
    let wall = FakeClock::new();
    let cluster = MemoryCluster::new();

    let (n1, _rx1) = launch(&cluster, "n1", 7501, wall.clone(), |_| {}).await;
    let (n2, _rx2) = launch(&cluster, "n2", 7502, wall.clone(), |c| {
        c.snapshot_path = Some(snapshot.clone());
        c.rejoin_after_leave = true;
    })
    .await;

    n1.join(&[addr(7502)], false).await.unwrap();
    n1.user_event("mark", b"1".to_vec(), false).await.unwrap();
    // Let the snapshot consumer flush the membership records.
    tokio::time::sleep(Duration::from_millis(100)).await;

    // Ungraceful: no leave, the peer just dies.
    n2.shutdown().await.unwrap();
    assert_eq!(n1.get_member("n2").unwrap().status, MemberStatus::Failed);

    // Restart on the same port from the same log.
    let (n2, _rx2) = launch(&cluster, "n2", 7502, wall.clone(), |c| {
        c.snapshot_path = Some(snapshot.clone());
        c.rejoin_after_leave = true;
    })
    .await;

    let reunited = eventually(Duration::from_secs(15), || {
        n1.num_members() == 2
            && n2.num_members() == 2
            && n1.get_member("n2").is_some_and(|m| m.status == MemberStatus::Alive)
            && n2.get_member("n1").is_some_and(|m| m.status == MemberStatus::Alive)
    })
    .await;
    assert!(reunited, "nodes did not find each other after restart");

    n1.shutdown().await.unwrap();
    n2.shutdown().await.unwrap();
}

/// A graceful leave is terminal: the restarted node stays out unless
/// `rejoin_after_leave` says otherwise.
#[tokio::test]
#[serial_test::serial]
async fn graceful_leave_suppresses_auto_rejoin() {
    let dir = tempfile::tempdir().unwrap();
    let snapshot = dir.path().join("n2.snapshot");
    let wall = FakeClock::new();
    let cluster = MemoryCluster::new();

    let (n1, _rx1) = launch(&cluster, "n1", 7503, wall.clone(), |_| {}).await;
    let (n2, _rx2) = launch(&cluster, "n2", 7504, wall.clone(), |c| {
        c.snapshot_path = Some(snapshot.clone());
        c.rejoin_after_leave = false;
    })
    .await;

    n1.join(&[addr(7504)], false).await.unwrap();
    n2.leave().await.unwrap();
    n2.shutdown().await.unwrap();
    assert_eq!(n1.get_member("n2").unwrap().status, MemberStatus::Left);

    let (n2, _rx2) = launch(&cluster, "n2", 7504, wall.clone(), |c| {
        c.snapshot_path = Some(snapshot.clone());
        c.rejoin_after_leave = false;
    })
    .await;

    // No rejoin attempt: the restarted node only knows itself.
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(n2.num_members(), 1);
    assert_eq!(n1.get_member("n2").unwrap().status, MemberStatus::Left);

    n1.shutdown().await.unwrap();
    n2.shutdown().await.unwrap();
}

/// Sustained event flooding against a full snapshot channel stays
/// bounded: with the drop policy the writer never blocks and the node
/// keeps serving.
#[tokio::test]
async fn snapshot_flooding_stays_bounded() {
    let dir = tempfile::tempdir().unwrap();
    let snapshot = dir.path().join("flood.snapshot");
    let cluster = MemoryCluster::new();

    let (n1, mut rx) = launch(&cluster, "n1", 7507, FakeClock::new(), |c| {
        c.snapshot_path = Some(snapshot.clone());
        c.snapshot_in_buffer = 8;
        c.snapshot_backpressure = muster_storage::SnapshotBackpressure::Drop;
    })
    .await;

    let flood = async {
        for i in 0..500u16 {
            n1.user_event("flood", i.to_be_bytes().to_vec(), false).await.unwrap();
        }
    };
    let drain = async {
        let mut seen = 0;
        while seen < 500 {
            if let Some(Event::User(_)) = rx.recv().await {
                seen += 1;
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(10), async { tokio::join!(flood, drain) })
        .await
        .expect("flood stalled on the snapshot channel");

    assert!(n1.is_ready());
    n1.shutdown().await.unwrap();
}

/// Lamport clocks never regress across a restart.
#[tokio::test]
async fn clocks_are_restored_on_restart() {
    let dir = tempfile::tempdir().unwrap();
    let snapshot = dir.path().join("n1.snapshot");
    let wall = FakeClock::new();
    let cluster = MemoryCluster::new();

    let (n1, mut rx1) = launch(&cluster, "n1", 7505, wall.clone(), |c| {
        c.snapshot_path = Some(snapshot.clone());
    })
    .await;

    let mut last_ltime = Default::default();
    for i in 0..10u8 {
        n1.user_event("tick", vec![i], false).await.unwrap();
    }
    while let Ok(Some(event)) =
        tokio::time::timeout(Duration::from_millis(200), rx1.recv()).await
    {
        if let Event::User(e) = event {
            last_ltime = e.ltime;
        }
    }
    n1.shutdown().await.unwrap();

    let (n1, mut rx1) = launch(&cluster, "n1", 7505, wall.clone(), |c| {
        c.snapshot_path = Some(snapshot.clone());
    })
    .await;
    n1.user_event("tick", vec![99], false).await.unwrap();
    let fresh = loop {
        let event = tokio::time::timeout(Duration::from_secs(1), rx1.recv())
            .await
            .expect("timed out")
            .expect("channel closed");
        if let Event::User(e) = event {
            break e;
        }
    };
    assert!(
        fresh.ltime > last_ltime,
        "event clock regressed: {} <= {}",
        fresh.ltime,
        last_ltime
    );
    n1.shutdown().await.unwrap();
}
