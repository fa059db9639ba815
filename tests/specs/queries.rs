// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Query round-trip specs.

use crate::specs::prelude::*;
use muster_core::QueryEvent;

async fn next_query(rx: &mut mpsc::Receiver<Event>) -> QueryEvent {
    loop {
        let event = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("timed out waiting for query")
            .expect("event channel closed");
        if let Event::Query(q) = event {
            return q;
        }
    }
}

/// A query fans out to the cluster and responses stream back to the
/// origin until the deadline closes the stream.
#[tokio::test]
async fn query_fans_out_and_collects_responses() {
    let cluster = MemoryCluster::new();
    let (n1, _rx1) = launch(&cluster, "n1", 7401, FakeClock::new(), |_| {}).await;
    let (n2, mut rx2) = launch(&cluster, "n2", 7402, FakeClock::new(), |_| {}).await;
    let (n3, mut rx3) = launch(&cluster, "n3", 7403, FakeClock::new(), |_| {}).await;
    n1.join(&[addr(7402)], false).await.unwrap();
    n1.join(&[addr(7403)], false).await.unwrap();

    let params = QueryParams { timeout: Some(Duration::from_millis(500)) };
    let mut stream = n1.query("role", vec![], params).await.unwrap();

    let q2 = next_query(&mut rx2).await;
    assert_eq!(q2.name, "role");
    assert_eq!(q2.from, "n1");
    n2.respond(&q2, b"db".to_vec()).await.unwrap();

    let q3 = next_query(&mut rx3).await;
    n3.respond(&q3, b"web".to_vec()).await.unwrap();

    let mut responses = Vec::new();
    while let Some(response) = stream.recv().await {
        responses.push((response.from, response.payload));
        if responses.len() == 2 {
            break;
        }
    }
    responses.sort();
    assert_eq!(
        responses,
        vec![
            ("n2".to_string(), b"db".to_vec()),
            ("n3".to_string(), b"web".to_vec()),
        ]
    );

    n1.shutdown().await.unwrap();
    n2.shutdown().await.unwrap();
    n3.shutdown().await.unwrap();
}

/// With nobody answering, the stream simply closes at the deadline.
#[tokio::test]
async fn unanswered_query_times_out_empty() {
    let cluster = MemoryCluster::new();
    let (n1, _rx1) = launch(&cluster, "n1", 7404, FakeClock::new(), |_| {}).await;

    let params = QueryParams { timeout: Some(Duration::from_millis(150)) };
    let mut stream = n1.query("anyone", vec![], params).await.unwrap();

    let response = tokio::time::timeout(Duration::from_secs(2), stream.recv())
        .await
        .expect("deadline did not close the stream");
    assert!(response.is_none());
    n1.shutdown().await.unwrap();
}

/// The origin observes its own query on the event channel and may
/// respond to itself.
#[tokio::test]
async fn origin_can_answer_its_own_query() {
    let cluster = MemoryCluster::new();
    let (n1, mut rx1) = launch(&cluster, "n1", 7405, FakeClock::new(), |_| {}).await;

    let params = QueryParams { timeout: Some(Duration::from_millis(500)) };
    let mut stream = n1.query("self", vec![], params).await.unwrap();

    let q = next_query(&mut rx1).await;
    n1.respond(&q, b"me".to_vec()).await.unwrap();

    let response = tokio::time::timeout(Duration::from_secs(1), stream.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(response.from, "n1");
    assert_eq!(response.payload, b"me");
    n1.shutdown().await.unwrap();
}
