// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared helpers for the scenario specs.

pub use muster_core::{Event, FakeClock, MemberStatus, SerfState};
pub use muster_engine::{Config, QueryParams, Serf};
pub use muster_transport::MemoryCluster;
pub use std::net::SocketAddr;
pub use std::time::Duration;
pub use tokio::sync::mpsc;

pub fn addr(port: u16) -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], port))
}

/// Start a node on the in-memory mesh with an observer channel and fast
/// timers, then hand the config to the caller for final tuning.
pub async fn launch(
    cluster: &MemoryCluster,
    name: &str,
    port: u16,
    wall: FakeClock,
    tune: impl FnOnce(&mut Config),
) -> (Serf<FakeClock>, mpsc::Receiver<Event>) {
    let (event_tx, event_rx) = mpsc::channel(256);
    let mut config = Config::new(name, "127.0.0.1".parse().unwrap(), port);
    config.event_tx = Some(event_tx);
    config.leave_propagate_delay = Duration::from_millis(10);
    config.flush_interval = Duration::from_millis(20);
    tune(&mut config);
    let serf = Serf::with_clock(config, cluster, wall)
        .await
        .expect("node failed to start");
    (serf, event_rx)
}

/// Poll until the condition holds or the deadline passes.
pub async fn eventually(deadline: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let end = std::time::Instant::now() + deadline;
    while std::time::Instant::now() < end {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    condition()
}
