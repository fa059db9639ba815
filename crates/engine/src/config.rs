// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Engine configuration.

use muster_core::{Error, Event};
use muster_storage::SnapshotBackpressure;
use muster_transport::{Keyring, TransportConfig};
use std::collections::HashMap;
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Configuration for a muster instance.
#[derive(Clone)]
pub struct Config {
    /// This node's identity; must be unique in the cluster.
    pub node_name: String,
    /// Opaque metadata gossiped with the node.
    pub tags: HashMap<String, String>,
    /// Address the transport binds to.
    pub bind_addr: IpAddr,
    pub bind_port: u16,
    /// When present, the transport encrypts gossip traffic.
    pub keyring: Option<Arc<Keyring>>,
    /// Path where the current keyring is persisted on demand.
    pub keyring_file: Option<PathBuf>,

    /// Period of the tombstone reaper.
    pub reap_interval: Duration,
    /// Period of the reconnect task.
    pub reconnect_interval: Duration,
    /// Age past which a failed member is reaped.
    pub reconnect_timeout: Duration,
    /// Age past which a left member is reaped.
    pub tombstone_timeout: Duration,
    /// Time `leave` waits after broadcasting before completing.
    pub leave_propagate_delay: Duration,

    /// Maximum serialised user-event size in bytes.
    pub user_event_size_limit: usize,
    /// Maximum serialised query size in bytes.
    pub query_size_limit: usize,
    /// Maximum serialised query-response size in bytes.
    pub query_response_size_limit: usize,
    /// Response deadline when the caller does not pick one.
    pub default_query_timeout: Duration,
    /// Duplicate-suppression window for user events, in Lamport ticks.
    pub event_buffer_size: usize,
    /// Duplicate-suppression window for queries, in Lamport ticks.
    pub query_buffer_size: usize,

    /// File path for the recovery log; enables the snapshotter when set.
    pub snapshot_path: Option<PathBuf>,
    /// Compaction threshold for the recovery log.
    pub snapshot_size_limit: u64,
    /// Snapshot input channel capacity.
    pub snapshot_in_buffer: usize,
    /// Writer behavior when the snapshot channel is full.
    pub snapshot_backpressure: SnapshotBackpressure,
    /// Snapshot flush cadence.
    pub flush_interval: Duration,
    /// If true, a `leave` terminal record does not suppress auto-rejoin.
    pub rejoin_after_leave: bool,

    /// Observer channel for emitted events (may be absent).
    pub event_tx: Option<mpsc::Sender<Event>>,
}

impl Config {
    pub fn new(node_name: impl Into<String>, bind_addr: IpAddr, bind_port: u16) -> Self {
        Self {
            node_name: node_name.into(),
            tags: HashMap::new(),
            bind_addr,
            bind_port,
            keyring: None,
            keyring_file: None,
            reap_interval: Duration::from_secs(15),
            reconnect_interval: Duration::from_secs(30),
            reconnect_timeout: Duration::from_secs(24 * 60 * 60),
            tombstone_timeout: Duration::from_secs(24 * 60 * 60),
            leave_propagate_delay: Duration::from_secs(1),
            user_event_size_limit: 512,
            query_size_limit: 1024,
            query_response_size_limit: 1024,
            default_query_timeout: Duration::from_secs(5),
            event_buffer_size: 512,
            query_buffer_size: 512,
            snapshot_path: None,
            snapshot_size_limit: 128 * 1024,
            snapshot_in_buffer: 1024,
            snapshot_backpressure: SnapshotBackpressure::Block,
            flush_interval: Duration::from_millis(500),
            rejoin_after_leave: false,
            event_tx: None,
        }
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.node_name.is_empty() {
            return Err(Error::Invalid("node name must not be empty".to_string()));
        }
        if self.event_buffer_size == 0 || self.query_buffer_size == 0 {
            return Err(Error::Invalid("event buffers require a non-zero size".to_string()));
        }
        Ok(())
    }

    /// Bundle forwarded to the transport collaborator.
    pub fn transport_config(&self) -> TransportConfig {
        TransportConfig {
            name: self.node_name.clone(),
            bind_addr: self.bind_addr,
            bind_port: self.bind_port,
            tags: self.tags.clone(),
            keyring: self.keyring.clone(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new("", IpAddr::from([127, 0, 0, 1]), 7946)
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
