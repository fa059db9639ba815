// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory full-mesh transport for deterministic testing
//!
//! Models the gossip substrate as instant delivery between registered
//! nodes: joins sync membership both ways, broadcasts fan out to every
//! reachable node, and partitions/shutdowns surface as leave
//! notifications the way a failure detector would report them.

use crate::{Delegate, Node, Transport, TransportConfig, TransportFactory};
use async_trait::async_trait;
use muster_core::Error;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Recorded call to a [`MemoryTransport`].
#[derive(Debug, Clone, PartialEq)]
pub enum TransportCall {
    Join(Vec<SocketAddr>),
    Leave,
    Broadcast,
    SendTo(SocketAddr),
    Shutdown,
}

struct Entry {
    node: Node,
    delegate: Arc<dyn Delegate>,
    alive: bool,
    partitioned: bool,
}

impl Entry {
    fn reachable(&self) -> bool {
        self.alive && !self.partitioned
    }
}

#[derive(Default)]
struct ClusterState {
    nodes: HashMap<SocketAddr, Entry>,
}

impl ClusterState {
    fn peers_of(&self, local: SocketAddr) -> Vec<(Arc<dyn Delegate>, Node)> {
        self.nodes
            .iter()
            .filter(|(addr, e)| **addr != local && e.reachable())
            .map(|(_, e)| (Arc::clone(&e.delegate), e.node.clone()))
            .collect()
    }
}

/// Registry of in-memory nodes forming one simulated cluster.
#[derive(Clone, Default)]
pub struct MemoryCluster {
    inner: Arc<Mutex<ClusterState>>,
}

impl MemoryCluster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cut a node off from the mesh. Peers observe the node failing.
    pub async fn partition(&self, name: &str) {
        let (victim, peers) = {
            let mut state = self.inner.lock();
            let Some(entry) = state.nodes.values_mut().find(|e| e.node.name == name) else {
                return;
            };
            entry.partitioned = true;
            let victim = entry.node.clone();
            let local = victim.socket_addr();
            (victim, state.peers_of(local))
        };
        debug!(node = %victim.name, "partitioning node from memory mesh");
        for (delegate, _) in peers {
            delegate.notify_leave(Some(victim.clone())).await;
        }
    }

    /// Reconnect a partitioned node. Peers learn about it again only
    /// through an explicit join (e.g. a reconnect probe).
    pub fn heal(&self, name: &str) {
        let mut state = self.inner.lock();
        if let Some(entry) = state.nodes.values_mut().find(|e| e.node.name == name) {
            entry.partitioned = false;
        }
    }

    /// Register a node and return the concrete transport handle.
    ///
    /// Tests use this for call inspection and failure injection; the
    /// [`TransportFactory`] impl wraps it for the engine.
    pub fn register(
        &self,
        config: TransportConfig,
        delegate: Arc<dyn Delegate>,
    ) -> Result<Arc<MemoryTransport>, Error> {
        let node = config.local_node();
        let addr = node.socket_addr();
        {
            let mut state = self.inner.lock();
            if state.nodes.get(&addr).is_some_and(|e| e.alive) {
                return Err(Error::Transport(format!("address {addr} already bound")));
            }
            // A dead entry at the same address is a restart; replace it.
            state.nodes.insert(
                addr,
                Entry { node: node.clone(), delegate, alive: true, partitioned: false },
            );
        }
        Ok(Arc::new(MemoryTransport {
            cluster: Arc::clone(&self.inner),
            local: node,
            calls: Mutex::new(Vec::new()),
            fail_joins: AtomicBool::new(false),
        }))
    }
}

#[async_trait]
impl TransportFactory for MemoryCluster {
    async fn create(
        &self,
        config: TransportConfig,
        delegate: Arc<dyn Delegate>,
    ) -> Result<Arc<dyn Transport>, Error> {
        let transport = self.register(config, delegate)?;
        Ok(transport as Arc<dyn Transport>)
    }
}

/// One node's handle onto the in-memory mesh.
pub struct MemoryTransport {
    cluster: Arc<Mutex<ClusterState>>,
    local: Node,
    calls: Mutex<Vec<TransportCall>>,
    fail_joins: AtomicBool,
}

impl MemoryTransport {
    /// All recorded calls, in order.
    pub fn calls(&self) -> Vec<TransportCall> {
        self.calls.lock().clone()
    }

    /// Make subsequent `join` calls fail with a transport error.
    pub fn set_fail_joins(&self, fail: bool) {
        self.fail_joins.store(fail, Ordering::SeqCst);
    }

    fn record(&self, call: TransportCall) {
        self.calls.lock().push(call);
    }

    fn local_addr(&self) -> SocketAddr {
        self.local.socket_addr()
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    fn local_node(&self) -> Node {
        self.local.clone()
    }

    async fn join(&self, addrs: &[SocketAddr]) -> Result<usize, Error> {
        self.record(TransportCall::Join(addrs.to_vec()));
        if self.fail_joins.load(Ordering::SeqCst) {
            return Err(Error::Transport("join refused".to_string()));
        }

        let local = self.local_addr();
        let mut contacted = 0;
        for &addr in addrs {
            // Collect the sync plan under the lock, deliver after.
            let mesh = {
                let state = self.cluster.lock();
                let us = state.nodes.get(&local).filter(|e| e.reachable());
                let target = state.nodes.get(&addr).filter(|e| e.reachable());
                match (us, target) {
                    (Some(_), Some(_)) => Some(
                        state
                            .nodes
                            .values()
                            .filter(|e| e.reachable())
                            .map(|e| (Arc::clone(&e.delegate), e.node.clone()))
                            .collect::<Vec<_>>(),
                    ),
                    _ => None,
                }
            };
            let Some(mesh) = mesh else {
                continue;
            };

            // Gossip converges the whole mesh: every reachable node
            // learns every other reachable node.
            for (delegate, receiver) in &mesh {
                for (_, subject) in &mesh {
                    if receiver.name != subject.name {
                        delegate.notify_join(Some(subject.clone())).await;
                    }
                }
            }
            contacted += 1;
        }

        if contacted == 0 && !addrs.is_empty() {
            return Err(Error::Transport("unable to contact any node".to_string()));
        }
        Ok(contacted)
    }

    async fn leave(&self) -> Result<(), Error> {
        self.record(TransportCall::Leave);
        let peers = {
            let state = self.cluster.lock();
            state.peers_of(self.local_addr())
        };
        for (delegate, _) in peers {
            delegate.notify_leave(Some(self.local.clone())).await;
        }
        Ok(())
    }

    async fn broadcast(&self, payload: Vec<u8>) -> Result<(), Error> {
        self.record(TransportCall::Broadcast);
        let local = self.local_addr();
        let peers = {
            let state = self.cluster.lock();
            if !state.nodes.get(&local).is_some_and(Entry::reachable) {
                return Ok(());
            }
            state.peers_of(local)
        };
        for (delegate, _) in peers {
            delegate.notify_message(&payload).await;
        }
        Ok(())
    }

    async fn send_to(&self, addr: SocketAddr, payload: Vec<u8>) -> Result<(), Error> {
        self.record(TransportCall::SendTo(addr));
        let local = self.local_addr();
        let delegate = {
            let state = self.cluster.lock();
            if addr != local && !state.nodes.get(&local).is_some_and(Entry::reachable) {
                return Err(Error::Transport("node is partitioned".to_string()));
            }
            state
                .nodes
                .get(&addr)
                .filter(|e| e.reachable())
                .map(|e| Arc::clone(&e.delegate))
        };
        let Some(delegate) = delegate else {
            return Err(Error::Transport(format!("no reachable node at {addr}")));
        };
        delegate.notify_message(&payload).await;
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), Error> {
        self.record(TransportCall::Shutdown);
        let peers = {
            let mut state = self.cluster.lock();
            let local = self.local_addr();
            let Some(entry) = state.nodes.get_mut(&local) else {
                return Ok(());
            };
            if !entry.alive {
                return Ok(());
            }
            entry.alive = false;
            state.peers_of(local)
        };
        // Peers observe the silent death the way the failure detector
        // would eventually report it.
        for (delegate, _) in peers {
            delegate.notify_leave(Some(self.local.clone())).await;
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;
