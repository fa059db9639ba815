// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Gossip transport contract consumed by the muster engine.
//!
//! The SWIM-style failure detector and broadcast substrate is an external
//! collaborator; this crate defines the narrow surface the engine talks
//! to, plus an in-memory full-mesh implementation used by tests.

pub mod keyring;
pub mod memory;
mod node;

pub use keyring::Keyring;
pub use memory::{MemoryCluster, MemoryTransport, TransportCall};
pub use node::Node;

use async_trait::async_trait;
use muster_core::Error;
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

/// Configuration bundle forwarded to the transport collaborator.
#[derive(Clone)]
pub struct TransportConfig {
    /// Node identity; must be unique in the cluster.
    pub name: String,
    pub bind_addr: IpAddr,
    pub bind_port: u16,
    /// Opaque metadata gossiped with the node.
    pub tags: HashMap<String, String>,
    /// When present, the transport encrypts gossip traffic.
    pub keyring: Option<Arc<Keyring>>,
}

impl TransportConfig {
    pub fn new(name: impl Into<String>, bind_addr: IpAddr, bind_port: u16) -> Self {
        Self {
            name: name.into(),
            bind_addr,
            bind_port,
            tags: HashMap::new(),
            keyring: None,
        }
    }

    pub fn local_node(&self) -> Node {
        Node {
            name: self.name.clone(),
            addr: self.bind_addr,
            port: self.bind_port,
            tags: self.tags.clone(),
        }
    }
}

/// Membership callbacks invoked by the transport.
///
/// The transport is not trusted to be well-behaved: a `None` node must be
/// tolerated as a no-op by implementors.
#[async_trait]
pub trait NodeDelegate: Send + Sync {
    async fn notify_join(&self, node: Option<Node>);
    async fn notify_leave(&self, node: Option<Node>);
    async fn notify_update(&self, node: Option<Node>);
}

/// Callback for broadcast payloads received from the cluster.
#[async_trait]
pub trait MessageDelegate: Send + Sync {
    async fn notify_message(&self, payload: &[u8]);
}

/// Combined callback surface handed to [`TransportFactory::create`].
pub trait Delegate: NodeDelegate + MessageDelegate {}

impl<T: NodeDelegate + MessageDelegate> Delegate for T {}

/// The gossip transport the engine consumes.
#[async_trait]
pub trait Transport: Send + Sync {
    /// The node this transport gossips as.
    fn local_node(&self) -> Node;

    /// Contact the given addresses and sync state. Returns the number of
    /// nodes successfully contacted.
    async fn join(&self, addrs: &[SocketAddr]) -> Result<usize, Error>;

    /// Announce a graceful departure to the cluster.
    async fn leave(&self) -> Result<(), Error>;

    /// Best-effort broadcast of an opaque payload to the cluster.
    async fn broadcast(&self, payload: Vec<u8>) -> Result<(), Error>;

    /// Send an opaque payload to one node.
    async fn send_to(&self, addr: SocketAddr, payload: Vec<u8>) -> Result<(), Error>;

    /// Tear down the transport. No callbacks fire afterwards.
    async fn shutdown(&self) -> Result<(), Error>;
}

/// Creates a transport bound to a delegate. Implemented by the in-memory
/// cluster here and by real gossip substrates elsewhere.
#[async_trait]
pub trait TransportFactory: Send + Sync {
    async fn create(
        &self,
        config: TransportConfig,
        delegate: Arc<dyn Delegate>,
    ) -> Result<Arc<dyn Transport>, Error>;
}
