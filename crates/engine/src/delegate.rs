// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Adapter from transport callbacks to member-state transitions.

use crate::serf::CoreHandle;
use async_trait::async_trait;
use muster_core::{Clock, Error, Event};
use muster_transport::{MessageDelegate, Node, NodeDelegate};
use muster_wire as wire;
use tracing::warn;

/// Translates `notify_join` / `notify_leave` / `notify_update` into
/// member manager operations and forwards decoded gossip messages into
/// the pipeline. Holds its host weakly; once the facade is gone every
/// callback is a no-op.
pub struct EventDelegate<C: Clock> {
    host: CoreHandle<C>,
}

impl<C: Clock> EventDelegate<C> {
    /// Fails if the host has already been dropped.
    pub(crate) fn new(host: CoreHandle<C>) -> Result<Self, Error> {
        if host.upgrade().is_none() {
            return Err(Error::Invalid("event delegate requires a live host".to_string()));
        }
        Ok(Self { host })
    }
}

#[async_trait]
impl<C: Clock> NodeDelegate for EventDelegate<C> {
    async fn notify_join(&self, node: Option<Node>) {
        let Some(core) = self.host.upgrade() else {
            return;
        };
        if let Some(event) = core.members.handle_node_join(node) {
            core.deliver(Event::Member(event)).await;
        }
    }

    async fn notify_leave(&self, node: Option<Node>) {
        let Some(core) = self.host.upgrade() else {
            return;
        };
        if let Some(event) = core.members.handle_node_leave(node) {
            core.deliver(Event::Member(event)).await;
        }
    }

    async fn notify_update(&self, node: Option<Node>) {
        let Some(core) = self.host.upgrade() else {
            return;
        };
        if let Some(event) = core.members.handle_node_update(node) {
            core.deliver(Event::Member(event)).await;
        }
    }
}

#[async_trait]
impl<C: Clock> MessageDelegate for EventDelegate<C> {
    async fn notify_message(&self, payload: &[u8]) {
        let Some(core) = self.host.upgrade() else {
            return;
        };
        match wire::decode(payload) {
            Ok(envelope) => core.handle_envelope(envelope).await,
            // The transport is not trusted to be well-behaved.
            Err(e) => warn!(error = %e, "dropping undecodable gossip message"),
        }
    }
}

#[cfg(test)]
#[path = "delegate_tests.rs"]
mod tests;
