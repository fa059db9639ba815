// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Message bodies for the gossip envelope.

use muster_core::LamportTime;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

/// Broadcast when a node announces a graceful leave, or when an
/// administrator force-removes a failed node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaveMessage {
    pub ltime: LamportTime,
    pub node: String,
}

/// Broadcast on join so peers record the join Lamport time and discard
/// stale leave intents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinMessage {
    pub ltime: LamportTime,
    pub node: String,
}

/// A user event, stamped by the sender's event clock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserEventMessage {
    pub ltime: LamportTime,
    pub name: String,
    #[serde(default)]
    pub payload: Vec<u8>,
    #[serde(default)]
    pub coalesce: bool,
}

/// A query, stamped by the sender's query clock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryMessage {
    pub ltime: LamportTime,
    pub id: u32,
    /// Node name of the querier.
    pub from: String,
    /// Address the querier accepts responses on.
    pub source: SocketAddr,
    pub name: String,
    #[serde(default)]
    pub payload: Vec<u8>,
}

/// A response to a query, sent directly to the querier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResponseMessage {
    pub ltime: LamportTime,
    pub id: u32,
    /// Node name of the responder.
    pub from: String,
    #[serde(default)]
    pub payload: Vec<u8>,
}
