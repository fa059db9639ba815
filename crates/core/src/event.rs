// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Events delivered to the observer channel and the snapshotter.

use crate::lamport::LamportTime;
use crate::member::Member;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

/// Kind of membership change carried by a [`MemberEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MemberEventKind {
    Join,
    Leave,
    Failed,
    Update,
}

impl std::fmt::Display for MemberEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            MemberEventKind::Join => "member-join",
            MemberEventKind::Leave => "member-leave",
            MemberEventKind::Failed => "member-failed",
            MemberEventKind::Update => "member-update",
        };
        write!(f, "{s}")
    }
}

/// One or more members changed state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberEvent {
    pub kind: MemberEventKind,
    pub members: Vec<Member>,
}

/// A user-defined event disseminated over the gossip substrate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserEvent {
    pub ltime: LamportTime,
    pub name: String,
    pub payload: Vec<u8>,
    /// Preserved end-to-end for a downstream coalescer; the core does
    /// not coalesce.
    pub coalesce: bool,
}

/// A query received from the cluster, awaiting responses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryEvent {
    pub ltime: LamportTime,
    pub id: u32,
    pub name: String,
    pub payload: Vec<u8>,
    /// Node name of the querier.
    pub from: String,
    /// Address responses are sent back to.
    pub source: SocketAddr,
}

/// Sum type carried by the event channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    #[serde(rename = "member")]
    Member(MemberEvent),
    #[serde(rename = "user")]
    User(UserEvent),
    #[serde(rename = "query")]
    Query(QueryEvent),
}

impl Event {
    /// Short tag for logging.
    pub fn kind_str(&self) -> &'static str {
        match self {
            Event::Member(e) => match e.kind {
                MemberEventKind::Join => "member-join",
                MemberEventKind::Leave => "member-leave",
                MemberEventKind::Failed => "member-failed",
                MemberEventKind::Update => "member-update",
            },
            Event::User(_) => "user",
            Event::Query(_) => "query",
        }
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
