// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cluster member model: identity, status and per-member bookkeeping.

use crate::lamport::LamportTime;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::time::Instant;

/// Status of a member as tracked by the member manager.
///
/// The derived order is the precedence used when breaking ties between
/// conflicting status messages carrying the same Lamport time: a "more
/// advanced" status wins.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum MemberStatus {
    #[default]
    None,
    Alive,
    Leaving,
    Left,
    Failed,
}

impl std::fmt::Display for MemberStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            MemberStatus::None => "none",
            MemberStatus::Alive => "alive",
            MemberStatus::Leaving => "leaving",
            MemberStatus::Left => "left",
            MemberStatus::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

/// Protocol version bytes advertised by the gossip transport.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolVersions {
    pub min: u8,
    pub max: u8,
    pub cur: u8,
}

/// A single member of the cluster.
///
/// Identity is the node name, unique across the cluster. Tags are an
/// opaque string map derived from the transport's node metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub name: String,
    pub addr: IpAddr,
    pub port: u16,
    #[serde(default)]
    pub tags: HashMap<String, String>,
    pub status: MemberStatus,
    #[serde(default)]
    pub protocol: ProtocolVersions,
}

impl Member {
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.addr, self.port)
    }
}

/// A member plus the bookkeeping the manager needs for conflict
/// resolution and tombstone expiry.
#[derive(Debug, Clone)]
pub struct MemberInfo {
    pub member: Member,
    /// Lamport time of the last accepted status change.
    pub status_ltime: LamportTime,
    /// Wall-clock instant a Leaving/Failed transition was observed.
    pub leave_time: Option<Instant>,
}

impl MemberInfo {
    pub fn new(member: Member) -> Self {
        Self { member, status_ltime: LamportTime(0), leave_time: None }
    }

    pub fn name(&self) -> &str {
        &self.member.name
    }

    pub fn status(&self) -> MemberStatus {
        self.member.status
    }
}

#[cfg(test)]
#[path = "member_tests.rs"]
mod tests;
