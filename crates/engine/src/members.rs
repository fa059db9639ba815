// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Canonical registry of cluster members.
//!
//! All mutation and read paths run under one exclusive lock held for the
//! duration of a single logical operation. Operations return the event
//! to emit instead of invoking callbacks, so nothing user-visible runs
//! while the lock is held. Reads go through the scoped accessor
//! [`MemberManager::with_state`] and return copies.

use indexmap::IndexMap;
use muster_core::{
    Clock, LamportTime, Member, MemberEvent, MemberEventKind, MemberInfo, MemberStatus,
};
use muster_transport::Node;
use parking_lot::Mutex;

/// Registry plus tombstone indexes.
///
/// Invariants: a name is in `failed` iff its registry status is
/// `Failed` (same for `left`/`Left`), and never in both lists at once.
/// The lists are insertion-ordered by the time the transition was
/// observed.
pub struct MemberState {
    pub members: IndexMap<String, MemberInfo>,
    pub failed: Vec<String>,
    pub left: Vec<String>,
}

/// Serialised owner of the member registry.
pub struct MemberManager<C: Clock> {
    state: Mutex<MemberState>,
    wall: C,
}

fn member_from_node(node: &Node, status: MemberStatus) -> Member {
    Member {
        name: node.name.clone(),
        addr: node.addr,
        port: node.port,
        tags: node.tags.clone(),
        status,
        protocol: Default::default(),
    }
}

/// Tie-break for conflicting status messages: a later Lamport time wins,
/// and on a tie the more advanced status does.
fn supersedes(
    incoming: LamportTime,
    target: MemberStatus,
    current: LamportTime,
    current_status: MemberStatus,
) -> bool {
    incoming > current || (incoming == current && target > current_status)
}

impl<C: Clock> MemberManager<C> {
    pub fn new(wall: C) -> Self {
        Self {
            state: Mutex::new(MemberState {
                members: IndexMap::new(),
                failed: Vec::new(),
                left: Vec::new(),
            }),
            wall,
        }
    }

    /// Run a closure against the locked state. The lock is held only for
    /// the closure's duration.
    pub fn with_state<R>(&self, f: impl FnOnce(&MemberState) -> R) -> R {
        let state = self.state.lock();
        f(&state)
    }

    /// Insert-or-promote on a transport join notification.
    ///
    /// A first join and a rejoin both emit `MemberJoin`; an address or
    /// tag change on an already-alive member emits `MemberUpdate`. The
    /// status Lamport time is left to join intents, which carry one.
    pub fn handle_node_join(&self, node: Option<Node>) -> Option<MemberEvent> {
        let node = node?;
        let mut guard = self.state.lock();
        let state = &mut *guard;

        match state.members.get_mut(&node.name) {
            Some(info) => {
                let old_status = info.member.status;
                let changed = info.member.addr != node.addr
                    || info.member.port != node.port
                    || info.member.tags != node.tags;
                info.member.addr = node.addr;
                info.member.port = node.port;
                info.member.tags = node.tags.clone();

                if old_status != MemberStatus::Alive {
                    info.member.status = MemberStatus::Alive;
                    info.leave_time = None;
                    let member = info.member.clone();
                    state.failed.retain(|n| n != &node.name);
                    state.left.retain(|n| n != &node.name);
                    Some(MemberEvent { kind: MemberEventKind::Join, members: vec![member] })
                } else if changed {
                    let member = info.member.clone();
                    Some(MemberEvent { kind: MemberEventKind::Update, members: vec![member] })
                } else {
                    None
                }
            }
            None => {
                let info = MemberInfo::new(member_from_node(&node, MemberStatus::Alive));
                let member = info.member.clone();
                state.members.insert(node.name.clone(), info);
                Some(MemberEvent { kind: MemberEventKind::Join, members: vec![member] })
            }
        }
    }

    /// Transition on a transport leave notification.
    ///
    /// An alive member failed; a leaving member left gracefully. Both
    /// transitions timestamp the tombstone. Unknown names and members
    /// already failed or left are no-ops.
    pub fn handle_node_leave(&self, node: Option<Node>) -> Option<MemberEvent> {
        let node = node?;
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let info = state.members.get_mut(&node.name)?;

        let (new_status, kind) = match info.member.status {
            MemberStatus::Alive => (MemberStatus::Failed, MemberEventKind::Failed),
            MemberStatus::Leaving => (MemberStatus::Left, MemberEventKind::Leave),
            _ => return None,
        };
        info.member.status = new_status;
        info.leave_time = Some(self.wall.now());
        let member = info.member.clone();
        match new_status {
            MemberStatus::Failed => state.failed.push(node.name.clone()),
            _ => state.left.push(node.name.clone()),
        }
        Some(MemberEvent { kind, members: vec![member] })
    }

    /// Refresh address/port/tags on a transport update notification. An
    /// unknown node is treated as a join.
    pub fn handle_node_update(&self, node: Option<Node>) -> Option<MemberEvent> {
        let node = node?;
        {
            let mut state = self.state.lock();
            if let Some(info) = state.members.get_mut(&node.name) {
                info.member.addr = node.addr;
                info.member.port = node.port;
                info.member.tags = node.tags.clone();
                let member = info.member.clone();
                return Some(MemberEvent { kind: MemberEventKind::Update, members: vec![member] });
            }
        }
        self.handle_node_join(Some(node))
    }

    /// Apply a remote leave intent carrying a Lamport time.
    ///
    /// An alive member is marked `Leaving` ahead of the transport's own
    /// leave notification; a failed member is promoted to `Left` (the
    /// force-remove path). Stale intents are discarded silently.
    pub fn handle_leave_intent(&self, name: &str, ltime: LamportTime) -> Option<MemberEvent> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let info = state.members.get_mut(name)?;

        let target = match info.member.status {
            MemberStatus::Alive | MemberStatus::Leaving => MemberStatus::Leaving,
            MemberStatus::Failed => MemberStatus::Left,
            _ => return None,
        };
        if !supersedes(ltime, target, info.status_ltime, info.member.status) {
            return None;
        }

        info.status_ltime = ltime;
        match info.member.status {
            MemberStatus::Alive => {
                info.member.status = MemberStatus::Leaving;
                None
            }
            MemberStatus::Failed => {
                info.member.status = MemberStatus::Left;
                info.leave_time = Some(self.wall.now());
                let member = info.member.clone();
                state.failed.retain(|n| n != name);
                state.left.push(name.to_string());
                Some(MemberEvent { kind: MemberEventKind::Leave, members: vec![member] })
            }
            _ => None,
        }
    }

    /// Record a remote join intent's Lamport time so stale leave intents
    /// are discarded. Unknown members are ignored.
    pub fn handle_join_intent(&self, name: &str, ltime: LamportTime) {
        let mut state = self.state.lock();
        if let Some(info) = state.members.get_mut(name) {
            if ltime > info.status_ltime {
                info.status_ltime = ltime;
            }
        }
    }

    /// Remove a member from the registry and both tombstone lists. Used
    /// by the reaper and the administrative force-leave path.
    pub fn erase_node(&self, name: &str) {
        let mut state = self.state.lock();
        state.members.shift_remove(name);
        state.failed.retain(|n| n != name);
        state.left.retain(|n| n != name);
    }

    pub fn get_member(&self, name: &str) -> Option<Member> {
        self.state.lock().members.get(name).map(|i| i.member.clone())
    }

    /// Snapshot copy of the registry values.
    pub fn members(&self) -> Vec<Member> {
        self.state.lock().members.values().map(|i| i.member.clone()).collect()
    }

    pub fn num_members(&self) -> usize {
        self.state.lock().members.len()
    }

    pub fn failed_members(&self) -> Vec<MemberInfo> {
        let state = self.state.lock();
        state
            .failed
            .iter()
            .filter_map(|n| state.members.get(n).cloned())
            .collect()
    }

    pub fn left_members(&self) -> Vec<MemberInfo> {
        let state = self.state.lock();
        state
            .left
            .iter()
            .filter_map(|n| state.members.get(n).cloned())
            .collect()
    }
}

#[cfg(test)]
#[path = "members_tests.rs"]
mod tests;
