// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! User event and query pipeline: Lamport stamping, duplicate
//! suppression and response routing.

use crate::serf::SerfCore;
use muster_core::{Clock, Event, LamportTime, QueryEvent, UserEvent};
use muster_wire::{Envelope, QueryMessage, QueryResponseMessage, UserEventMessage};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Per-query response channel capacity.
const QUERY_RESPONSE_BUFFER: usize = 128;

/// Outcome of a recent-buffer admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Admission {
    Fresh,
    Duplicate,
    TooOld,
}

struct Slot<T> {
    ltime: LamportTime,
    seen: Vec<T>,
}

/// Fixed-capacity ring of recently seen messages, keyed by Lamport time.
///
/// Suppresses duplicates during gossip retransmission; messages older
/// than the buffer window are dropped outright.
pub(crate) struct RecentBuffer<T> {
    slots: Vec<Option<Slot<T>>>,
}

impl<T: PartialEq> RecentBuffer<T> {
    pub(crate) fn new(capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity.max(1));
        slots.resize_with(capacity.max(1), || None);
        Self { slots }
    }

    /// Check one message against the window. `current` is the clock
    /// value after witnessing the message.
    pub(crate) fn check(
        &mut self,
        current: LamportTime,
        ltime: LamportTime,
        item: T,
    ) -> Admission {
        let window = self.slots.len() as u64;
        if current.0 > window && ltime < current.saturating_sub(window) {
            return Admission::TooOld;
        }

        let idx = (ltime.0 % window) as usize;
        match &mut self.slots[idx] {
            Some(slot) if slot.ltime == ltime => {
                if slot.seen.contains(&item) {
                    Admission::Duplicate
                } else {
                    slot.seen.push(item);
                    Admission::Fresh
                }
            }
            slot => {
                *slot = Some(Slot { ltime, seen: vec![item] });
                Admission::Fresh
            }
        }
    }
}

/// Identity of a user event within one Lamport tick.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct UserEventSeen {
    pub name: String,
    pub payload: Vec<u8>,
}

/// One response from one node.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResponse {
    pub from: String,
    pub payload: Vec<u8>,
}

/// Caller-tunable query knobs.
#[derive(Debug, Clone, Default)]
pub struct QueryParams {
    /// Response deadline; the configured default when absent.
    pub timeout: Option<Duration>,
}

/// Stream of responses for one outstanding query. Closes at the
/// deadline.
pub struct QueryResponseStream {
    pub ltime: LamportTime,
    pub id: u32,
    pub deadline: Instant,
    rx: mpsc::Receiver<QueryResponse>,
}

impl QueryResponseStream {
    /// Next response, or `None` once the deadline closed the stream.
    pub async fn recv(&mut self) -> Option<QueryResponse> {
        self.rx.recv().await
    }
}

struct PendingQuery {
    ltime: LamportTime,
    deadline: Instant,
    tx: mpsc::Sender<QueryResponse>,
    responded: HashSet<String>,
}

/// Routes incoming query responses to their in-memory streams and
/// closes streams whose deadline passed.
#[derive(Default)]
pub(crate) struct QueryTracker {
    pending: Mutex<HashMap<u32, PendingQuery>>,
}

impl QueryTracker {
    /// Register an outstanding query and hand back its response stream.
    pub(crate) fn register(
        &self,
        id: u32,
        ltime: LamportTime,
        deadline: Instant,
    ) -> QueryResponseStream {
        let (tx, rx) = mpsc::channel(QUERY_RESPONSE_BUFFER);
        self.pending.lock().insert(
            id,
            PendingQuery { ltime, deadline, tx, responded: HashSet::new() },
        );
        QueryResponseStream { ltime, id, deadline, rx }
    }

    /// Route one response. Drops responses for unknown or expired
    /// queries, mismatched Lamport times, and duplicate responders.
    pub(crate) fn route(&self, msg: &QueryResponseMessage) -> Option<mpsc::Sender<QueryResponse>> {
        let mut pending = self.pending.lock();
        let query = pending.get_mut(&msg.id)?;
        if query.ltime != msg.ltime {
            debug!(id = msg.id, "query response with stale ltime, dropping");
            return None;
        }
        if !query.responded.insert(msg.from.clone()) {
            debug!(id = msg.id, from = %msg.from, "duplicate query response, dropping");
            return None;
        }
        Some(query.tx.clone())
    }

    /// Drop every pending query past its deadline, closing its stream.
    pub(crate) fn sweep(&self, now: Instant) {
        self.pending.lock().retain(|_, q| q.deadline > now);
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.pending.lock().len()
    }
}

impl<C: Clock> SerfCore<C> {
    /// Deliver an event to the snapshotter and the observer channel.
    pub(crate) async fn deliver(&self, event: Event) {
        if let Some(snapshot_tx) = &self.snapshot_tx {
            snapshot_tx.send(event.clone()).await;
        }
        let event_tx = self.event_tx.lock().clone();
        if let Some(tx) = event_tx {
            if tx.send(event).await.is_err() {
                debug!("event channel closed, dropping event");
            }
        }
    }

    /// Dispatch one decoded gossip message.
    pub(crate) async fn handle_envelope(&self, envelope: Envelope) {
        match envelope {
            Envelope::Leave(msg) => {
                self.clock.witness(msg.ltime);
                if let Some(event) = self.members.handle_leave_intent(&msg.node, msg.ltime) {
                    self.deliver(Event::Member(event)).await;
                }
            }
            Envelope::JoinIntent(msg) => {
                self.clock.witness(msg.ltime);
                self.members.handle_join_intent(&msg.node, msg.ltime);
            }
            Envelope::UserEvent(msg) => {
                self.handle_user_event(msg).await;
            }
            Envelope::Query(msg) => {
                self.handle_query(msg).await;
            }
            Envelope::QueryResponse(msg) => self.handle_query_response(msg).await,
        }
    }

    /// Admit a user event: witness, suppress duplicates and stale
    /// events, deliver. Returns whether the event was fresh.
    pub(crate) async fn handle_user_event(&self, msg: UserEventMessage) -> bool {
        self.event_clock.witness(msg.ltime);

        // During a join with `ignore_old`, events replayed by the remote
        // state sync are discarded.
        if self.event_join_ignore.load(Ordering::SeqCst)
            && msg.ltime.0 < self.event_min_time.load(Ordering::SeqCst)
        {
            debug!(name = %msg.name, ltime = %msg.ltime, "ignoring replayed event during join");
            return false;
        }

        let admission = {
            let mut buffer = self.event_buffer.lock();
            buffer.check(
                self.event_clock.time(),
                msg.ltime,
                UserEventSeen { name: msg.name.clone(), payload: msg.payload.clone() },
            )
        };
        match admission {
            Admission::TooOld => {
                warn!(name = %msg.name, ltime = %msg.ltime, "user event older than buffer window, dropping");
                false
            }
            Admission::Duplicate => false,
            Admission::Fresh => {
                self.deliver(Event::User(UserEvent {
                    ltime: msg.ltime,
                    name: msg.name,
                    payload: msg.payload,
                    coalesce: msg.coalesce,
                }))
                .await;
                true
            }
        }
    }

    /// Admit a query, mirroring the user event path but keyed by id.
    pub(crate) async fn handle_query(&self, msg: QueryMessage) -> bool {
        self.query_clock.witness(msg.ltime);

        let admission = {
            let mut buffer = self.query_buffer.lock();
            buffer.check(self.query_clock.time(), msg.ltime, msg.id)
        };
        match admission {
            Admission::TooOld => {
                warn!(name = %msg.name, ltime = %msg.ltime, "query older than buffer window, dropping");
                false
            }
            Admission::Duplicate => false,
            Admission::Fresh => {
                self.deliver(Event::Query(QueryEvent {
                    ltime: msg.ltime,
                    id: msg.id,
                    name: msg.name,
                    payload: msg.payload,
                    from: msg.from,
                    source: msg.source,
                }))
                .await;
                true
            }
        }
    }

    pub(crate) async fn handle_query_response(&self, msg: QueryResponseMessage) {
        let Some(tx) = self.queries.route(&msg) else {
            return;
        };
        let response = QueryResponse { from: msg.from, payload: msg.payload };
        // Best effort: a full or abandoned stream must not stall gossip.
        if tx.try_send(response).is_err() {
            debug!(id = msg.id, "query response stream full or closed, dropping");
        }
    }
}

#[cfg(test)]
#[path = "pipeline_tests.rs"]
mod tests;
