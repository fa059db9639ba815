// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Lifecycle facade wiring the member manager, pipeline, background
//! tasks and snapshotter over a gossip transport.

use crate::config::Config;
use crate::delegate::EventDelegate;
use crate::members::MemberManager;
use crate::pipeline::{QueryParams, QueryResponseStream, QueryTracker, RecentBuffer, UserEventSeen};
use crate::tasks;
use muster_core::{
    Clock, Error, Event, LamportClock, LamportTime, Member, MemberStatus, QueryEvent, SerfState,
    SystemClock,
};
use muster_storage::{ClockView, SnapshotConfig, SnapshotSender, Snapshotter};
use muster_transport::{keyring, Transport, TransportFactory};
use muster_wire::{
    self as wire, Envelope, JoinMessage, LeaveMessage, QueryMessage, QueryResponseMessage,
    UserEventMessage,
};
use parking_lot::Mutex;
use rand::Rng;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Budget for awaiting each background task during shutdown.
const TASK_STOP_BUDGET: Duration = Duration::from_millis(250);
/// Budget for the snapshot consumer to drain and fsync.
const SNAPSHOT_STOP_BUDGET: Duration = Duration::from_millis(500);
/// Cap on the initial auto-rejoin attempt.
const REJOIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Read-only clock bundle handed to the snapshotter.
#[derive(Clone)]
pub(crate) struct Clocks {
    pub clock: Arc<LamportClock>,
    pub event_clock: Arc<LamportClock>,
    pub query_clock: Arc<LamportClock>,
}

impl ClockView for Clocks {
    fn clock(&self) -> LamportTime {
        self.clock.time()
    }

    fn event_clock(&self) -> LamportTime {
        self.event_clock.time()
    }

    fn query_clock(&self) -> LamportTime {
        self.query_clock.time()
    }
}

/// Shared state behind the [`Serf`] facade. The event delegate holds a
/// weak reference to it.
pub(crate) struct SerfCore<C: Clock> {
    pub(crate) config: Config,
    pub(crate) clock: Arc<LamportClock>,
    pub(crate) event_clock: Arc<LamportClock>,
    pub(crate) query_clock: Arc<LamportClock>,
    pub(crate) members: MemberManager<C>,
    pub(crate) event_buffer: Mutex<RecentBuffer<UserEventSeen>>,
    pub(crate) query_buffer: Mutex<RecentBuffer<u32>>,
    pub(crate) queries: QueryTracker,
    pub(crate) event_tx: Mutex<Option<tokio::sync::mpsc::Sender<Event>>>,
    pub(crate) snapshot_tx: Option<SnapshotSender>,
    pub(crate) transport: OnceLock<Arc<dyn Transport>>,
    pub(crate) state: Mutex<SerfState>,
    pub(crate) wall: C,
    /// Set while a join with `ignore_old` is in flight.
    pub(crate) event_join_ignore: AtomicBool,
    pub(crate) event_min_time: AtomicU64,
}

impl<C: Clock> SerfCore<C> {
    pub(crate) fn transport(&self) -> Option<&Arc<dyn Transport>> {
        self.transport.get()
    }
}

/// A running muster instance.
///
/// Cheap to share: wrap in an `Arc` to hand to other tasks.
pub struct Serf<C: Clock = SystemClock> {
    core: Arc<SerfCore<C>>,
    transport: Arc<dyn Transport>,
    snapshotter: Mutex<Option<Snapshotter>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    shutdown: CancellationToken,
    local_addr: SocketAddr,
}

impl Serf<SystemClock> {
    /// Create an instance on the system clock.
    pub async fn create(config: Config, factory: &dyn TransportFactory) -> Result<Self, Error> {
        Self::with_clock(config, factory, SystemClock).await
    }
}

impl<C: Clock> Serf<C> {
    /// Create an instance with an explicit wall clock (tests inject a
    /// fake one to drive tombstone expiry).
    pub async fn with_clock(
        config: Config,
        factory: &dyn TransportFactory,
        wall: C,
    ) -> Result<Self, Error> {
        config.validate()?;

        let clock = Arc::new(LamportClock::new());
        let event_clock = Arc::new(LamportClock::new());
        let query_clock = Arc::new(LamportClock::new());
        let clocks = Clocks {
            clock: Arc::clone(&clock),
            event_clock: Arc::clone(&event_clock),
            query_clock: Arc::clone(&query_clock),
        };

        let shutdown = CancellationToken::new();

        // Replay the recovery log before anything can emit, so the
        // clocks never regress past a previous run.
        let snapshotter = match &config.snapshot_path {
            Some(path) => {
                let mut snapshot_config = SnapshotConfig::new(path.clone());
                snapshot_config.size_limit = config.snapshot_size_limit;
                snapshot_config.in_buffer = config.snapshot_in_buffer;
                snapshot_config.backpressure = config.snapshot_backpressure;
                snapshot_config.flush_interval = config.flush_interval;
                snapshot_config.rejoin_after_leave = config.rejoin_after_leave;
                let snapshotter =
                    Snapshotter::open(snapshot_config, clocks.clone(), shutdown.child_token())?;
                clock.witness(snapshotter.last_clock());
                event_clock.witness(snapshotter.last_event_clock());
                query_clock.witness(snapshotter.last_query_clock());
                Some(snapshotter)
            }
            None => None,
        };

        let members = MemberManager::new(wall.clone());
        let core = Arc::new(SerfCore {
            event_buffer: Mutex::new(RecentBuffer::new(config.event_buffer_size)),
            query_buffer: Mutex::new(RecentBuffer::new(config.query_buffer_size)),
            queries: QueryTracker::default(),
            event_tx: Mutex::new(config.event_tx.clone()),
            snapshot_tx: snapshotter.as_ref().map(Snapshotter::sender),
            transport: OnceLock::new(),
            state: Mutex::new(SerfState::Alive),
            wall,
            event_join_ignore: AtomicBool::new(false),
            event_min_time: AtomicU64::new(0),
            members,
            clock,
            event_clock,
            query_clock,
            config,
        });

        let delegate = Arc::new(EventDelegate::new(Arc::downgrade(&core))?);
        let transport = factory.create(core.config.transport_config(), delegate).await?;
        let local_node = transport.local_node();
        let local_addr = local_node.socket_addr();
        if core.transport.set(Arc::clone(&transport)).is_err() {
            return Err(Error::Invalid("transport attached twice".to_string()));
        }

        // Register ourselves before anyone else can show up.
        if let Some(event) = core.members.handle_node_join(Some(local_node.clone())) {
            core.deliver(Event::Member(event)).await;
        }

        let serf = Self {
            tasks: Mutex::new(vec![
                tasks::spawn_reaper(Arc::clone(&core), shutdown.clone()),
                tasks::spawn_reconnector(Arc::clone(&core), shutdown.clone()),
                tasks::spawn_query_sweeper(Arc::clone(&core), shutdown.clone()),
            ]),
            snapshotter: Mutex::new(snapshotter),
            core,
            transport,
            shutdown,
            local_addr,
        };

        serf.broadcast_join_intent().await;
        serf.auto_rejoin().await;
        Ok(serf)
    }

    /// Announce our join Lamport time so stale leave intents for this
    /// name are discarded cluster-wide.
    async fn broadcast_join_intent(&self) {
        let ltime = self.core.clock.increment();
        let msg = JoinMessage { ltime, node: self.core.config.node_name.clone() };
        if let Err(e) = self.broadcast(Envelope::JoinIntent(msg)).await {
            debug!(error = %e, "join intent broadcast failed");
        }
    }

    /// Attempt to rejoin the peers recorded in the recovery log.
    async fn auto_rejoin(&self) {
        let addrs: Vec<SocketAddr> = {
            let snapshotter = self.snapshotter.lock();
            let Some(snapshotter) = snapshotter.as_ref() else {
                return;
            };
            snapshotter
                .alive_nodes()
                .into_iter()
                .filter(|(name, _)| name != &self.core.config.node_name)
                .map(|(_, addr)| addr)
                .collect()
        };
        if addrs.is_empty() {
            return;
        }

        info!(peers = addrs.len(), "attempting auto-rejoin to previous peers");
        match tokio::time::timeout(REJOIN_TIMEOUT, self.transport.join(&addrs)).await {
            Ok(Ok(count)) => info!(contacted = count, "auto-rejoin complete"),
            Ok(Err(e)) => warn!(error = %e, "auto-rejoin failed"),
            Err(_) => warn!("auto-rejoin timed out"),
        }
    }

    async fn broadcast(&self, envelope: Envelope) -> Result<(), Error> {
        let bytes = wire::encode(&envelope).map_err(|e| Error::Transport(e.to_string()))?;
        self.transport.broadcast(bytes).await
    }

    fn ensure_alive(&self) -> Result<(), Error> {
        let state = *self.core.state.lock();
        if state == SerfState::Alive {
            Ok(())
        } else {
            Err(Error::NotReady(state))
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SerfState {
        *self.core.state.lock()
    }

    /// True iff the lifecycle state is `Alive` and a transport is
    /// attached.
    pub fn is_ready(&self) -> bool {
        self.state() == SerfState::Alive && self.core.transport().is_some()
    }

    pub fn encryption_enabled(&self) -> bool {
        self.core.config.keyring.is_some()
    }

    /// Snapshot copy of the member registry.
    pub fn members(&self) -> Vec<Member> {
        self.core.members.members()
    }

    pub fn num_members(&self) -> usize {
        self.core.members.num_members()
    }

    pub fn get_member(&self, name: &str) -> Option<Member> {
        self.core.members.get_member(name)
    }

    /// Most recent snapshotter write error, if any.
    pub fn snapshot_error(&self) -> Option<String> {
        self.snapshotter.lock().as_ref().and_then(Snapshotter::last_error)
    }

    /// Join the cluster via the given addresses. With `ignore_old`, user
    /// events replayed by the remote state sync are suppressed.
    pub async fn join(&self, addrs: &[SocketAddr], ignore_old: bool) -> Result<usize, Error> {
        self.ensure_alive()?;

        if ignore_old {
            self.core
                .event_min_time
                .store(self.core.event_clock.time().0 + 1, Ordering::SeqCst);
            self.core.event_join_ignore.store(true, Ordering::SeqCst);
        }
        let result = self.transport.join(addrs).await;
        if ignore_old {
            self.core.event_join_ignore.store(false, Ordering::SeqCst);
        }

        let count = result?;
        self.broadcast_join_intent().await;
        Ok(count)
    }

    /// Gossip a user event to the cluster and deliver it locally.
    pub async fn user_event(
        &self,
        name: impl Into<String>,
        payload: Vec<u8>,
        coalesce: bool,
    ) -> Result<(), Error> {
        self.ensure_alive()?;
        let name = name.into();

        let size = name.len() + payload.len() + wire::USER_EVENT_OVERHEAD;
        if size > self.core.config.user_event_size_limit {
            return Err(Error::LimitExceeded(format!(
                "user event exceeds configured limit of {} bytes",
                self.core.config.user_event_size_limit
            )));
        }

        let msg = UserEventMessage {
            ltime: self.core.event_clock.increment(),
            name,
            payload,
            coalesce,
        };
        // Local admission first registers the event in the recent
        // buffer, so our own broadcast looping back is suppressed.
        self.core.handle_user_event(msg.clone()).await;
        self.broadcast(Envelope::UserEvent(msg)).await
    }

    /// Issue a query and return the stream its responses arrive on.
    pub async fn query(
        &self,
        name: impl Into<String>,
        payload: Vec<u8>,
        params: QueryParams,
    ) -> Result<QueryResponseStream, Error> {
        self.ensure_alive()?;
        let name = name.into();

        let size = name.len() + payload.len() + wire::QUERY_OVERHEAD;
        if size > self.core.config.query_size_limit {
            return Err(Error::LimitExceeded(format!(
                "query exceeds configured limit of {} bytes",
                self.core.config.query_size_limit
            )));
        }

        let ltime = self.core.query_clock.increment();
        let id: u32 = rand::thread_rng().gen();
        let timeout = params.timeout.unwrap_or(self.core.config.default_query_timeout);
        let deadline = std::time::Instant::now() + timeout;
        let stream = self.core.queries.register(id, ltime, deadline);

        let msg = QueryMessage {
            ltime,
            id,
            from: self.core.config.node_name.clone(),
            source: self.local_addr,
            name,
            payload,
        };
        self.core.handle_query(msg.clone()).await;
        self.broadcast(Envelope::Query(msg)).await?;
        Ok(stream)
    }

    /// Respond to a received query. Responses go directly to the
    /// querier, not through the broadcast path.
    pub async fn respond(&self, query: &QueryEvent, payload: Vec<u8>) -> Result<(), Error> {
        let size = payload.len() + wire::QUERY_RESPONSE_OVERHEAD;
        if size > self.core.config.query_response_size_limit {
            return Err(Error::LimitExceeded(format!(
                "query response exceeds configured limit of {} bytes",
                self.core.config.query_response_size_limit
            )));
        }

        let msg = QueryResponseMessage {
            ltime: query.ltime,
            id: query.id,
            from: self.core.config.node_name.clone(),
            payload,
        };
        let bytes =
            wire::encode(&Envelope::QueryResponse(msg)).map_err(|e| Error::Transport(e.to_string()))?;
        self.transport.send_to(query.source, bytes).await
    }

    /// Force-promote a failed member to `Left` and propagate the intent.
    pub async fn remove_failed_node(&self, name: &str) -> Result<(), Error> {
        self.ensure_alive()?;
        match self.core.members.get_member(name) {
            None => return Err(Error::Invalid(format!("no such member: {name}"))),
            Some(member) if member.status != MemberStatus::Failed => {
                return Err(Error::Invalid(format!(
                    "member {name} is not failed (status {})",
                    member.status
                )));
            }
            Some(_) => {}
        }

        let ltime = self.core.clock.increment();
        let msg = LeaveMessage { ltime, node: name.to_string() };
        self.broadcast(Envelope::Leave(msg)).await?;
        if let Some(event) = self.core.members.handle_leave_intent(name, ltime) {
            self.core.deliver(Event::Member(event)).await;
        }
        Ok(())
    }

    /// Gracefully leave the cluster. Broadcasts the intent, waits for it
    /// to propagate, then transitions to `Left`. Background tasks keep
    /// running until [`Serf::shutdown`].
    pub async fn leave(&self) -> Result<(), Error> {
        {
            let mut state = self.core.state.lock();
            match *state {
                SerfState::Shutdown => return Err(Error::NotReady(SerfState::Shutdown)),
                SerfState::Left => return Ok(()),
                SerfState::Alive | SerfState::Leaving => *state = SerfState::Leaving,
            }
        }

        if let Some(snapshot_tx) = &self.core.snapshot_tx {
            snapshot_tx.leave().await;
        }

        let ltime = self.core.clock.increment();
        let name = self.core.config.node_name.clone();
        self.core.members.handle_leave_intent(&name, ltime);
        let msg = LeaveMessage { ltime, node: name };
        if let Err(e) = self.broadcast(Envelope::Leave(msg)).await {
            warn!(error = %e, "leave intent broadcast failed");
        }
        self.transport.leave().await?;

        tokio::time::sleep(self.core.config.leave_propagate_delay).await;
        *self.core.state.lock() = SerfState::Left;
        Ok(())
    }

    /// Tear everything down: cancel the shutdown token, await each task
    /// under a bounded budget, stop the snapshotter and release the
    /// transport. Idempotent.
    pub async fn shutdown(&self) -> Result<(), Error> {
        {
            let mut state = self.core.state.lock();
            if *state == SerfState::Shutdown {
                return Ok(());
            }
            if *state == SerfState::Alive {
                warn!("shutdown without a prior leave");
            }
            *state = SerfState::Shutdown;
        }

        self.shutdown.cancel();

        let handles: Vec<JoinHandle<()>> = self.tasks.lock().drain(..).collect();
        for mut handle in handles {
            if tokio::time::timeout(TASK_STOP_BUDGET, &mut handle).await.is_err() {
                warn!("background task did not stop in time, aborting");
                handle.abort();
            }
        }

        let snapshotter = self.snapshotter.lock().take();
        if let Some(snapshotter) = snapshotter {
            if tokio::time::timeout(SNAPSHOT_STOP_BUDGET, snapshotter.wait()).await.is_err() {
                warn!("snapshot consumer did not stop in time");
            }
        }

        if let Err(e) = self.transport.shutdown().await {
            warn!(error = %e, "transport shutdown failed");
        }

        // Close the observer channel.
        self.core.event_tx.lock().take();
        Ok(())
    }

    /// Persist the current keyring to the configured keyring file.
    ///
    /// A missing `keyring_file` is a silent no-op; a missing keyring is
    /// an error.
    pub fn write_keyring_file(&self) -> Result<(), Error> {
        let Some(path) = &self.core.config.keyring_file else {
            return Ok(());
        };
        let Some(keys) = &self.core.config.keyring else {
            return Err(Error::Invalid("No keyring available to write".to_string()));
        };
        keyring::write_keyring_file(path, keys)
    }

    #[cfg(test)]
    pub(crate) fn core(&self) -> &Arc<SerfCore<C>> {
        &self.core
    }
}

/// Weak handle used by the delegate; upgrading fails once the facade is
/// dropped.
pub(crate) type CoreHandle<C> = Weak<SerfCore<C>>;

#[cfg(test)]
#[path = "serf_tests.rs"]
mod tests;
