// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Append-only snapshotter feeding auto-rejoin on restart.
//!
//! A single consumer task owns the snapshot file. Events arrive on a
//! bounded channel, are written as text records through a buffered
//! writer, and are made durable by a periodic flush + fsync. When the
//! file outgrows its size limit the consumer rewrites the current
//! logical state to a temp file and atomically renames it over the log.

use crate::replay::{replay, Replayed};
use indexmap::IndexMap;
use muster_core::{Error, Event, LamportTime, MemberEvent, MemberEventKind};
use parking_lot::Mutex;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error as ThisError;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

/// Hard deadline for draining pending events at shutdown.
const DRAIN_DEADLINE: Duration = Duration::from_millis(250);

/// Errors from snapshot open/replay.
#[derive(Debug, ThisError)]
pub enum SnapshotError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<SnapshotError> for Error {
    fn from(e: SnapshotError) -> Self {
        match e {
            SnapshotError::Io(io) => Error::Io(io),
        }
    }
}

/// Read-only view of the engine's Lamport clocks.
///
/// The snapshotter periodically records clock values; this capability
/// keeps the dependency one-way (no back-pointer to the engine).
pub trait ClockView: Send + Sync + 'static {
    fn clock(&self) -> LamportTime;
    fn event_clock(&self) -> LamportTime;
    fn query_clock(&self) -> LamportTime;
}

/// What a writer does when the snapshot channel is full.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SnapshotBackpressure {
    /// Wait for the consumer to make room.
    #[default]
    Block,
    /// Drop the event and log a warning.
    Drop,
}

/// Snapshotter configuration, filled from the engine config.
#[derive(Clone)]
pub struct SnapshotConfig {
    pub path: PathBuf,
    /// Compaction threshold in bytes.
    pub size_limit: u64,
    /// Input channel capacity.
    pub in_buffer: usize,
    pub backpressure: SnapshotBackpressure,
    pub flush_interval: Duration,
    /// Cadence of clock re-recording.
    pub clock_interval: Duration,
    pub rejoin_after_leave: bool,
}

impl SnapshotConfig {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            size_limit: 128 * 1024,
            in_buffer: 1024,
            backpressure: SnapshotBackpressure::Block,
            flush_interval: Duration::from_millis(500),
            clock_interval: Duration::from_millis(500),
            rejoin_after_leave: false,
        }
    }
}

enum SnapshotInput {
    Event(Event),
    Leave,
}

/// Cloneable write handle into the snapshot channel.
#[derive(Clone)]
pub struct SnapshotSender {
    tx: mpsc::Sender<SnapshotInput>,
    backpressure: SnapshotBackpressure,
}

impl SnapshotSender {
    /// Record an event. Never errors: a closed channel means the
    /// consumer is shutting down and the event is no longer needed.
    pub async fn send(&self, event: Event) {
        match self.backpressure {
            SnapshotBackpressure::Block => {
                if self.tx.send(SnapshotInput::Event(event)).await.is_err() {
                    debug!("snapshotter closed, dropping event");
                }
            }
            SnapshotBackpressure::Drop => match self.tx.try_send(SnapshotInput::Event(event)) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    warn!("snapshot channel full, dropping event");
                }
                Err(TrySendError::Closed(_)) => {
                    debug!("snapshotter closed, dropping event");
                }
            },
        }
    }

    /// Record a graceful leave. Always blocks: the record gates
    /// auto-rejoin on the next start and must not be dropped.
    pub async fn leave(&self) {
        if self.tx.send(SnapshotInput::Leave).await.is_err() {
            debug!("snapshotter closed, leave not recorded");
        }
    }
}

/// Owner of the snapshot file and its consumer task.
pub struct Snapshotter {
    sender: SnapshotSender,
    replayed: Replayed,
    handle: JoinHandle<()>,
    last_error: Arc<Mutex<Option<String>>>,
}

impl Snapshotter {
    /// Replay the log at `config.path` (if present) and spawn the
    /// consumer task. IO failures surface here; afterwards they are
    /// logged and remembered.
    pub fn open<V: ClockView>(
        config: SnapshotConfig,
        clocks: V,
        shutdown: CancellationToken,
    ) -> Result<Self, SnapshotError> {
        if let Some(parent) = config.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let replayed = replay(&config.path, config.rejoin_after_leave)?;
        let file = OpenOptions::new().create(true).append(true).open(&config.path)?;
        let offset = file.metadata()?.len();

        let (tx, rx) = mpsc::channel(config.in_buffer);
        let last_error = Arc::new(Mutex::new(None));
        let sender = SnapshotSender { tx, backpressure: config.backpressure };

        let consumer = Consumer {
            writer: BufWriter::new(file),
            offset,
            alive: replayed.alive.clone(),
            last_clock: replayed.last_clock,
            last_event_clock: replayed.last_event_clock,
            last_query_clock: replayed.last_query_clock,
            leave_written: replayed.did_leave,
            config: config.clone(),
            clocks,
            rx,
            shutdown,
            last_error: Arc::clone(&last_error),
        };
        let handle = tokio::spawn(consumer.run());

        Ok(Self { sender, replayed, handle, last_error })
    }

    /// Write handle for the event pipeline.
    pub fn sender(&self) -> SnapshotSender {
        self.sender.clone()
    }

    /// Last-known live peers, for auto-rejoin.
    pub fn alive_nodes(&self) -> Vec<(String, SocketAddr)> {
        self.replayed
            .alive
            .iter()
            .map(|(name, addr)| (name.clone(), *addr))
            .collect()
    }

    pub fn last_clock(&self) -> LamportTime {
        self.replayed.last_clock
    }

    pub fn last_event_clock(&self) -> LamportTime {
        self.replayed.last_event_clock
    }

    pub fn last_query_clock(&self) -> LamportTime {
        self.replayed.last_query_clock
    }

    /// Whether the previous run ended with a graceful leave.
    pub fn did_leave(&self) -> bool {
        self.replayed.did_leave
    }

    /// Most recent write error, if any.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().clone()
    }

    /// Wait for the consumer task to finish after cancellation.
    pub async fn wait(self) {
        if self.handle.await.is_err() {
            warn!("snapshot consumer task aborted");
        }
    }
}

struct Consumer<V: ClockView> {
    writer: BufWriter<File>,
    /// Current log size in bytes, for the compaction trigger.
    offset: u64,
    /// Logical state mirrored for compaction.
    alive: IndexMap<String, SocketAddr>,
    last_clock: LamportTime,
    last_event_clock: LamportTime,
    last_query_clock: LamportTime,
    leave_written: bool,
    config: SnapshotConfig,
    clocks: V,
    rx: mpsc::Receiver<SnapshotInput>,
    shutdown: CancellationToken,
    last_error: Arc<Mutex<Option<String>>>,
}

impl<V: ClockView> Consumer<V> {
    async fn run(mut self) {
        let shutdown = self.shutdown.clone();
        let mut flush_ticker = tokio::time::interval(self.config.flush_interval);
        let mut clock_ticker = tokio::time::interval(self.config.clock_interval);
        flush_ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        clock_ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    self.drain();
                    self.flush(true);
                    debug!("snapshot consumer stopped");
                    return;
                }
                input = self.rx.recv() => {
                    match input {
                        Some(input) => {
                            self.handle_input(input);
                            self.maybe_compact();
                        }
                        // All senders gone: final flush and exit.
                        None => {
                            self.flush(true);
                            return;
                        }
                    }
                }
                _ = flush_ticker.tick() => self.flush(true),
                _ = clock_ticker.tick() => self.update_clocks(),
            }
        }
    }

    /// Consume whatever is already queued, bounded by a hard deadline.
    fn drain(&mut self) {
        let deadline = Instant::now() + DRAIN_DEADLINE;
        while Instant::now() < deadline {
            match self.rx.try_recv() {
                Ok(input) => self.handle_input(input),
                Err(_) => break,
            }
        }
    }

    fn handle_input(&mut self, input: SnapshotInput) {
        match input {
            SnapshotInput::Event(Event::Member(e)) => self.record_member_event(&e),
            SnapshotInput::Event(Event::User(e)) => {
                if e.ltime > self.last_event_clock {
                    self.last_event_clock = e.ltime;
                    self.append(&format!("event-clock: {}\n", e.ltime));
                }
            }
            SnapshotInput::Event(Event::Query(e)) => {
                if e.ltime > self.last_query_clock {
                    self.last_query_clock = e.ltime;
                    self.append(&format!("query-clock: {}\n", e.ltime));
                }
            }
            SnapshotInput::Leave => {
                self.leave_written = true;
                self.append("leave\n");
                // A leave must survive an unclean exit right after.
                self.flush(true);
            }
        }
    }

    fn record_member_event(&mut self, event: &MemberEvent) {
        for member in &event.members {
            match event.kind {
                MemberEventKind::Join | MemberEventKind::Update => {
                    let addr = member.socket_addr();
                    self.alive.insert(member.name.clone(), addr);
                    self.append(&format!("alive: {} {}\n", member.name, addr));
                }
                MemberEventKind::Leave | MemberEventKind::Failed => {
                    self.alive.shift_remove(&member.name);
                    self.append(&format!("not-alive: {}\n", member.name));
                }
            }
        }
        self.update_clocks();
    }

    /// Re-record clock values that moved since the last write.
    fn update_clocks(&mut self) {
        let clock = self.clocks.clock();
        if clock > self.last_clock {
            self.last_clock = clock;
            self.append(&format!("clock: {clock}\n"));
        }
        let event_clock = self.clocks.event_clock();
        if event_clock > self.last_event_clock {
            self.last_event_clock = event_clock;
            self.append(&format!("event-clock: {event_clock}\n"));
        }
        let query_clock = self.clocks.query_clock();
        if query_clock > self.last_query_clock {
            self.last_query_clock = query_clock;
            self.append(&format!("query-clock: {query_clock}\n"));
        }
    }

    fn append(&mut self, record: &str) {
        if let Err(e) = self.writer.write_all(record.as_bytes()) {
            error!(error = %e, "snapshot append failed");
            *self.last_error.lock() = Some(e.to_string());
            return;
        }
        self.offset += record.len() as u64;
    }

    fn flush(&mut self, sync: bool) {
        if let Err(e) = self.writer.flush() {
            error!(error = %e, "snapshot flush failed");
            *self.last_error.lock() = Some(e.to_string());
            return;
        }
        if sync {
            if let Err(e) = self.writer.get_ref().sync_all() {
                error!(error = %e, "snapshot fsync failed");
                *self.last_error.lock() = Some(e.to_string());
            }
        }
    }

    fn maybe_compact(&mut self) {
        if self.offset <= self.config.size_limit {
            return;
        }
        if let Err(e) = self.compact() {
            error!(error = %e, "snapshot compaction failed");
            *self.last_error.lock() = Some(e.to_string());
        }
    }

    /// Rewrite the current logical state and atomically replace the log.
    fn compact(&mut self) -> std::io::Result<()> {
        self.writer.flush()?;

        let tmp_path = self.config.path.with_extension("tmp");
        let tmp_file = File::create(&tmp_path)?;
        {
            let mut w = BufWriter::new(&tmp_file);
            for (name, addr) in &self.alive {
                writeln!(w, "alive: {name} {addr}")?;
            }
            if self.last_clock > LamportTime(0) {
                writeln!(w, "clock: {}", self.last_clock)?;
            }
            if self.last_event_clock > LamportTime(0) {
                writeln!(w, "event-clock: {}", self.last_event_clock)?;
            }
            if self.last_query_clock > LamportTime(0) {
                writeln!(w, "query-clock: {}", self.last_query_clock)?;
            }
            if self.leave_written {
                writeln!(w, "leave")?;
            }
            w.flush()?;
        }
        tmp_file.sync_all()?;
        fs::rename(&tmp_path, &self.config.path)?;

        let file = OpenOptions::new().create(true).append(true).open(&self.config.path)?;
        self.offset = file.metadata()?.len();
        self.writer = BufWriter::new(file);
        debug!(bytes = self.offset, "snapshot compacted");
        Ok(())
    }
}

#[cfg(test)]
#[path = "snapshot_tests.rs"]
mod tests;
