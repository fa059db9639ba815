// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Background maintenance loops: tombstone reaper, failed-member
//! reconnector and query-deadline sweeper.
//!
//! Every loop observes the shared shutdown token; errors other than
//! cancellation are logged and the loop continues.

use crate::serf::SerfCore;
use muster_core::Clock;
use rand::Rng;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Cap on one reconnect probe; a hung join must not delay shutdown.
const RECONNECT_PROBE_TIMEOUT: Duration = Duration::from_secs(1);
/// Granularity of query deadline enforcement.
const QUERY_SWEEP_INTERVAL: Duration = Duration::from_millis(100);

/// Silently collect tombstones past their timeout.
pub(crate) fn spawn_reaper<C: Clock>(
    core: Arc<SerfCore<C>>,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(core.config.reap_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => return,
                _ = ticker.tick() => reap_once(&core),
            }
        }
    })
}

fn reap_once<C: Clock>(core: &SerfCore<C>) {
    let now = core.wall.now();
    let reconnect_timeout = core.config.reconnect_timeout;
    let tombstone_timeout = core.config.tombstone_timeout;

    // Consistent snapshot under the manager lock; erasure happens per
    // name afterwards.
    let expired: Vec<String> = core.members.with_state(|state| {
        let expired_in = |names: &[String], timeout: Duration| {
            names
                .iter()
                .filter(|name| {
                    state
                        .members
                        .get(*name)
                        .and_then(|info| info.leave_time)
                        .is_some_and(|left| now.saturating_duration_since(left) >= timeout)
                })
                .cloned()
                .collect::<Vec<_>>()
        };
        let mut expired = expired_in(&state.failed, reconnect_timeout);
        expired.extend(expired_in(&state.left, tombstone_timeout));
        expired
    });

    for name in expired {
        debug!(member = %name, "reaping expired tombstone");
        core.members.erase_node(&name);
    }
}

/// Probe one random failed member per tick, best effort.
pub(crate) fn spawn_reconnector<C: Clock>(
    core: Arc<SerfCore<C>>,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(core.config.reconnect_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => return,
                _ = ticker.tick() => {
                    let Some(addr) = pick_failed(&core) else { continue };
                    let Some(transport) = core.transport() else { continue };
                    debug!(%addr, "attempting reconnect to failed member");
                    let addrs = [addr];
                    tokio::select! {
                        _ = shutdown.cancelled() => return,
                        result = tokio::time::timeout(
                            RECONNECT_PROBE_TIMEOUT,
                            transport.join(&addrs),
                        ) => match result {
                            Ok(Ok(contacted)) => {
                                debug!(contacted, "reconnect probe succeeded");
                            }
                            Ok(Err(e)) => debug!(error = %e, "reconnect probe failed"),
                            Err(_) => warn!(%addr, "reconnect probe timed out"),
                        },
                    }
                }
            }
        }
    })
}

/// Pick one failed member uniformly at random.
fn pick_failed<C: Clock>(core: &SerfCore<C>) -> Option<SocketAddr> {
    core.members.with_state(|state| {
        if state.failed.is_empty() {
            return None;
        }
        let idx = rand::thread_rng().gen_range(0..state.failed.len());
        state
            .failed
            .get(idx)
            .and_then(|name| state.members.get(name))
            .map(|info| info.member.socket_addr())
    })
}

/// Close response streams for queries past their deadline.
pub(crate) fn spawn_query_sweeper<C: Clock>(
    core: Arc<SerfCore<C>>,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(QUERY_SWEEP_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => return,
                _ = ticker.tick() => core.queries.sweep(std::time::Instant::now()),
            }
        }
    })
}

#[cfg(test)]
#[path = "tasks_tests.rs"]
mod tests;
