// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Recovery-log replay.
//!
//! Any prefix of the log replays to a well-defined membership snapshot
//! and clock values. Records are newline-delimited:
//!
//! ```text
//! alive: <name> <ip>:<port>
//! not-alive: <name>
//! clock: <n>
//! event-clock: <n>
//! query-clock: <n>
//! leave
//! ```

use indexmap::IndexMap;
use muster_core::LamportTime;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::net::SocketAddr;
use std::path::Path;
use tracing::warn;

use crate::snapshot::SnapshotError;

/// Logical state recovered from a snapshot file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Replayed {
    /// Names with an `alive` record not later superseded by `not-alive`,
    /// in first-seen order.
    pub alive: IndexMap<String, SocketAddr>,
    pub last_clock: LamportTime,
    pub last_event_clock: LamportTime,
    pub last_query_clock: LamportTime,
    /// Whether the last terminal record was `leave`.
    pub did_leave: bool,
}

impl Replayed {
    /// Apply one record line. Unknown or malformed lines are skipped
    /// with a warning so newer log versions stay readable.
    pub(crate) fn apply_line(&mut self, line: &str, rejoin_after_leave: bool) {
        let line = line.trim();
        if line.is_empty() {
            return;
        }
        if let Some(rest) = line.strip_prefix("alive: ") {
            match rest.rsplit_once(' ') {
                Some((name, addr)) => match addr.parse::<SocketAddr>() {
                    Ok(addr) => {
                        self.alive.insert(name.to_string(), addr);
                    }
                    Err(_) => warn!(line, "bad address in alive record, skipping"),
                },
                None => warn!(line, "malformed alive record, skipping"),
            }
        } else if let Some(name) = line.strip_prefix("not-alive: ") {
            self.alive.shift_remove(name);
        } else if let Some(rest) = line.strip_prefix("clock: ") {
            self.last_clock = self.last_clock.max(parse_clock(rest, line));
        } else if let Some(rest) = line.strip_prefix("event-clock: ") {
            self.last_event_clock = self.last_event_clock.max(parse_clock(rest, line));
        } else if let Some(rest) = line.strip_prefix("query-clock: ") {
            self.last_query_clock = self.last_query_clock.max(parse_clock(rest, line));
        } else if line == "leave" {
            self.did_leave = true;
            if !rejoin_after_leave {
                self.alive.clear();
            }
        } else {
            warn!(line, "unknown snapshot record, skipping");
        }
    }
}

fn parse_clock(value: &str, line: &str) -> LamportTime {
    match value.parse::<u64>() {
        Ok(n) => LamportTime(n),
        Err(_) => {
            warn!(line, "bad clock record, skipping");
            LamportTime(0)
        }
    }
}

/// Read the log at `path` line by line. A missing file replays to the
/// empty state.
pub(crate) fn replay(path: &Path, rejoin_after_leave: bool) -> Result<Replayed, SnapshotError> {
    let mut state = Replayed::default();
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(state),
        Err(e) => return Err(e.into()),
    };
    let reader = BufReader::new(file);
    for line in reader.lines() {
        state.apply_line(&line?, rejoin_after_leave);
    }
    Ok(state)
}

#[cfg(test)]
#[path = "replay_tests.rs"]
mod tests;
