// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! muster-storage: append-only recovery log for restart and auto-rejoin.

mod replay;
mod snapshot;

pub use replay::Replayed;
pub use snapshot::{
    ClockView, SnapshotBackpressure, SnapshotConfig, SnapshotError, SnapshotSender, Snapshotter,
};
