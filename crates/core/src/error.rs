// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error kinds surfaced by the public API.

use crate::state::SerfState;
use thiserror::Error;

/// Errors surfaced by muster operations.
///
/// Background loops catch and log everything except [`Error::Cancelled`],
/// which ends the loop; public operations surface errors to the caller.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid argument or configuration.
    #[error("invalid argument: {0}")]
    Invalid(String),

    /// A payload exceeded a configured size limit.
    #[error("{0}")]
    LimitExceeded(String),

    /// Operation requires the lifecycle state to be `Alive`.
    #[error("not ready: instance state is {0}")]
    NotReady(SerfState),

    /// The gossip transport reported an error.
    #[error("transport error: {0}")]
    Transport(String),

    /// Snapshot file open/read/write failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The shutdown token fired during a blocking wait.
    #[error("operation cancelled by shutdown")]
    Cancelled,
}
