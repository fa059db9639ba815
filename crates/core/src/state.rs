// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Lifecycle state of a muster instance.

use serde::{Deserialize, Serialize};

/// Forward-only lifecycle: `Alive → Leaving → Left → Shutdown`.
/// `Shutdown` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SerfState {
    Alive,
    Leaving,
    Left,
    Shutdown,
}

impl std::fmt::Display for SerfState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SerfState::Alive => "alive",
            SerfState::Leaving => "leaving",
            SerfState::Left => "left",
            SerfState::Shutdown => "shutdown",
        };
        write!(f, "{s}")
    }
}
