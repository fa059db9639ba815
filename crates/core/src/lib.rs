// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! muster-core: member model, logical clocks and event types for the
//! muster cluster membership engine.

pub mod clock;
pub mod error;
pub mod event;
pub mod lamport;
pub mod member;
pub mod state;

pub use clock::{Clock, FakeClock, SystemClock};
pub use error::Error;
pub use event::{Event, MemberEvent, MemberEventKind, QueryEvent, UserEvent};
pub use lamport::{LamportClock, LamportTime};
pub use member::{Member, MemberInfo, MemberStatus, ProtocolVersions};
pub use state::SerfState;
