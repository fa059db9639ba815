// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Gossip message envelope for muster.
//!
//! Wire format: 1-byte message type + JSON payload. Broadcasts are
//! datagrams handed to the transport as opaque bytes, so the type byte
//! replaces the length prefix used on stream protocols.

mod messages;

pub use messages::{
    JoinMessage, LeaveMessage, QueryMessage, QueryResponseMessage, UserEventMessage,
};

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

/// Fixed serialization allowance for a user event beyond name + payload.
pub const USER_EVENT_OVERHEAD: usize = 20;
/// Fixed serialization allowance for a query beyond name + payload.
pub const QUERY_OVERHEAD: usize = 32;
/// Fixed serialization allowance for a query response beyond the payload.
pub const QUERY_RESPONSE_OVERHEAD: usize = 24;

/// Errors from envelope encode/decode.
#[derive(Debug, Error)]
pub enum WireError {
    #[error("empty message")]
    Empty,
    #[error("unknown message type: {0}")]
    UnknownType(u8),
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Message type tags. The first payload byte on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
enum MessageType {
    Leave = 0,
    JoinIntent = 1,
    UserEvent = 2,
    Query = 3,
    QueryResponse = 4,
}

/// A decoded gossip message.
#[derive(Debug, Clone, PartialEq)]
pub enum Envelope {
    /// Graceful-leave intent for a named node.
    Leave(LeaveMessage),
    /// Join intent recording the join Lamport time.
    JoinIntent(JoinMessage),
    UserEvent(UserEventMessage),
    Query(QueryMessage),
    QueryResponse(QueryResponseMessage),
}

fn encode_body<T: Serialize>(tag: MessageType, body: &T) -> Result<Vec<u8>, WireError> {
    let json = serde_json::to_vec(body)?;
    let mut buf = Vec::with_capacity(1 + json.len());
    buf.push(tag as u8);
    buf.extend_from_slice(&json);
    Ok(buf)
}

fn decode_body<T: DeserializeOwned>(buf: &[u8]) -> Result<T, WireError> {
    Ok(serde_json::from_slice(buf)?)
}

/// Encode an envelope into broadcast bytes.
pub fn encode(envelope: &Envelope) -> Result<Vec<u8>, WireError> {
    match envelope {
        Envelope::Leave(m) => encode_body(MessageType::Leave, m),
        Envelope::JoinIntent(m) => encode_body(MessageType::JoinIntent, m),
        Envelope::UserEvent(m) => encode_body(MessageType::UserEvent, m),
        Envelope::Query(m) => encode_body(MessageType::Query, m),
        Envelope::QueryResponse(m) => encode_body(MessageType::QueryResponse, m),
    }
}

/// Decode broadcast bytes into an envelope.
pub fn decode(buf: &[u8]) -> Result<Envelope, WireError> {
    let (tag, body) = buf.split_first().ok_or(WireError::Empty)?;
    match *tag {
        t if t == MessageType::Leave as u8 => Ok(Envelope::Leave(decode_body(body)?)),
        t if t == MessageType::JoinIntent as u8 => Ok(Envelope::JoinIntent(decode_body(body)?)),
        t if t == MessageType::UserEvent as u8 => Ok(Envelope::UserEvent(decode_body(body)?)),
        t if t == MessageType::Query as u8 => Ok(Envelope::Query(decode_body(body)?)),
        t if t == MessageType::QueryResponse as u8 => {
            Ok(Envelope::QueryResponse(decode_body(body)?))
        }
        t => Err(WireError::UnknownType(t)),
    }
}

#[cfg(test)]
#[path = "wire_tests.rs"]
mod tests;
