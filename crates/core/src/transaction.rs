// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Transaction identifiers and log events

use serde::{Deserialize, Serialize};

use crate::timestamp;

/// Opaque transaction identifier assigned by the router
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TransactionId(String);

impl TransactionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TransactionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TransactionId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// What an event carries
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventPayload {
    /// A participant joined the transaction
    Attach,
    /// A participant left the transaction
    Detach,
    Message(Vec<u8>),
}

impl EventPayload {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            EventPayload::Attach => b"ATTACH",
            EventPayload::Detach => b"DETACH",
            EventPayload::Message(data) => data,
        }
    }
}

/// One sequenced entry in a transaction's event stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEvent {
    pub sequence: u64,
    /// Caller-supplied microseconds since the epoch
    pub timestamp: u64,
    pub payload: EventPayload,
}

impl LogEvent {
    /// Append the sink line `<timestamp> <sequence> <payload>\n`
    pub fn write_line(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(timestamp::encode(self.timestamp).as_bytes());
        out.push(b' ');
        out.extend_from_slice(self.sequence.to_string().as_bytes());
        out.push(b' ');
        out.extend_from_slice(self.payload.as_bytes());
        out.push(b'\n');
    }
}
