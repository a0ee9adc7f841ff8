// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! ust-core: types shared by the transaction router and its clients
//!
//! This crate provides:
//! - Destination and transaction identifiers, sequenced log events
//! - Filter expressions and the context they are evaluated against
//! - Wire framing and socket addresses
//! - Clock and ID generation abstractions for deterministic tests

pub mod address;
pub mod clock;
pub mod codec;
pub mod destination;
pub mod filter;
pub mod id;
pub mod message;
pub mod timestamp;
pub mod transaction;

// Re-exports
pub use address::{Address, AddressError};
pub use clock::{Clock, FakeClock, SystemClock};
pub use destination::DestinationId;
pub use filter::{ContextExtractor, Filter, FilterContext, FilterError, PrefixExtractor};
pub use id::{IdGen, SequentialIdGen, TxnIdGen};
pub use message::MessageError;
pub use timestamp::TimestampError;
pub use transaction::{EventPayload, LogEvent, TransactionId};

/// Protocol version announced by the router on connect
pub const PROTOCOL_VERSION: &str = "1";
