// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! ust-client: synchronous application-side access to a ust-router
//!
//! Nothing here returns an error. When the router cannot be reached the core
//! hands out null transactions and stays away for the reconnect timeout, so
//! logging never takes the application down with it.

mod backoff;
mod client;
mod connection;
mod error;
mod transaction;

pub use backoff::DEFAULT_RECONNECT_TIMEOUT;
pub use client::{ClientCore, TransactionOptions};
pub use connection::{timeout_connect, timeout_io};
pub use transaction::{ClientTransaction, EXCEPTIONS_CATEGORY};
pub use ust_core::Address;
