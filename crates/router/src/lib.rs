// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! ust-router: collects transaction events from many clients and writes each
//! finished transaction to its sink exactly once
//!
//! Layers, leaves first:
//! - [`sink`]: append-only destinations (files, or memory in tests)
//! - [`table`]: resident transactions, reference counting, closure rules
//! - [`controller`]: per-connection protocol and process-wide shutdown
//! - [`server`] and [`lifecycle`]: listening socket, pid lock, cleanup

pub mod command;
pub mod config;
pub mod controller;
pub mod lifecycle;
pub mod protocol;
pub mod server;
pub mod sink;
pub mod table;

pub use config::{ConfigError, RouterConfig};
pub use controller::{Controller, ControllerError, Credentials, ServerState};
pub use lifecycle::{LifecycleError, Router, RouterController};
pub use sink::{FileSink, Sink, SinkError, SinkLayout};
pub use table::{Closure, DiscardReason, OpenRequest, Opened, TableError, TransactionTable};

#[cfg(any(test, feature = "test-support"))]
pub use sink::MemorySink;
