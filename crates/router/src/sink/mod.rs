// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Append-only destinations for committed transactions

mod file;
#[cfg(any(test, feature = "test-support"))]
mod memory;

pub use file::{FileSink, SinkLayout};
#[cfg(any(test, feature = "test-support"))]
pub use memory::MemorySink;

use std::path::PathBuf;

use thiserror::Error;
use ust_core::DestinationId;

/// Errors from sink operations
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid destination {0}: components must be non-empty file names")]
    InvalidDestination(DestinationId),

    #[error("sink unavailable: {0}")]
    Unavailable(String),
}

/// Append-only byte store addressed by destination
///
/// Appends may stay buffered until [`Sink::flush`] returns. Appends to one
/// destination are applied in call order.
pub trait Sink: Send + Sync + 'static {
    fn append(&self, destination: &DestinationId, data: &[u8]) -> Result<(), SinkError>;

    /// Make every buffered append durable and visible to readers
    fn flush(&self) -> Result<(), SinkError>;
}
