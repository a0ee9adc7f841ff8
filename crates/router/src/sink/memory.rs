// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory sink for testing
#![cfg_attr(coverage_nightly, coverage(off))]

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use ust_core::DestinationId;

use super::{Sink, SinkError};

#[derive(Default)]
struct MemoryState {
    pending: BTreeMap<DestinationId, Vec<u8>>,
    flushed: BTreeMap<DestinationId, Vec<u8>>,
    appends: usize,
    flushes: usize,
    failing: bool,
}

/// Sink that keeps buffered and flushed bytes apart so tests can observe both
#[derive(Clone, Default)]
pub struct MemorySink {
    state: Arc<Mutex<MemoryState>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent append and flush fail
    pub fn set_failing(&self, failing: bool) {
        self.lock().failing = failing;
    }

    /// Flushed bytes for every destination in `category`, as text
    pub fn flushed(&self, category: &str) -> String {
        Self::collect(&self.lock().flushed, category)
    }

    /// Appended-but-unflushed bytes for `category`, as text
    pub fn pending(&self, category: &str) -> String {
        Self::collect(&self.lock().pending, category)
    }

    /// Number of successful appends (one per committed transaction)
    pub fn append_count(&self) -> usize {
        self.lock().appends
    }

    pub fn flush_count(&self) -> usize {
        self.lock().flushes
    }

    fn collect(map: &BTreeMap<DestinationId, Vec<u8>>, category: &str) -> String {
        map.iter()
            .filter(|(dest, _)| dest.category() == category)
            .map(|(_, data)| String::from_utf8_lossy(data).into_owned())
            .collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Sink for MemorySink {
    fn append(&self, destination: &DestinationId, data: &[u8]) -> Result<(), SinkError> {
        let mut state = self.lock();
        if state.failing {
            return Err(SinkError::Unavailable("memory sink set to fail".into()));
        }
        state
            .pending
            .entry(destination.clone())
            .or_default()
            .extend_from_slice(data);
        state.appends += 1;
        Ok(())
    }

    fn flush(&self) -> Result<(), SinkError> {
        let mut state = self.lock();
        if state.failing {
            return Err(SinkError::Unavailable("memory sink set to fail".into()));
        }
        let pending = std::mem::take(&mut state.pending);
        for (destination, data) in pending {
            state
                .flushed
                .entry(destination)
                .or_default()
                .extend_from_slice(&data);
        }
        state.flushes += 1;
        Ok(())
    }
}
