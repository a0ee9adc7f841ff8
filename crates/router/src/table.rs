// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Registry of resident transactions
//!
//! Each record sits behind its own mutex and is reached through an `Arc`
//! handle cloned out of the map, so operations on different transactions
//! never contend and eviction cannot leave a caller holding a dangling entry.
//! A record whose reference count reaches zero is marked closed under its
//! lock, removed from the map, and then either committed to the sink or
//! discarded.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info};
use ust_core::{
    ContextExtractor, DestinationId, EventPayload, Filter, FilterContext, IdGen, LogEvent,
    PrefixExtractor, TransactionId, TxnIdGen,
};

use crate::sink::Sink;

/// Errors from table operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TableError {
    #[error("transaction {0} not found")]
    NotFound(TransactionId),

    #[error("router is shutting down")]
    Sealed,
}

/// Parameters for opening (or continuing) a transaction
#[derive(Debug, Clone)]
pub struct OpenRequest {
    /// `None` creates a new transaction; `Some` continues a resident one
    pub id: Option<TransactionId>,
    pub destination: DestinationId,
    pub timestamp: u64,
    /// Only honoured when creating
    pub filter: Option<Filter>,
    pub crash_protect: bool,
    /// Gateway key; only honoured when creating
    pub key: String,
}

/// Result of a successful open
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Opened {
    pub id: TransactionId,
    /// Sequence number of the ATTACH event
    pub sequence: u64,
    pub created: bool,
}

/// Why a finished transaction was not written
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscardReason {
    NotCrashProtected,
    FilteredOut,
}

/// Outcome of releasing one reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Closure {
    /// Other participants are still attached
    Pending { refcount: u32 },
    /// All events were handed to the sink
    Committed { lines: usize },
    Discarded(DiscardReason),
    /// The sink rejected the append; the record is gone regardless
    WriteFailed,
}

/// Snapshot of a resident transaction, reported by the `status` command
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransactionSummary {
    pub id: TransactionId,
    pub destination: DestinationId,
    pub key: String,
    pub refcount: u32,
    pub crash_protected: bool,
    pub events: usize,
}

struct TransactionRecord {
    destination: DestinationId,
    key: String,
    events: Vec<LogEvent>,
    refcount: u32,
    crash_protected: bool,
    filter: Option<Filter>,
    context: FilterContext,
    next_sequence: u64,
    // Set under the lock when the last reference goes; never cleared
    closed: bool,
}

impl TransactionRecord {
    fn push(&mut self, timestamp: u64, payload: EventPayload) -> u64 {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.events.push(LogEvent {
            sequence,
            timestamp,
            payload,
        });
        sequence
    }

    fn finish(&mut self) -> Finished {
        self.closed = true;
        self.refcount = 0;
        Finished {
            destination: self.destination.clone(),
            events: std::mem::take(&mut self.events),
            crash_protected: self.crash_protected,
            filter: self.filter.take(),
            context: std::mem::take(&mut self.context),
        }
    }
}

/// Data taken out of a closed record, evaluated without any lock held
struct Finished {
    destination: DestinationId,
    events: Vec<LogEvent>,
    crash_protected: bool,
    filter: Option<Filter>,
    context: FilterContext,
}

type Handle = Arc<Mutex<TransactionRecord>>;

fn lock(handle: &Handle) -> MutexGuard<'_, TransactionRecord> {
    handle.lock().unwrap_or_else(|e| e.into_inner())
}

/// Concurrent transaction registry feeding a [`Sink`]
pub struct TransactionTable<G: IdGen = TxnIdGen> {
    records: DashMap<TransactionId, Handle>,
    sink: Arc<dyn Sink>,
    extractor: Arc<dyn ContextExtractor>,
    id_gen: G,
    sealed: AtomicBool,
}

impl<G: IdGen> TransactionTable<G> {
    pub fn new(sink: Arc<dyn Sink>, id_gen: G) -> Self {
        Self {
            records: DashMap::new(),
            sink,
            extractor: Arc::new(PrefixExtractor::new()),
            id_gen,
            sealed: AtomicBool::new(false),
        }
    }

    /// Replace the function that fills filter context from payloads
    pub fn with_extractor(mut self, extractor: Arc<dyn ContextExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn sink(&self) -> &Arc<dyn Sink> {
        &self.sink
    }

    /// Number of resident transactions
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed.load(Ordering::SeqCst)
    }

    /// Create a transaction, or attach to a resident one
    pub fn open(&self, request: OpenRequest) -> Result<Opened, TableError> {
        if self.is_sealed() {
            return Err(TableError::Sealed);
        }
        match request.id {
            Some(id) => self.attach(id, request.timestamp, request.crash_protect),
            None => self.create(request),
        }
    }

    fn create(&self, request: OpenRequest) -> Result<Opened, TableError> {
        let mut record = TransactionRecord {
            destination: request.destination,
            key: request.key,
            events: Vec::new(),
            refcount: 1,
            crash_protected: request.crash_protect,
            filter: request.filter.filter(|f| !f.is_empty()),
            context: FilterContext::new(),
            next_sequence: 0,
            closed: false,
        };
        let sequence = record.push(request.timestamp, EventPayload::Attach);
        let destination = record.destination.clone();
        let mut record = Some(record);

        loop {
            let id = self.id_gen.next();
            match self.records.entry(id.clone()) {
                Entry::Occupied(_) => continue,
                Entry::Vacant(slot) => {
                    // Checked under the shard lock so a concurrent seal either
                    // sees this record or makes us see the seal.
                    if self.is_sealed() {
                        return Err(TableError::Sealed);
                    }
                    if let Some(record) = record.take() {
                        slot.insert(Arc::new(Mutex::new(record)));
                    }
                    info!(txn_id = %id, destination = %destination, "transaction created");
                    return Ok(Opened {
                        id,
                        sequence,
                        created: true,
                    });
                }
            }
        }
    }

    fn attach(
        &self,
        id: TransactionId,
        timestamp: u64,
        crash_protect: bool,
    ) -> Result<Opened, TableError> {
        let handle = self.handle(&id)?;
        let mut record = lock(&handle);
        if record.closed {
            return Err(TableError::NotFound(id));
        }
        record.refcount += 1;
        record.crash_protected |= crash_protect;
        let sequence = record.push(timestamp, EventPayload::Attach);
        debug!(txn_id = %id, refcount = record.refcount, seq = sequence, "attached");
        Ok(Opened {
            id,
            sequence,
            created: false,
        })
    }

    /// Append a message event, returning its sequence number
    pub fn append(
        &self,
        id: &TransactionId,
        timestamp: u64,
        payload: Vec<u8>,
    ) -> Result<u64, TableError> {
        let handle = self.handle(id)?;
        let assignment = self.extractor.extract(&payload);
        let mut record = lock(&handle);
        if record.closed {
            return Err(TableError::NotFound(id.clone()));
        }
        if let Some((variable, value)) = assignment {
            record.context.set(variable, value);
        }
        Ok(record.push(timestamp, EventPayload::Message(payload)))
    }

    /// Release one reference, committing or discarding at zero
    pub fn close(&self, id: &TransactionId, timestamp: u64) -> Result<Closure, TableError> {
        let handle = self.handle(id)?;
        self.release(id, &handle, timestamp)
            .ok_or_else(|| TableError::NotFound(id.clone()))
    }

    /// Release a reference held by a connection that went away
    ///
    /// Unknown or already-evicted ids are ignored.
    pub fn detach_on_disconnect(&self, id: &TransactionId, timestamp: u64) -> Option<Closure> {
        let handle = self.handle(id).ok()?;
        self.release(id, &handle, timestamp)
    }

    fn release(&self, id: &TransactionId, handle: &Handle, timestamp: u64) -> Option<Closure> {
        let finished = {
            let mut record = lock(handle);
            if record.closed {
                return None;
            }
            record.refcount = record.refcount.saturating_sub(1);
            let sequence = record.push(timestamp, EventPayload::Detach);
            if record.refcount > 0 {
                debug!(txn_id = %id, refcount = record.refcount, seq = sequence, "detached");
                return Some(Closure::Pending {
                    refcount: record.refcount,
                });
            }
            record.finish()
        };
        self.evict(id, handle);
        Some(self.conclude(id, finished))
    }

    /// Seal the table and close every resident transaction
    ///
    /// Reference counts are forced to zero without adding DETACH events.
    /// Opens racing with this call fail with [`TableError::Sealed`].
    pub fn force_close_all(&self) -> Vec<(TransactionId, Closure)> {
        self.sealed.store(true, Ordering::SeqCst);
        let handles: Vec<(TransactionId, Handle)> = self
            .records
            .iter()
            .map(|entry| (entry.key().clone(), Arc::clone(entry.value())))
            .collect();

        let mut closures = Vec::with_capacity(handles.len());
        for (id, handle) in handles {
            let finished = {
                let mut record = lock(&handle);
                if record.closed {
                    continue;
                }
                record.finish()
            };
            self.evict(&id, &handle);
            let closure = self.conclude(&id, finished);
            closures.push((id, closure));
        }
        closures
    }

    /// Summaries of resident transactions, ordered by id
    pub fn snapshot(&self) -> Vec<TransactionSummary> {
        let handles: Vec<(TransactionId, Handle)> = self
            .records
            .iter()
            .map(|entry| (entry.key().clone(), Arc::clone(entry.value())))
            .collect();
        let mut summaries: Vec<TransactionSummary> = handles
            .into_iter()
            .filter_map(|(id, handle)| {
                let record = lock(&handle);
                if record.closed {
                    return None;
                }
                let summary = TransactionSummary {
                    id,
                    destination: record.destination.clone(),
                    key: record.key.clone(),
                    refcount: record.refcount,
                    crash_protected: record.crash_protected,
                    events: record.events.len(),
                };
                Some(summary)
            })
            .collect();
        summaries.sort_by(|a, b| a.id.cmp(&b.id));
        summaries
    }

    fn handle(&self, id: &TransactionId) -> Result<Handle, TableError> {
        self.records
            .get(id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| TableError::NotFound(id.clone()))
    }

    fn evict(&self, id: &TransactionId, handle: &Handle) {
        self.records
            .remove_if(id, |_, resident| Arc::ptr_eq(resident, handle));
    }

    fn conclude(&self, id: &TransactionId, finished: Finished) -> Closure {
        if !finished.crash_protected {
            debug!(txn_id = %id, "discarding transaction without crash protection");
            return Closure::Discarded(DiscardReason::NotCrashProtected);
        }
        if let Some(filter) = &finished.filter {
            if !filter.evaluate(&finished.context) {
                debug!(txn_id = %id, "transaction rejected by filter");
                return Closure::Discarded(DiscardReason::FilteredOut);
            }
        }

        let mut data = Vec::new();
        for event in &finished.events {
            event.write_line(&mut data);
        }
        match self.sink.append(&finished.destination, &data) {
            Ok(()) => {
                info!(
                    txn_id = %id,
                    category = finished.destination.category(),
                    lines = finished.events.len(),
                    "transaction committed"
                );
                Closure::Committed {
                    lines: finished.events.len(),
                }
            }
            Err(e) => {
                error!(txn_id = %id, error = %e, "failed to write transaction");
                Closure::WriteFailed
            }
        }
    }
}

#[cfg(test)]
#[path = "table_tests.rs"]
mod tests;
