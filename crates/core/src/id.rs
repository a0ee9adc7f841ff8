// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Transaction ID generation

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::clock::{Clock, SystemClock};
use crate::timestamp;
use crate::transaction::TransactionId;

/// Generates unique transaction identifiers
pub trait IdGen: Clone + Send + Sync + 'static {
    fn next(&self) -> TransactionId;
}

/// Production generator: `<base-36 minute>-<random>`
///
/// The minute prefix keeps IDs from the same period close together when
/// sorted; the suffix comes from a v4 UUID.
#[derive(Clone, Default)]
pub struct TxnIdGen<C: Clock = SystemClock> {
    clock: C,
}

impl<C: Clock> TxnIdGen<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }
}

impl<C: Clock> IdGen for TxnIdGen<C> {
    fn next(&self) -> TransactionId {
        let minute = self.clock.epoch_micros() / 60_000_000;
        let random = uuid::Uuid::new_v4().simple().to_string();
        TransactionId::new(format!("{}-{}", timestamp::encode(minute), &random[..12]))
    }
}

/// Sequential ID generator for testing
#[derive(Clone)]
pub struct SequentialIdGen {
    prefix: String,
    counter: Arc<AtomicU64>,
}

impl SequentialIdGen {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            counter: Arc::new(AtomicU64::new(1)),
        }
    }
}

impl Default for SequentialIdGen {
    fn default() -> Self {
        Self::new("txn")
    }
}

impl IdGen for SequentialIdGen {
    fn next(&self) -> TransactionId {
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        TransactionId::new(format!("{}-{}", self.prefix, n))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FakeClock;

    #[test]
    fn txn_id_gen_prefixes_with_minute() {
        // 2010-01-13T12:23:42Z
        let id_gen = TxnIdGen::new(FakeClock::at_epoch_micros(1_263_385_422_000_000));
        let id = id_gen.next();
        assert!(id.as_str().starts_with("cjb8n-"), "{}", id);
        assert_eq!(id.as_str().len(), "cjb8n-".len() + 12);
    }

    #[test]
    fn txn_id_gen_creates_unique_ids() {
        let id_gen: TxnIdGen = TxnIdGen::default();
        assert_ne!(id_gen.next(), id_gen.next());
    }

    #[test]
    fn sequential_gen_is_cloneable_and_shared() {
        let id_gen1 = SequentialIdGen::new("shared");
        let id_gen2 = id_gen1.clone();
        assert_eq!(id_gen1.next().as_str(), "shared-1");
        assert_eq!(id_gen2.next().as_str(), "shared-2");
        assert_eq!(id_gen1.next().as_str(), "shared-3");
    }
}
