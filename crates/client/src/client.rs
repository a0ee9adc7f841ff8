// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Entry point for applications: opens transactions over pooled connections

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tracing::{debug, warn};
use ust_core::filter::CLAUSE_SEPARATOR;
use ust_core::{timestamp, Address, Clock, SystemClock};

use crate::backoff::Backoff;
use crate::connection::Connection;
use crate::error::ClientError;
use crate::transaction::ClientTransaction;

/// Idle connections kept per core
const MAX_IDLE_CONNECTIONS: usize = 8;

/// How a new transaction is opened
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionOptions {
    pub category: String,
    /// Gateway key recorded with the transaction
    pub key: String,
    /// Filter clauses; the transaction is only written when all of them hold
    pub filters: Vec<String>,
    /// Keep the data when a participant disconnects without closing
    pub crash_protect: bool,
}

impl Default for TransactionOptions {
    fn default() -> Self {
        Self {
            category: "requests".to_string(),
            key: "-".to_string(),
            filters: Vec::new(),
            crash_protect: true,
        }
    }
}

pub(crate) struct Shared<C: Clock> {
    address: Address,
    username: String,
    password: String,
    node_name: String,
    pool: Mutex<Vec<Connection>>,
    backoff: Mutex<Backoff>,
    clock: C,
}

impl<C: Clock> Shared<C> {
    fn backoff(&self) -> MutexGuard<'_, Backoff> {
        self.backoff.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn pool(&self) -> MutexGuard<'_, Vec<Connection>> {
        self.pool.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn is_suppressed(&self) -> bool {
        self.backoff().is_suppressed(self.clock.now())
    }

    /// Reuse an idle connection or open a new one
    fn checkout(&self) -> Result<Connection, ClientError> {
        if let Some(connection) = self.pool().pop() {
            return Ok(connection);
        }
        let connection =
            Connection::open(&self.address, &self.username, &self.password, &self.node_name)?;
        self.backoff().record_success();
        debug!(address = %self.address, "connected to router");
        Ok(connection)
    }

    pub(crate) fn checkin(&self, connection: Connection) {
        let mut pool = self.pool();
        if pool.len() < MAX_IDLE_CONNECTIONS {
            pool.push(connection);
        }
    }

    /// Note a failure; the connection that produced it must be dropped
    ///
    /// A transport failure also discards every idle connection, since they
    /// were opened against the same router.
    pub(crate) fn fail(&self, error: &ClientError) {
        if error.is_transport_failure() {
            warn!(address = %self.address, error = %error, "router connection failed");
            self.pool().clear();
            self.backoff().record_failure(self.clock.now());
        } else {
            debug!(error = %error, "router rejected command");
        }
    }

    pub(crate) fn timestamp(&self) -> String {
        timestamp::encode(self.clock.epoch_micros())
    }
}

/// Handle to a router; cheap to clone, clones share one connection pool
///
/// A core without a router (see [`ClientCore::null`]) hands out null
/// transactions and never performs I/O.
pub struct ClientCore<C: Clock = SystemClock> {
    shared: Option<Arc<Shared<C>>>,
}

impl<C: Clock> Clone for ClientCore<C> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl ClientCore<SystemClock> {
    pub fn new(
        address: Address,
        username: impl Into<String>,
        password: impl Into<String>,
        node_name: impl Into<String>,
    ) -> Self {
        Self::with_clock(address, username, password, node_name, SystemClock)
    }

    /// A core that is not connected to any router
    pub fn null() -> Self {
        Self { shared: None }
    }
}

impl<C: Clock> ClientCore<C> {
    pub fn with_clock(
        address: Address,
        username: impl Into<String>,
        password: impl Into<String>,
        node_name: impl Into<String>,
        clock: C,
    ) -> Self {
        Self {
            shared: Some(Arc::new(Shared {
                address,
                username: username.into(),
                password: password.into(),
                node_name: node_name.into(),
                pool: Mutex::new(Vec::new()),
                backoff: Mutex::new(Backoff::default()),
                clock,
            })),
        }
    }

    pub(crate) fn from_shared(shared: Arc<Shared<C>>) -> Self {
        Self {
            shared: Some(shared),
        }
    }

    pub fn is_null(&self) -> bool {
        self.shared.is_none()
    }

    /// How long to stay away from the router after a connection failure
    pub fn set_reconnect_timeout(&self, timeout: Duration) {
        if let Some(shared) = &self.shared {
            shared.backoff().set_reconnect_timeout(timeout);
        }
    }

    /// Start a transaction in `group`; null when the router is unreachable
    pub fn new_transaction(&self, group: &str, options: TransactionOptions) -> ClientTransaction<C> {
        let separator = CLAUSE_SEPARATOR.to_string();
        let filters = options.filters.join(separator.as_str());
        self.open(
            "",
            group,
            &options.category,
            &options.key,
            options.crash_protect,
            &filters,
        )
    }

    /// Join a transaction started elsewhere; null when the router is
    /// unreachable or no longer knows `txn_id`
    pub fn continue_transaction(
        &self,
        txn_id: &str,
        group: &str,
        category: &str,
    ) -> ClientTransaction<C> {
        if txn_id.is_empty() {
            return ClientTransaction::default();
        }
        self.open(txn_id, group, category, "-", true, "")
    }

    fn open(
        &self,
        txn_id: &str,
        group: &str,
        category: &str,
        key: &str,
        crash_protect: bool,
        filters: &str,
    ) -> ClientTransaction<C> {
        let Some(shared) = &self.shared else {
            return ClientTransaction::default();
        };
        if shared.is_suppressed() {
            debug!(group, category, "router recently unreachable; skipping transaction");
            return ClientTransaction::default();
        }

        let mut connection = match shared.checkout() {
            Ok(connection) => connection,
            Err(e) => {
                shared.fail(&e);
                return ClientTransaction::default();
            }
        };
        let timestamp = shared.timestamp();
        let crash_protect = if crash_protect { "true" } else { "false" };
        let mut fields = vec![
            "openTransaction",
            txn_id,
            group,
            "",
            category,
            timestamp.as_str(),
            key,
            crash_protect,
            "true",
        ];
        if !filters.is_empty() {
            fields.push(filters);
        }

        match connection.request(&fields) {
            Ok(reply) => match reply.into_iter().next() {
                Some(id) => ClientTransaction::live(
                    Arc::clone(shared),
                    connection,
                    id,
                    group,
                    category,
                ),
                None => {
                    shared.fail(&ClientError::UnexpectedReply(Vec::new()));
                    ClientTransaction::default()
                }
            },
            Err(e) => {
                shared.fail(&e);
                ClientTransaction::default()
            }
        }
    }

    /// Ask the router to flush its sink; `false` on any failure
    pub fn flush(&self) -> bool {
        let Some(shared) = &self.shared else {
            return false;
        };
        if shared.is_suppressed() {
            return false;
        }
        let result = shared
            .checkout()
            .and_then(|mut connection| connection.request(&["flush"]).map(|_| connection));
        match result {
            Ok(connection) => {
                shared.checkin(connection);
                true
            }
            Err(e) => {
                shared.fail(&e);
                false
            }
        }
    }
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;
