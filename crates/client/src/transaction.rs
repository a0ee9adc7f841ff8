// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! A transaction held open on the router for the lifetime of the value

use std::sync::Arc;

use tracing::debug;
use ust_core::{codec, Clock, SystemClock};

use crate::client::{ClientCore, Shared, TransactionOptions};
use crate::connection::Connection;
use crate::error::ClientError;

/// Category receiving [`ClientTransaction::log_exception`] records
pub const EXCEPTIONS_CATEGORY: &str = "exceptions";

struct Live<C: Clock> {
    shared: Arc<Shared<C>>,
    /// `None` once a write failed; the transaction is then inert
    connection: Option<Connection>,
    txn_id: String,
    group_name: String,
    category: String,
    flush_to_disk: bool,
}

impl<C: Clock> Live<C> {
    fn send_log(&mut self, payload: &[u8]) {
        let Some(connection) = self.connection.as_mut() else {
            return;
        };
        let timestamp = self.shared.timestamp();
        let fields = ["log", self.txn_id.as_str(), timestamp.as_str()];
        if let Err(e) = connection.send_with_payload(&fields, payload) {
            self.shared.fail(&e);
            self.connection = None;
        }
    }

    fn close(&mut self) {
        let Some(mut connection) = self.connection.take() else {
            return;
        };
        let timestamp = self.shared.timestamp();
        let result = connection
            .request(&["closeTransaction", self.txn_id.as_str(), timestamp.as_str(), "true"])
            .and_then(|_| {
                if self.flush_to_disk {
                    connection.request(&["flush"])?;
                }
                Ok::<_, ClientError>(())
            });
        match result {
            Ok(()) => self.shared.checkin(connection),
            Err(e) => self.shared.fail(&e),
        }
    }
}

/// Handle to a router transaction; closed on drop
///
/// A null transaction (router unreachable, backoff active, unknown id)
/// accepts every call and does nothing.
pub struct ClientTransaction<C: Clock = SystemClock> {
    live: Option<Live<C>>,
}

impl<C: Clock> Default for ClientTransaction<C> {
    fn default() -> Self {
        Self { live: None }
    }
}

impl ClientTransaction<SystemClock> {
    pub fn null() -> Self {
        Self::default()
    }
}

impl<C: Clock> ClientTransaction<C> {
    pub(crate) fn live(
        shared: Arc<Shared<C>>,
        connection: Connection,
        txn_id: String,
        group_name: &str,
        category: &str,
    ) -> Self {
        debug!(txn_id = %txn_id, group_name, category, "transaction opened");
        Self {
            live: Some(Live {
                shared,
                connection: Some(connection),
                txn_id,
                group_name: group_name.to_string(),
                category: category.to_string(),
                flush_to_disk: false,
            }),
        }
    }

    pub fn is_null(&self) -> bool {
        self.live.is_none()
    }

    /// Router-assigned id; empty for a null transaction
    pub fn txn_id(&self) -> &str {
        self.live.as_ref().map_or("", |live| live.txn_id.as_str())
    }

    pub fn group_name(&self) -> &str {
        self.live.as_ref().map_or("", |live| live.group_name.as_str())
    }

    pub fn category(&self) -> &str {
        self.live.as_ref().map_or("", |live| live.category.as_str())
    }

    /// Append one line to the transaction
    pub fn message(&mut self, text: &str) {
        if let Some(live) = self.live.as_mut() {
            live.send_log(text.as_bytes());
        }
    }

    /// Wait for the router to flush its sink when this transaction closes
    pub fn flush_to_disk_after_close(&mut self, enabled: bool) {
        if let Some(live) = self.live.as_mut() {
            live.flush_to_disk = enabled;
        }
    }

    /// Record an exception raised while handling this transaction
    ///
    /// The exception becomes its own transaction in the `exceptions`
    /// category of the same group, referencing this transaction's id.
    pub fn log_exception(&self, message: &str, class_name: &str, backtrace: &str) {
        let Some(live) = self.live.as_ref() else {
            return;
        };
        let core = ClientCore::from_shared(Arc::clone(&live.shared));
        let options = TransactionOptions {
            category: EXCEPTIONS_CATEGORY.to_string(),
            ..TransactionOptions::default()
        };
        let mut exception = core.new_transaction(&live.group_name, options);
        exception.message(&format!("Request transaction ID: {}", live.txn_id));
        exception.message(&format!("Message: {}", codec::encode(message.as_bytes())));
        exception.message(&format!("Class: {class_name}"));
        exception.message(&format!("Backtrace: {}", codec::encode(backtrace.as_bytes())));
    }
}

impl<C: Clock> Drop for ClientTransaction<C> {
    fn drop(&mut self) {
        if let Some(live) = self.live.as_mut() {
            live.close();
        }
    }
}
