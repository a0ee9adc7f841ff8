// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-connection protocol handling and process-wide shutdown
//!
//! A connection moves through `Accepted -> Authenticated -> Initialized ->
//! Closing -> Closed`. Every transaction a connection attaches is tracked by a
//! [`ConnectionGuard`]; when the connection ends for any reason the guard
//! releases those references, so an abandoned transaction closes as if its
//! participants had crashed.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite, ReadHalf, WriteHalf};
use tokio::sync::watch;
use tracing::{debug, info, warn};
use ust_core::{Clock, DestinationId, IdGen, SystemClock, TransactionId, TxnIdGen};

use crate::command::{Command, CommandError, OpenArgs};
use crate::protocol::{self, ProtocolError, DEFAULT_TIMEOUT};
use crate::sink::SinkError;
use crate::table::{Closure, OpenRequest, TableError, TransactionSummary, TransactionTable};

/// Largest accepted `log` payload unless configured otherwise
pub const DEFAULT_MAX_PAYLOAD_SIZE: usize = 16 * 1024 * 1024;

/// Largest accepted username or password
const MAX_CREDENTIAL_SIZE: usize = 1024;

/// Process-wide lifecycle, observable through [`Controller::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerState {
    Running,
    ShuttingDown,
    FinishedShutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Accepted,
    Authenticated,
    Initialized,
    Closing,
    Closed,
}

/// Username and password every client must present
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    fn matches(&self, username: &[u8], password: &[u8]) -> bool {
        self.username.as_bytes() == username && self.password.as_bytes() == password
    }
}

/// Errors that end (or, for flush, merely fail) a command
#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("authentication failed")]
    AuthenticationFailed,

    #[error("{0}")]
    Command(#[from] CommandError),

    #[error("{0}")]
    Table(#[from] TableError),

    #[error("{0} requires init first")]
    NotInitialized(&'static str),

    #[error("init was already sent on this connection")]
    AlreadyInitialized,

    #[error("transaction {0} is not open on this connection")]
    NotAttached(TransactionId),

    #[error("{0} is not allowed while shutting down")]
    ShuttingDown(&'static str),

    #[error("flush failed: {0}")]
    Flush(#[from] SinkError),
}

impl ControllerError {
    /// Whether the connection survives this error
    fn keeps_connection(&self) -> bool {
        matches!(self, ControllerError::Flush(_))
    }
}

/// Transactions attached through one connection, released on drop
struct ConnectionGuard<'a, C: Clock, G: IdGen> {
    table: &'a TransactionTable<G>,
    clock: &'a C,
    node_name: Option<String>,
    attached: HashMap<TransactionId, u32>,
}

impl<'a, C: Clock, G: IdGen> ConnectionGuard<'a, C, G> {
    fn new(table: &'a TransactionTable<G>, clock: &'a C) -> Self {
        Self {
            table,
            clock,
            node_name: None,
            attached: HashMap::new(),
        }
    }

    fn attach(&mut self, id: TransactionId) {
        *self.attached.entry(id).or_insert(0) += 1;
    }

    /// Forget one attachment, returning `false` if there was none
    fn release(&mut self, id: &TransactionId) -> bool {
        match self.attached.get_mut(id) {
            Some(count) if *count > 1 => {
                *count -= 1;
                true
            }
            Some(_) => {
                self.attached.remove(id);
                true
            }
            None => false,
        }
    }
}

impl<C: Clock, G: IdGen> Drop for ConnectionGuard<'_, C, G> {
    fn drop(&mut self) {
        if self.attached.is_empty() {
            return;
        }
        let timestamp = self.clock.epoch_micros();
        for (id, count) in self.attached.drain() {
            warn!(txn_id = %id, references = count, "connection closed with transaction still open");
            for _ in 0..count {
                match self.table.detach_on_disconnect(&id, timestamp) {
                    Some(closure) => debug!(txn_id = %id, ?closure, "released on disconnect"),
                    None => break,
                }
            }
        }
    }
}

/// Owns the transaction table and drives every connection against it
pub struct Controller<C: Clock = SystemClock, G: IdGen = TxnIdGen> {
    table: TransactionTable<G>,
    clock: C,
    credentials: Credentials,
    max_payload_size: usize,
    state: watch::Sender<ServerState>,
    graceful: AtomicBool,
    started: Instant,
}

impl<C: Clock, G: IdGen> Controller<C, G> {
    pub fn new(table: TransactionTable<G>, clock: C, credentials: Credentials) -> Self {
        let (state, _) = watch::channel(ServerState::Running);
        let started = clock.now();
        Self {
            table,
            clock,
            credentials,
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
            state,
            graceful: AtomicBool::new(true),
            started,
        }
    }

    pub fn with_max_payload_size(mut self, max_payload_size: usize) -> Self {
        self.max_payload_size = max_payload_size;
        self
    }

    pub fn table(&self) -> &TransactionTable<G> {
        &self.table
    }

    pub fn state(&self) -> ServerState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ServerState> {
        self.state.subscribe()
    }

    /// Whether the last shutdown asked for connections to be drained
    pub fn is_graceful(&self) -> bool {
        self.graceful.load(Ordering::SeqCst)
    }

    /// Close every resident transaction, flush the sink, and finish
    ///
    /// Returns the closures performed; a second call does nothing. Must not
    /// be called from a current-thread runtime.
    pub fn shutdown(&self, graceful: bool) -> Vec<(TransactionId, Closure)> {
        let started = self.state.send_if_modified(|state| {
            if *state == ServerState::Running {
                *state = ServerState::ShuttingDown;
                true
            } else {
                false
            }
        });
        if !started {
            return Vec::new();
        }
        self.graceful.store(graceful, Ordering::SeqCst);
        info!(graceful, "shutting down");

        // Sink writes block; keep them off the async worker when on one
        let closures = tokio::task::block_in_place(|| {
            let closures = self.table.force_close_all();
            if let Err(e) = self.table.sink().flush() {
                warn!(error = %e, "failed to flush sink during shutdown");
            }
            closures
        });
        info!(closed = closures.len(), "all transactions closed");

        self.state.send_replace(ServerState::FinishedShutdown);
        closures
    }

    /// Run one client connection to completion
    pub async fn serve_connection<S>(&self, stream: S) -> Result<(), ControllerError>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let (mut reader, mut writer) = tokio::io::split(stream);
        let mut guard = ConnectionGuard::new(&self.table, &self.clock);
        let mut state = ConnectionState::Accepted;

        let result = self
            .run(&mut state, &mut guard, &mut reader, &mut writer)
            .await;
        state = ConnectionState::Closing;
        debug!(?state, "connection closing");
        drop(guard);
        state = ConnectionState::Closed;
        debug!(?state, "connection closed");
        result
    }

    async fn run<S>(
        &self,
        state: &mut ConnectionState,
        guard: &mut ConnectionGuard<'_, C, G>,
        reader: &mut ReadHalf<S>,
        writer: &mut WriteHalf<S>,
    ) -> Result<(), ControllerError>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        self.handshake(reader, writer).await?;
        *state = ConnectionState::Authenticated;

        let mut server_state = self.subscribe();
        loop {
            let fields = tokio::select! {
                result = protocol::read_array(reader) => match result {
                    Ok(fields) => fields,
                    Err(ProtocolError::ConnectionClosed) => return Ok(()),
                    Err(e) => return Err(e.into()),
                },
                _ = server_state.wait_for(|s| *s == ServerState::FinishedShutdown) => {
                    return Ok(());
                }
            };

            match self.dispatch(state, guard, &fields, reader).await {
                Ok(Some(reply)) => reply_with(writer, &reply).await?,
                Ok(None) => {}
                Err(e) if e.keeps_connection() => {
                    warn!(error = %e, "command failed");
                    reply_with(writer, &["error".to_string(), e.to_string()]).await?;
                }
                Err(e) => {
                    warn!(error = %e, "closing connection after failed command");
                    let _ = reply_with(writer, &["error".to_string(), e.to_string()]).await;
                    return Err(e);
                }
            }
        }
    }

    async fn handshake<S>(
        &self,
        reader: &mut ReadHalf<S>,
        writer: &mut WriteHalf<S>,
    ) -> Result<(), ControllerError>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        reply_with(writer, &["version", ust_core::PROTOCOL_VERSION]).await?;
        let username = protocol::with_timeout(
            DEFAULT_TIMEOUT,
            protocol::read_scalar(reader, MAX_CREDENTIAL_SIZE),
        )
        .await?;
        let password = protocol::with_timeout(
            DEFAULT_TIMEOUT,
            protocol::read_scalar(reader, MAX_CREDENTIAL_SIZE),
        )
        .await?;

        if !self.credentials.matches(&username, &password) {
            warn!("client presented invalid credentials");
            let _ = reply_with(writer, &["status", "error"]).await;
            return Err(ControllerError::AuthenticationFailed);
        }
        reply_with(writer, &["status", "ok"]).await
    }

    async fn dispatch<S>(
        &self,
        state: &mut ConnectionState,
        guard: &mut ConnectionGuard<'_, C, G>,
        fields: &[String],
        reader: &mut ReadHalf<S>,
    ) -> Result<Option<Vec<String>>, ControllerError>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let command = Command::parse(fields)?;
        debug!(command = command.name(), "received command");

        if self.state() != ServerState::Running
            && !matches!(command, Command::Flush | Command::Status)
        {
            return Err(ControllerError::ShuttingDown(command.name()));
        }

        match command {
            Command::Init { node_name } => {
                if *state != ConnectionState::Authenticated {
                    return Err(ControllerError::AlreadyInitialized);
                }
                debug!(node_name = %node_name, "connection initialized");
                guard.node_name = Some(node_name);
                *state = ConnectionState::Initialized;
                Ok(Some(ok(&[])))
            }

            Command::OpenTransaction(args) => {
                let node_name = initialized_node(guard, "openTransaction")?;
                self.open(guard, node_name, *args)
            }

            Command::Log { id, timestamp } => {
                initialized_node(guard, "log")?;
                let payload = protocol::with_timeout(
                    DEFAULT_TIMEOUT,
                    protocol::read_scalar(reader, self.max_payload_size),
                )
                .await?;
                let sequence = self.table.append(&id, timestamp, payload)?;
                debug!(txn_id = %id, seq = sequence, "logged");
                Ok(None)
            }

            Command::CloseTransaction { id, timestamp, ack } => {
                initialized_node(guard, "closeTransaction")?;
                if !guard.release(&id) {
                    return Err(ControllerError::NotAttached(id));
                }
                let closure = self.table.close(&id, timestamp)?;
                debug!(txn_id = %id, ?closure, "closed");
                Ok(ack.then(|| ok(&[])))
            }

            Command::Flush => {
                self.flush_sink().await?;
                Ok(Some(ok(&[])))
            }

            Command::Status => {
                let status = StatusReport {
                    state: self.state(),
                    uptime_secs: self.uptime().as_secs(),
                    transactions: self.table.snapshot(),
                };
                let json = serde_json::to_string(&status)
                    .map_err(|e| ControllerError::Protocol(ProtocolError::Io(e.into())))?;
                Ok(Some(ok(&[json])))
            }

            Command::Shutdown { graceful } => {
                self.shutdown(graceful);
                Ok(Some(ok(&[])))
            }
        }
    }

    fn open(
        &self,
        guard: &mut ConnectionGuard<'_, C, G>,
        init_node: String,
        args: OpenArgs,
    ) -> Result<Option<Vec<String>>, ControllerError> {
        let node_name = if args.node_name.is_empty() {
            init_node
        } else {
            args.node_name
        };
        let opened = self.table.open(OpenRequest {
            id: args.id,
            destination: DestinationId::new(args.group_name, node_name, args.category),
            timestamp: args.timestamp,
            filter: args.filter,
            crash_protect: args.crash_protect,
            key: args.key,
        })?;
        guard.attach(opened.id.clone());
        Ok(args.ack.then(|| ok(&[opened.id.to_string()])))
    }

    async fn flush_sink(&self) -> Result<(), SinkError> {
        let sink = Arc::clone(self.table.sink());
        tokio::task::spawn_blocking(move || sink.flush())
            .await
            .map_err(|e| SinkError::Unavailable(format!("flush task failed: {e}")))?
    }

    fn uptime(&self) -> Duration {
        self.clock.now().saturating_duration_since(self.started)
    }
}

/// Body of the `status` reply
#[derive(Debug, Serialize)]
struct StatusReport {
    state: ServerState,
    uptime_secs: u64,
    transactions: Vec<TransactionSummary>,
}

fn initialized_node<C: Clock, G: IdGen>(
    guard: &ConnectionGuard<'_, C, G>,
    command: &'static str,
) -> Result<String, ControllerError> {
    guard
        .node_name
        .clone()
        .ok_or(ControllerError::NotInitialized(command))
}

fn ok(extra: &[String]) -> Vec<String> {
    let mut reply = vec!["status".to_string(), "ok".to_string()];
    reply.extend_from_slice(extra);
    reply
}

async fn reply_with<W, S>(writer: &mut W, fields: &[S]) -> Result<(), ControllerError>
where
    W: AsyncWrite + Unpin,
    S: AsRef<str>,
{
    protocol::with_timeout(DEFAULT_TIMEOUT, protocol::write_array(writer, fields)).await?;
    Ok(())
}

#[cfg(test)]
#[path = "controller_tests.rs"]
mod tests;
