// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Socket listener and the accept loop

use std::io;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream, UnixListener, UnixStream};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};
use ust_core::{Address, Clock, IdGen};

use crate::controller::{Controller, ControllerError, ServerState};
use crate::protocol::ProtocolError;

/// How long a graceful shutdown waits for connections to wind down
pub const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// A bound unix or TCP listener
pub enum Listener {
    Unix(UnixListener),
    Tcp(TcpListener),
}

/// A freshly accepted client stream
pub enum Accepted {
    Unix(UnixStream),
    Tcp(TcpStream),
}

impl Listener {
    pub async fn bind(address: &Address) -> io::Result<Self> {
        match address {
            Address::Unix(path) => UnixListener::bind(path).map(Listener::Unix),
            Address::Tcp { host, port } => TcpListener::bind((host.as_str(), *port))
                .await
                .map(Listener::Tcp),
        }
    }

    /// Address clients should use; resolves an ephemeral TCP port
    pub fn local_address(&self, configured: &Address) -> io::Result<Address> {
        match self {
            Listener::Unix(_) => Ok(configured.clone()),
            Listener::Tcp(listener) => {
                let local = listener.local_addr()?;
                Ok(Address::Tcp {
                    host: local.ip().to_string(),
                    port: local.port(),
                })
            }
        }
    }

    pub async fn accept(&self) -> io::Result<Accepted> {
        match self {
            Listener::Unix(listener) => listener.accept().await.map(|(s, _)| Accepted::Unix(s)),
            Listener::Tcp(listener) => {
                let (stream, _) = listener.accept().await?;
                stream.set_nodelay(true)?;
                Ok(Accepted::Tcp(stream))
            }
        }
    }
}

/// Accept connections until the controller leaves [`ServerState::Running`]
///
/// Each connection runs on its own task. After shutdown finishes, a graceful
/// stop gives connections [`DRAIN_TIMEOUT`] to end before aborting them.
pub async fn serve<C: Clock, G: IdGen>(listener: Listener, controller: Arc<Controller<C, G>>) {
    let mut state = controller.subscribe();
    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            result = listener.accept() => match result {
                Ok(stream) => {
                    let controller = Arc::clone(&controller);
                    connections.spawn(async move { handle_connection(&controller, stream).await });
                }
                Err(e) => error!("Error accepting connection: {}", e),
            },
            _ = state.wait_for(|s| *s != ServerState::Running) => break,
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
        }
    }

    drop(listener);
    let _ = state
        .wait_for(|s| *s == ServerState::FinishedShutdown)
        .await;

    if controller.is_graceful() {
        let drained = tokio::time::timeout(DRAIN_TIMEOUT, async {
            while connections.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            warn!(
                remaining = connections.len(),
                "connections still open after drain timeout"
            );
        }
    }
    connections.abort_all();
    while connections.join_next().await.is_some() {}
    info!("listener stopped");
}

async fn handle_connection<C: Clock, G: IdGen>(controller: &Controller<C, G>, stream: Accepted) {
    let result = match stream {
        Accepted::Unix(stream) => controller.serve_connection(stream).await,
        Accepted::Tcp(stream) => controller.serve_connection(stream).await,
    };
    match result {
        Ok(()) => debug!("client disconnected"),
        Err(ControllerError::Protocol(ProtocolError::ConnectionClosed)) => {
            debug!("client disconnected during handshake")
        }
        Err(e) => warn!("Error handling connection: {}", e),
    }
}
