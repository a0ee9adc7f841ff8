// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Router lifecycle management: startup, serving, cleanup.

use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use fs2::FileExt;
use thiserror::Error;
use tracing::{info, warn};
use ust_core::{Address, SystemClock, TxnIdGen};

use crate::config::{ConfigError, RouterConfig};
use crate::controller::{Controller, Credentials};
use crate::server::{self, Listener};
use crate::sink::{FileSink, Sink};
use crate::table::TransactionTable;

/// Controller type used by the router binary
pub type RouterController = Controller<SystemClock, TxnIdGen>;

/// Lifecycle errors
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("Failed to acquire lock: router already running?")]
    LockFailed(#[source] std::io::Error),

    #[error("Failed to bind {0}: {1}")]
    BindFailed(Address, std::io::Error),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A router bound to its address and ready to serve
pub struct Router {
    config: RouterConfig,
    address: Address,
    // NOTE(lifetime): Held to maintain exclusive file lock; released on drop
    #[allow(dead_code)]
    lock_file: File,
    listener: Listener,
    controller: Arc<RouterController>,
}

impl Router {
    /// Start a router writing to a [`FileSink`] under the dump directory
    pub async fn startup(config: &RouterConfig) -> Result<Self, LifecycleError> {
        let sink = Arc::new(FileSink::new(&config.dump_dir, config.sink_layout));
        Self::startup_with_sink(config, sink).await
    }

    /// Start a router writing to `sink`
    pub async fn startup_with_sink(
        config: &RouterConfig,
        sink: Arc<dyn Sink>,
    ) -> Result<Self, LifecycleError> {
        config.validate()?;
        let lock_file = acquire_lock(config)?;
        match startup_inner(config, sink).await {
            Ok((listener, address, controller)) => {
                info!(address = %address, dump_dir = %config.dump_dir.display(), "router started");
                Ok(Self {
                    config: config.clone(),
                    address,
                    lock_file,
                    listener,
                    controller,
                })
            }
            Err(e) => {
                // Clean up any resources created before failure
                cleanup(config);
                Err(e)
            }
        }
    }

    /// Address clients should connect to
    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn controller(&self) -> Arc<RouterController> {
        Arc::clone(&self.controller)
    }

    /// Serve until shutdown completes, then remove the socket and pid files
    pub async fn run(self) {
        let Router {
            config,
            lock_file,
            listener,
            controller,
            ..
        } = self;
        server::serve(listener, controller).await;
        cleanup(&config);
        drop(lock_file);
        info!("router shutdown complete");
    }
}

fn acquire_lock(config: &RouterConfig) -> Result<File, LifecycleError> {
    let lock_path = config.pid_path();
    if let Some(parent) = lock_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    // Opened without truncation so a running router's pid survives a failed attempt
    let mut lock_file = std::fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(false)
        .open(&lock_path)?;
    lock_file
        .try_lock_exclusive()
        .map_err(LifecycleError::LockFailed)?;
    lock_file.set_len(0)?;
    writeln!(lock_file, "{}", std::process::id())?;
    Ok(lock_file)
}

async fn startup_inner(
    config: &RouterConfig,
    sink: Arc<dyn Sink>,
) -> Result<(Listener, Address, Arc<RouterController>), LifecycleError> {
    std::fs::create_dir_all(&config.dump_dir)?;

    // Remove stale socket and bind (LAST - only after the lock is held)
    if let Address::Unix(path) = &config.address {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        remove_if_exists(path)?;
    }
    let listener = Listener::bind(&config.address)
        .await
        .map_err(|e| LifecycleError::BindFailed(config.address.clone(), e))?;
    let address = listener.local_address(&config.address)?;

    let table = TransactionTable::new(sink, TxnIdGen::new(SystemClock));
    let controller = Controller::new(
        table,
        SystemClock,
        Credentials::new(&config.username, &config.password),
    )
    .with_max_payload_size(config.max_payload_size);

    Ok((listener, address, Arc::new(controller)))
}

fn remove_if_exists(path: &Path) -> std::io::Result<()> {
    match std::fs::remove_file(path) {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

/// Remove the socket and pid files
fn cleanup(config: &RouterConfig) {
    if let Address::Unix(path) = &config.address {
        if let Err(e) = remove_if_exists(path) {
            warn!("Failed to remove socket file: {}", e);
        }
    }
    if let Err(e) = remove_if_exists(&config.pid_path()) {
        warn!("Failed to remove PID file: {}", e);
    }
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
