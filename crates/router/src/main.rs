// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Transaction log router (ust-router)
//!
//! Accepts client connections and writes finished transactions to the dump
//! directory.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info};
use ust_core::Address;
use ust_router::{LifecycleError, Router, RouterConfig};

#[derive(Parser)]
#[command(name = "ust-router", version, about = "Transaction log router")]
struct Args {
    /// TOML config file
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Listen address (`unix:/path` or `tcp://host:port`)
    #[arg(long)]
    address: Option<Address>,

    /// Directory receiving the sink files
    #[arg(long)]
    dump_dir: Option<PathBuf>,

    /// Username clients must present
    #[arg(long)]
    username: Option<String>,

    /// Print the resolved config as JSON and exit
    #[arg(long)]
    print_config: bool,
}

impl Args {
    fn apply(&self, config: &mut RouterConfig) {
        if let Some(address) = &self.address {
            config.address = address.clone();
        }
        if let Some(dump_dir) = &self.dump_dir {
            config.dump_dir = dump_dir.clone();
        }
        if let Some(username) = &self.username {
            config.username = username.clone();
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("ust-router: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {

    // Load configuration: file, then environment, then flags
    let mut config = RouterConfig::resolve(args.config.as_deref())?;
    args.apply(&mut config);

    if args.print_config {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }
    config.validate()?;

    // Write startup marker to log (before tracing setup)
    if let Some(log_path) = &config.log_path {
        write_startup_marker(log_path)?;
    }

    // Set up logging
    let log_guard = setup_logging(&config)?;

    info!("Starting ust-router on {}", config.address);

    let router = match Router::startup(&config).await {
        Ok(router) => router,
        Err(e) => {
            // Write error synchronously (tracing is non-blocking and may not flush in time)
            if let Some(log_path) = &config.log_path {
                write_startup_error(log_path, &e);
            }
            error!("Failed to start router: {}", e);
            drop(log_guard);
            return Err(e.into());
        }
    };
    let controller = router.controller();

    // Set up signal handlers
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    info!("Router ready, listening on {}", router.address());
    println!("READY");

    let running = router.run();
    tokio::pin!(running);

    tokio::select! {
        // Shutdown requested by a client
        _ = &mut running => {
            info!("Router stopped");
            return Ok(());
        }

        _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
        _ = sigint.recv() => info!("Received SIGINT, shutting down..."),
    }

    controller.shutdown(true);
    running.await;

    info!("Router stopped");
    Ok(())
}

/// Startup marker prefix written to log before anything else.
/// Full format: "--- ust-router: starting (pid: 12345) ---"
pub const STARTUP_MARKER_PREFIX: &str = "--- ust-router: starting (pid: ";

/// Write startup marker to log file (appends to existing log)
fn write_startup_marker(log_path: &Path) -> Result<(), LifecycleError> {
    use std::io::Write;

    // Create log directory if needed
    if let Some(parent) = log_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)?;
    writeln!(file, "{}{}) ---", STARTUP_MARKER_PREFIX, std::process::id())?;

    Ok(())
}

/// Write startup error synchronously to log file
fn write_startup_error(log_path: &Path, error: &LifecycleError) {
    use std::io::Write;

    let Ok(mut file) = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)
    else {
        return;
    };
    let _ = writeln!(file, "ERROR Failed to start router: {}", error);
}

fn setup_logging(
    config: &RouterConfig,
) -> Result<tracing_appender::non_blocking::WorkerGuard, LifecycleError> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let (non_blocking, guard) = match &config.log_path {
        Some(log_path) => {
            let file_name = log_path.file_name().ok_or_else(|| {
                std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    format!("log path {} has no file name", log_path.display()),
                )
            })?;
            let dir = log_path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            tracing_appender::non_blocking(tracing_appender::rolling::never(dir, file_name))
        }
        None => tracing_appender::non_blocking(std::io::stderr()),
    };

    // Set up subscriber with env filter
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
        .init();

    Ok(guard)
}
