// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Arkham daemon (arkhamd)
//!
//! Host mode owns the service locator, the worker dispatcher, and the
//! loaded shards; worker mode (`arkhamd worker --pool P`) runs a single
//! pool worker and is normally spawned by the dispatcher, not by hand.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

use arkham_core::WorkerState;
use arkham_host::{ConfigService, Host, HostError, ShardRegistry};
use fs2::FileExt;
use std::path::Path;
use std::process::ExitCode;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info};

fn print_help() {
    println!("arkhamd {}", env!("CARGO_PKG_VERSION"));
    println!("Arkham daemon - document-intelligence host process");
    println!();
    println!("USAGE:");
    println!("    arkhamd                                  start the host");
    println!("    arkhamd worker --pool <POOL> [--worker-id <ID>]");
    println!("                                             run one pool worker");
    println!();
    println!("Worker mode is spawned by the host's dispatcher and should not");
    println!("normally be invoked directly.");
    println!();
    println!("OPTIONS:");
    println!("    -h, --help       Print help information");
    println!("    -v, --version    Print version information");
}

#[tokio::main]
async fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();
    match args.get(1).map(String::as_str) {
        Some("--version" | "-V" | "-v") => {
            println!("arkhamd {}", env!("CARGO_PKG_VERSION"));
            ExitCode::SUCCESS
        }
        Some("--help" | "-h" | "help") => {
            print_help();
            ExitCode::SUCCESS
        }
        Some("worker") => worker_mode(&args[2..]).await,
        Some(other) => {
            eprintln!("error: unexpected argument '{other}'");
            eprintln!("Usage: arkhamd [worker --pool <POOL>] [--help | --version]");
            ExitCode::FAILURE
        }
        None => host_mode().await,
    }
}

async fn worker_mode(args: &[String]) -> ExitCode {
    // Workers log to stderr; the parent captures or discards it.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut pool = None;
    let mut worker_id = None;
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--pool" => pool = iter.next().cloned(),
            "--worker-id" => worker_id = iter.next().cloned(),
            other => {
                eprintln!("error: unexpected worker argument '{other}'");
                return ExitCode::from(2);
            }
        }
    }
    let Some(pool) = pool else {
        eprintln!("Usage: arkhamd worker --pool <POOL> [--worker-id <ID>]");
        return ExitCode::from(2);
    };

    // Core builds ship no shards; downstream builds register theirs here.
    let shards = ShardRegistry::new();
    match arkham_host::worker_main::run(&pool, worker_id, &shards).await {
        Ok(WorkerState::Stopped) => ExitCode::SUCCESS,
        Ok(state) => {
            error!(%state, "worker exited abnormally");
            ExitCode::FAILURE
        }
        Err(e) => {
            error!(error = %e, "worker failed to start");
            ExitCode::FAILURE
        }
    }
}

async fn host_mode() -> ExitCode {
    let config = match ConfigService::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = std::fs::create_dir_all(&config.state_dir) {
        eprintln!("error: cannot create state dir: {e}");
        return ExitCode::FAILURE;
    }

    // Rotate the log and write the startup marker before tracing is up, so
    // a failed start is still visible in the file.
    rotate_log_if_needed(&config.log_path());
    if let Err(e) = write_startup_marker(&config) {
        eprintln!("error: cannot write log: {e}");
        return ExitCode::FAILURE;
    }
    let _log_guard = match setup_logging(&config) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("error: cannot set up logging: {e}");
            return ExitCode::FAILURE;
        }
    };

    // Single-instance lock.
    let lock_file = match std::fs::OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(config.lock_path())
    {
        Ok(file) => file,
        Err(e) => {
            eprintln!("error: cannot open lock file: {e}");
            return ExitCode::FAILURE;
        }
    };
    if lock_file.try_lock_exclusive().is_err() {
        eprintln!("arkhamd is already running");
        return ExitCode::FAILURE;
    }

    // Claim the HTTP port for the external router. In use without
    // force_port_kill is a startup failure (non-zero exit).
    let listener = match arkham_host::port::claim(config.port, config.force_port_kill).await {
        Ok(listener) => listener,
        Err(HostError::PortInUse(port)) => {
            error!(port, "port in use, refusing to start");
            eprintln!("error: port {port} is in use (set ARKHAM_FORCE_PORT_KILL=true to preempt)");
            return ExitCode::FAILURE;
        }
        Err(e) => {
            error!(error = %e, "failed to claim port");
            return ExitCode::FAILURE;
        }
    };
    info!(port = config.port, serve_shell = config.serve_shell, "port claimed");

    let host = match Host::bootstrap(config).await {
        Ok(host) => host,
        Err(e) => {
            error!(error = %e, "failed to bootstrap host");
            return ExitCode::FAILURE;
        }
    };

    // Core builds ship no shards; downstream builds register theirs here.
    let registry = ShardRegistry::new();
    host.load_shards(&registry).await;

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "failed to install signal handler");
            return ExitCode::FAILURE;
        }
    };
    let mut sigint = match signal(SignalKind::interrupt()) {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "failed to install signal handler");
            return ExitCode::FAILURE;
        }
    };

    info!("host ready");
    println!("READY");

    tokio::select! {
        _ = sigterm.recv() => info!("received SIGTERM, shutting down"),
        _ = sigint.recv() => info!("received SIGINT, shutting down"),
    }

    host.shutdown().await;
    drop(listener);
    info!("arkhamd stopped");
    ExitCode::SUCCESS
}

/// Maximum log file size before rotation (10 MB).
const MAX_LOG_SIZE: u64 = 10 * 1024 * 1024;

/// Number of rotated log files to keep.
const MAX_ROTATED_LOGS: u32 = 3;

/// Shift `arkhamd.log` → `.1` → `.2` → `.3`, dropping the oldest.
/// Best-effort: rotation failures never block startup.
fn rotate_log_if_needed(log_path: &Path) {
    let size = match std::fs::metadata(log_path) {
        Ok(m) => m.len(),
        Err(_) => return,
    };
    if size < MAX_LOG_SIZE {
        return;
    }

    let log_str = log_path.display().to_string();
    for i in (1..MAX_ROTATED_LOGS).rev() {
        let from = format!("{log_str}.{i}");
        let to = format!("{log_str}.{}", i + 1);
        let _ = std::fs::rename(&from, &to);
    }
    let _ = std::fs::rename(log_path, format!("{log_str}.1"));
}

/// Marker written before tracing is up so failed startups are findable.
const STARTUP_MARKER_PREFIX: &str = "--- arkhamd: starting (pid: ";

fn write_startup_marker(config: &ConfigService) -> std::io::Result<()> {
    use std::io::Write;

    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(config.log_path())?;
    writeln!(file, "{}{}) ---\n", STARTUP_MARKER_PREFIX, std::process::id())
}

fn setup_logging(
    config: &ConfigService,
) -> Result<tracing_appender::non_blocking::WorkerGuard, HostError> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let log_path = config.log_path();
    let dir = log_path
        .parent()
        .ok_or_else(|| HostError::Config("log path has no parent".to_string()))?;
    let file_name = log_path
        .file_name()
        .ok_or_else(|| HostError::Config("log path has no file name".to_string()))?;

    let file_appender = tracing_appender::rolling::never(dir, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(non_blocking))
        .init();

    Ok(guard)
}
