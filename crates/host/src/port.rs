// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Port claiming for the external HTTP collaborator.
//!
//! The host binds the configured port at startup and holds the listener
//! for the router to take over. When the port is already held, the default
//! is to exit non-zero; with `force_port_kill` the holder is sent SIGTERM
//! and the bind is retried.

use crate::error::HostError;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::process::Command;

/// How long to wait for `lsof` when looking up the port holder.
const LSOF_TIMEOUT: Duration = Duration::from_secs(5);

/// How long to retry the bind after killing the holder.
const PREEMPT_WINDOW: Duration = Duration::from_secs(5);

/// Run a subprocess command with a timeout.
async fn run_with_timeout(
    mut cmd: Command,
    timeout: Duration,
    description: &str,
) -> Result<std::process::Output, String> {
    match tokio::time::timeout(timeout, cmd.output()).await {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(io_err)) => Err(format!("{} failed: {}", description, io_err)),
        Err(_elapsed) => Err(format!(
            "{} timed out after {}s",
            description,
            timeout.as_secs()
        )),
    }
}

/// Pids of processes listening on the TCP port.
async fn port_holders(port: u16) -> Vec<i32> {
    let mut cmd = Command::new("lsof");
    cmd.arg("-t").arg("-i").arg(format!("tcp:{port}"));

    match run_with_timeout(cmd, LSOF_TIMEOUT, "lsof").await {
        Ok(output) => String::from_utf8_lossy(&output.stdout)
            .lines()
            .filter_map(|line| line.trim().parse().ok())
            .collect(),
        Err(error) => {
            tracing::warn!(error, "could not identify port holder");
            Vec::new()
        }
    }
}

/// Bind the port, optionally preempting whatever currently holds it.
pub async fn claim(port: u16, force_kill: bool) -> Result<TcpListener, HostError> {
    match TcpListener::bind(("0.0.0.0", port)).await {
        Ok(listener) => return Ok(listener),
        Err(error) if error.kind() == std::io::ErrorKind::AddrInUse => {
            if !force_kill {
                return Err(HostError::PortInUse(port));
            }
            tracing::warn!(port, "port in use, preempting holder");
        }
        Err(error) => return Err(error.into()),
    }

    for pid in port_holders(port).await {
        tracing::warn!(pid, port, "sending SIGTERM to port holder");
        let _ = nix::sys::signal::kill(
            nix::unistd::Pid::from_raw(pid),
            nix::sys::signal::Signal::SIGTERM,
        );
    }

    let deadline = tokio::time::Instant::now() + PREEMPT_WINDOW;
    loop {
        tokio::time::sleep(Duration::from_millis(250)).await;
        match TcpListener::bind(("0.0.0.0", port)).await {
            Ok(listener) => return Ok(listener),
            Err(_) if tokio::time::Instant::now() < deadline => continue,
            Err(_) => return Err(HostError::PortInUse(port)),
        }
    }
}

#[cfg(test)]
#[path = "port_tests.rs"]
mod tests;
