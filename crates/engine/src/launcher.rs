// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker launching seam.
//!
//! Production workers run as separate OS processes spawned from the current
//! executable's `worker` mode (crash isolation and memory boundaries for
//! model-heavy handlers). Tests use [`LocalLauncher`] to run the worker
//! runtime as an in-process task against a shared substrate.

use crate::error::EngineError;
use arkham_core::{WorkerId, WorkerState};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;

/// Environment variable carrying the substrate endpoint to worker processes.
pub const SUBSTRATE_URL_ENV: &str = "ARKHAM_SUBSTRATE_URL";

enum HandleBackend {
    /// A spawned `arkhamd worker …` child process.
    Process(Child),
    /// An in-process worker task (test mode).
    Task {
        token: CancellationToken,
        join: tokio::task::JoinHandle<WorkerState>,
    },
}

/// A launched worker owned by the dispatcher.
pub struct WorkerHandle {
    pub worker_id: WorkerId,
    pub pool: String,
    pub pid: Option<u32>,
    pub started_at: DateTime<Utc>,
    backend: HandleBackend,
}

impl WorkerHandle {
    pub fn from_child(worker_id: WorkerId, pool: impl Into<String>, child: Child) -> Self {
        Self {
            worker_id,
            pool: pool.into(),
            pid: child.id(),
            started_at: Utc::now(),
            backend: HandleBackend::Process(child),
        }
    }

    pub fn from_task(
        worker_id: WorkerId,
        pool: impl Into<String>,
        token: CancellationToken,
        join: tokio::task::JoinHandle<WorkerState>,
    ) -> Self {
        Self {
            worker_id,
            pool: pool.into(),
            pid: None,
            started_at: Utc::now(),
            backend: HandleBackend::Task { token, join },
        }
    }

    /// Whether the worker is still running. Reaps exited children.
    pub fn is_alive(&mut self) -> bool {
        match &mut self.backend {
            HandleBackend::Process(child) => matches!(child.try_wait(), Ok(None)),
            HandleBackend::Task { join, .. } => !join.is_finished(),
        }
    }

    /// Ask the worker to stop: SIGTERM for processes (the worker finishes
    /// its current job first), cancellation for tasks.
    pub fn terminate(&mut self) {
        match &mut self.backend {
            HandleBackend::Process(child) => {
                if let Some(pid) = child.id() {
                    let _ = nix::sys::signal::kill(
                        nix::unistd::Pid::from_raw(pid as i32),
                        nix::sys::signal::Signal::SIGTERM,
                    );
                }
            }
            HandleBackend::Task { token, .. } => token.cancel(),
        }
    }

    /// Terminate, wait up to `grace`, then force-kill. Returns true when the
    /// worker exited within the grace window.
    pub async fn shutdown(mut self, grace: Duration) -> bool {
        self.terminate();
        match self.backend {
            HandleBackend::Process(mut child) => {
                match tokio::time::timeout(grace, child.wait()).await {
                    Ok(_) => true,
                    Err(_elapsed) => {
                        tracing::warn!(worker_id = %self.worker_id, "force killing worker");
                        let _ = child.kill().await;
                        false
                    }
                }
            }
            HandleBackend::Task { mut join, .. } => {
                match tokio::time::timeout(grace, &mut join).await {
                    Ok(_) => true,
                    Err(_elapsed) => {
                        tracing::warn!(worker_id = %self.worker_id, "aborting worker task");
                        join.abort();
                        false
                    }
                }
            }
        }
    }
}

/// Materialises workers for the dispatcher.
#[async_trait]
pub trait WorkerLauncher: Send + Sync {
    async fn launch(&self, pool: &str, worker_id: &WorkerId) -> Result<WorkerHandle, EngineError>;
}

/// Spawns workers as child processes of the current executable.
pub struct ProcessLauncher {
    substrate_url: String,
}

impl ProcessLauncher {
    pub fn new(substrate_url: impl Into<String>) -> Self {
        Self { substrate_url: substrate_url.into() }
    }
}

#[async_trait]
impl WorkerLauncher for ProcessLauncher {
    async fn launch(&self, pool: &str, worker_id: &WorkerId) -> Result<WorkerHandle, EngineError> {
        let exe = std::env::current_exe().map_err(|e| EngineError::SpawnFailed {
            pool: pool.to_string(),
            message: format!("cannot resolve current executable: {e}"),
        })?;

        let child = Command::new(exe)
            .arg("worker")
            .arg("--pool")
            .arg(pool)
            .arg("--worker-id")
            .arg(worker_id.as_str())
            .env(SUBSTRATE_URL_ENV, &self.substrate_url)
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| EngineError::SpawnFailed {
                pool: pool.to_string(),
                message: e.to_string(),
            })?;

        tracing::info!(worker_id = %worker_id, pool, pid = child.id(), "spawned worker process");
        Ok(WorkerHandle::from_child(worker_id.clone(), pool, child))
    }
}

/// Runs workers as in-process tasks against a shared substrate (tests).
#[cfg(any(test, feature = "test-support"))]
pub struct LocalLauncher {
    substrate: std::sync::Arc<dyn arkham_substrate::Substrate>,
    handlers: arkham_worker::HandlerRegistry,
}

#[cfg(any(test, feature = "test-support"))]
impl LocalLauncher {
    pub fn new(
        substrate: std::sync::Arc<dyn arkham_substrate::Substrate>,
        handlers: arkham_worker::HandlerRegistry,
    ) -> Self {
        Self { substrate, handlers }
    }
}

#[cfg(any(test, feature = "test-support"))]
#[async_trait]
impl WorkerLauncher for LocalLauncher {
    async fn launch(&self, pool: &str, worker_id: &WorkerId) -> Result<WorkerHandle, EngineError> {
        let handler = self
            .handlers
            .handler(pool)
            .ok_or_else(|| EngineError::HandlerMissing(pool.to_string()))?;
        let config = self
            .handlers
            .config(pool)
            .unwrap_or_default();

        let worker = arkham_worker::Worker::new(
            worker_id.clone(),
            pool,
            std::sync::Arc::clone(&self.substrate),
            handler,
            config,
        );
        let token = worker.shutdown_token();
        let join = tokio::spawn(worker.run());
        Ok(WorkerHandle::from_task(worker_id.clone(), pool, token, join))
    }
}
