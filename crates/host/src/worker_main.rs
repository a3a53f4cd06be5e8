// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker-mode entry: `arkhamd worker --pool P [--worker-id W]`.
//!
//! A worker process rebuilds the handler registry from the built-in
//! handlers plus the worker specs declared by registered shards, connects
//! its own substrate client, and runs the worker loop until SIGTERM/SIGINT
//! or idle timeout.

use crate::error::HostError;
use crate::shard::{ShardRegistry, WorkerSpec};
use arkham_engine::launcher::SUBSTRATE_URL_ENV;
use arkham_substrate::RedisSubstrate;
use arkham_worker::examples::{EchoHandler, SleepHandler};
use arkham_worker::{HandlerRegistry, Worker};
use arkham_core::{WorkerId, WorkerState};
use std::sync::Arc;

/// Handlers shipped with the host itself. Shards provide the real document
/// handlers; these back the built-in test pools.
pub fn builtin_worker_specs() -> Vec<WorkerSpec> {
    vec![
        WorkerSpec {
            pool: "cpu-light".to_string(),
            handler: Arc::new(EchoHandler),
            config: EchoHandler::config(),
        },
        WorkerSpec {
            pool: "cpu-heavy".to_string(),
            handler: Arc::new(SleepHandler),
            config: SleepHandler::config(),
        },
    ]
}

/// Assemble the worker-side handler registry: built-ins plus shard specs.
pub fn assemble_registry(shards: &ShardRegistry) -> HandlerRegistry {
    let registry = HandlerRegistry::new();
    for spec in builtin_worker_specs() {
        registry.register_with_config(spec.pool, spec.handler, spec.config);
    }
    for spec in shards.worker_specs() {
        registry.register_with_config(spec.pool, spec.handler, spec.config);
    }
    registry
}

/// Run a worker for `pool` until it stops. Returns the final worker state.
pub async fn run(
    pool: &str,
    worker_id: Option<String>,
    shards: &ShardRegistry,
) -> Result<WorkerState, HostError> {
    let substrate_url = std::env::var(SUBSTRATE_URL_ENV)
        .or_else(|_| std::env::var("REDIS_URL"))
        .unwrap_or_else(|_| crate::config::DEFAULT_SUBSTRATE_URL.to_string());

    let registry = assemble_registry(shards);
    let handler = registry
        .handler(pool)
        .ok_or_else(|| HostError::HandlerMissing(pool.to_string()))?;
    let config = registry.config(pool).unwrap_or_default();

    let substrate = Arc::new(RedisSubstrate::connect(&substrate_url).await?);
    let worker_id = match worker_id {
        Some(id) => WorkerId::new(id),
        None => WorkerId::generate(pool),
    };

    let worker = Worker::new(worker_id, pool, substrate, handler, config);
    let token = worker.shutdown_token();

    // Finish the current job on SIGTERM/SIGINT, then exit.
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
    let mut sigint = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt())?;
    tokio::spawn(async move {
        tokio::select! {
            _ = sigterm.recv() => tracing::info!("received SIGTERM"),
            _ = sigint.recv() => tracing::info!("received SIGINT"),
        }
        token.cancel();
    });

    Ok(worker.run().await)
}

impl ShardRegistry {
    /// Worker specs from every registered shard, without initialising them.
    /// Worker processes only need the handler code, not live services.
    pub fn worker_specs(&self) -> Vec<WorkerSpec> {
        self.instantiate_all()
            .into_iter()
            .flat_map(|shard| shard.worker_specs())
            .collect()
    }
}

#[cfg(test)]
#[path = "worker_main_tests.rs"]
mod tests;
