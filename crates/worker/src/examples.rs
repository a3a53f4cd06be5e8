// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Example handlers for exercising the worker infrastructure.
//!
//! These demonstrate the handler pattern and back the built-in test pools;
//! real document handlers are registered by shards.

use crate::config::WorkerConfig;
use crate::handler::{HandlerError, JobHandler};
use arkham_core::JobId;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;

/// Echoes the payload back after an optional delay.
pub struct EchoHandler;

impl EchoHandler {
    /// Fast polling and a short idle timeout, matching its test-pool role.
    pub fn config() -> WorkerConfig {
        WorkerConfig {
            poll_interval: Duration::from_millis(500),
            idle_timeout: Duration::from_secs(30),
            ..WorkerConfig::named("EchoWorker")
        }
    }
}

#[async_trait]
impl JobHandler for EchoHandler {
    async fn process(&self, _job_id: &JobId, payload: Value) -> Result<Value, HandlerError> {
        let delay_ms = payload
            .get("delay_ms")
            .and_then(Value::as_u64)
            .unwrap_or(0);
        let message = payload
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("Hello from EchoWorker!")
            .to_string();

        if delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        }

        Ok(json!({
            "echoed": true,
            "message": message,
            "delay_ms": delay_ms,
        }))
    }
}

/// Always fails, for exercising retry and dead-letter paths.
pub struct FailHandler;

impl FailHandler {
    pub fn config() -> WorkerConfig {
        WorkerConfig {
            poll_interval: Duration::from_millis(500),
            idle_timeout: Duration::from_secs(30),
            max_retries: 2,
            ..WorkerConfig::named("FailWorker")
        }
    }
}

#[async_trait]
impl JobHandler for FailHandler {
    async fn process(&self, job_id: &JobId, _payload: Value) -> Result<Value, HandlerError> {
        Err(HandlerError(format!(
            "FailWorker intentionally failed (job {job_id})"
        )))
    }
}

/// Sleeps for a configurable time, for exercising job timeouts.
pub struct SleepHandler;

impl SleepHandler {
    pub fn config() -> WorkerConfig {
        WorkerConfig {
            job_timeout: Duration::from_secs(10),
            ..WorkerConfig::named("SlowWorker")
        }
    }
}

#[async_trait]
impl JobHandler for SleepHandler {
    async fn process(&self, _job_id: &JobId, payload: Value) -> Result<Value, HandlerError> {
        let sleep_ms = payload
            .get("sleep_ms")
            .and_then(Value::as_u64)
            .unwrap_or(5_000);
        tokio::time::sleep(Duration::from_millis(sleep_ms)).await;
        Ok(json!({ "slept_ms": sleep_ms }))
    }
}
