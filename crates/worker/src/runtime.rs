// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The worker main loop.
//!
//! A worker polls exactly one pool: register → poll → process → report,
//! with heartbeats in between. It exits on shutdown signal or idle timeout,
//! requeueing any in-flight job on the way out.

use crate::config::WorkerConfig;
use crate::handler::JobHandler;
use arkham_core::event::{names, QueueEvent};
use arkham_core::time::format_ts;
use arkham_core::worker::REGISTRY_TTL_SECS;
use arkham_core::{Job, JobId, JobStatus, WorkerId, WorkerState};
use arkham_substrate::{keys, Substrate, SubstrateError};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Errors that stop a worker.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error(transparent)]
    Substrate(#[from] SubstrateError),
}

/// A handler fault recorded in the worker's recent-error window.
#[derive(Debug, Clone)]
pub struct JobFault {
    pub job_id: JobId,
    pub error: String,
    pub at: DateTime<Utc>,
}

/// Counters reported with each heartbeat.
#[derive(Debug, Default, Clone)]
pub struct WorkerMetrics {
    pub jobs_completed: u64,
    pub jobs_failed: u64,
    pub total_processing: Duration,
    pub last_job_at: Option<DateTime<Utc>>,
    pub recent_errors: Vec<JobFault>,
}

const RECENT_ERROR_WINDOW: usize = 5;

impl WorkerMetrics {
    fn record_fault(&mut self, job_id: JobId, error: String) {
        self.jobs_failed += 1;
        self.recent_errors.push(JobFault { job_id, error, at: Utc::now() });
        if self.recent_errors.len() > RECENT_ERROR_WINDOW {
            self.recent_errors.remove(0);
        }
    }
}

/// A worker bound to one pool.
pub struct Worker {
    worker_id: WorkerId,
    pool: String,
    substrate: Arc<dyn Substrate>,
    handler: Arc<dyn JobHandler>,
    config: WorkerConfig,
    shutdown: CancellationToken,
    state: WorkerState,
    metrics: WorkerMetrics,
    current_job: Option<JobId>,
}

impl Worker {
    pub fn new(
        worker_id: WorkerId,
        pool: impl Into<String>,
        substrate: Arc<dyn Substrate>,
        handler: Arc<dyn JobHandler>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            worker_id,
            pool: pool.into(),
            substrate,
            handler,
            config,
            shutdown: CancellationToken::new(),
            state: WorkerState::Stopped,
            metrics: WorkerMetrics::default(),
            current_job: None,
        }
    }

    pub fn worker_id(&self) -> &WorkerId {
        &self.worker_id
    }

    /// Token that stops the loop. SIGTERM/SIGINT handlers cancel it; the
    /// worker finishes its current job first.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Run the worker until shutdown, idle timeout, or substrate loss.
    /// Returns the final state (`Stopped`, or `Error` on connect failure).
    pub async fn run(mut self) -> WorkerState {
        self.state = WorkerState::Starting;

        if let Err(error) = self.register().await {
            tracing::error!(worker_id = %self.worker_id, %error, "worker registration failed");
            self.state = WorkerState::Error;
            return self.state;
        }
        self.state = WorkerState::Idle;
        tracing::info!(worker_id = %self.worker_id, pool = %self.pool, "worker started");

        let mut last_heartbeat = Instant::now();
        let mut idle_since = Instant::now();

        while !self.shutdown.is_cancelled() {
            if last_heartbeat.elapsed() >= self.config.heartbeat_interval {
                if let Err(error) = self.heartbeat().await {
                    tracing::warn!(worker_id = %self.worker_id, %error, "heartbeat failed");
                }
                last_heartbeat = Instant::now();
            }

            match self.dequeue_job().await {
                Ok(Some(job)) => {
                    idle_since = Instant::now();
                    self.process(job).await;
                }
                Ok(None) => {
                    if idle_since.elapsed() >= self.config.idle_timeout {
                        tracing::info!(
                            worker_id = %self.worker_id,
                            idle_secs = idle_since.elapsed().as_secs(),
                            "idle timeout, shutting down"
                        );
                        break;
                    }
                    tokio::select! {
                        _ = self.shutdown.cancelled() => break,
                        _ = tokio::time::sleep(self.config.poll_interval) => {}
                    }
                }
                Err(error) => {
                    tracing::error!(worker_id = %self.worker_id, %error, "queue poll failed");
                    self.state = WorkerState::Error;
                    break;
                }
            }
        }

        self.finish().await
    }

    /// Write the initial registry record and join the pool set.
    async fn register(&mut self) -> Result<(), WorkerError> {
        let fields = HashMap::from([
            ("pool".to_string(), self.pool.clone()),
            ("name".to_string(), self.config.name.clone()),
            ("state".to_string(), WorkerState::Starting.to_string()),
            ("started_at".to_string(), format_ts(Utc::now())),
            ("pid".to_string(), std::process::id().to_string()),
        ]);
        self.substrate
            .registry_put(self.worker_id.as_str(), fields, REGISTRY_TTL_SECS)
            .await?;
        self.substrate
            .pool_member_add(&self.pool, self.worker_id.as_str())
            .await?;
        Ok(())
    }

    /// Refresh the registry record (state, counters, TTL).
    async fn heartbeat(&mut self) -> Result<(), WorkerError> {
        let fields = HashMap::from([
            ("state".to_string(), self.state.to_string()),
            ("last_heartbeat".to_string(), format_ts(Utc::now())),
            (
                "jobs_completed".to_string(),
                self.metrics.jobs_completed.to_string(),
            ),
            ("jobs_failed".to_string(), self.metrics.jobs_failed.to_string()),
            (
                "current_job".to_string(),
                self.current_job
                    .as_ref()
                    .map(|j| j.to_string())
                    .unwrap_or_default(),
            ),
        ]);
        self.substrate
            .registry_put(self.worker_id.as_str(), fields, REGISTRY_TTL_SECS)
            .await?;
        Ok(())
    }

    /// Pop the highest-priority job and mark it active.
    async fn dequeue_job(&mut self) -> Result<Option<Job>, WorkerError> {
        let Some(job_id) = self.substrate.priority_pop(&self.pool).await? else {
            return Ok(None);
        };

        let Some(fields) = self.substrate.job_get(&job_id).await? else {
            tracing::warn!(job_id, "popped job has no hash, dropping");
            return Ok(None);
        };

        let job = match Job::from_fields(JobId::new(job_id.clone()), &fields) {
            Ok(job) => job,
            Err(error) => {
                tracing::warn!(job_id, %error, "popped job hash undecodable, dropping");
                return Ok(None);
            }
        };

        // Cancellation may have landed between push and pop.
        if job.status == JobStatus::Cancelled {
            tracing::info!(job_id, "skipping cancelled job");
            return Ok(None);
        }

        self.substrate
            .job_put(
                &job_id,
                HashMap::from([
                    ("status".to_string(), JobStatus::Active.to_string()),
                    ("worker_id".to_string(), self.worker_id.to_string()),
                    ("started_at".to_string(), format_ts(Utc::now())),
                ]),
            )
            .await?;

        Ok(Some(job))
    }

    /// Run one job through the handler with the configured deadline.
    async fn process(&mut self, job: Job) {
        self.state = WorkerState::Processing;
        self.current_job = Some(job.id.clone());
        tracing::info!(worker_id = %self.worker_id, job_id = %job.id, "processing job");

        let started = Instant::now();
        let outcome = tokio::time::timeout(
            self.config.job_timeout,
            self.handler.process(&job.id, job.payload.clone()),
        )
        .await;

        let elapsed = started.elapsed();
        match outcome {
            Ok(Ok(result)) => {
                if let Err(error) = self.complete_job(&job, result).await {
                    tracing::error!(job_id = %job.id, %error, "failed to record completion");
                } else {
                    self.metrics.jobs_completed += 1;
                    self.metrics.total_processing += elapsed;
                    self.metrics.last_job_at = Some(Utc::now());
                    tracing::info!(
                        worker_id = %self.worker_id,
                        job_id = %job.id,
                        elapsed_ms = elapsed.as_millis() as u64,
                        "job completed"
                    );
                }
            }
            Ok(Err(handler_error)) => {
                let message = handler_error.to_string();
                tracing::error!(worker_id = %self.worker_id, job_id = %job.id, error = %message, "job failed");
                if let Err(error) = self.fail_job(&job, &message, true).await {
                    tracing::error!(job_id = %job.id, %error, "failed to record failure");
                }
                self.metrics.record_fault(job.id.clone(), message);
            }
            Err(_elapsed) => {
                let message = format!(
                    "Job {} timed out after {}s",
                    job.id,
                    self.config.job_timeout.as_secs()
                );
                tracing::error!(worker_id = %self.worker_id, job_id = %job.id, error = %message, "job timed out");
                if let Err(error) = self.fail_job(&job, &message, true).await {
                    tracing::error!(job_id = %job.id, %error, "failed to record timeout");
                }
                self.metrics.record_fault(job.id.clone(), message);
            }
        }

        self.current_job = None;
        self.state = WorkerState::Idle;
    }

    /// True when the dispatcher cancelled the job while we were processing.
    /// The terminal write is skipped in that case.
    async fn was_cancelled(&self, job_id: &JobId) -> bool {
        match self.substrate.job_get(job_id.as_str()).await {
            Ok(Some(fields)) => fields.get("status").map(String::as_str) == Some("cancelled"),
            _ => false,
        }
    }

    /// Persist completion and publish `worker.job.completed`.
    async fn complete_job(&self, job: &Job, result: Value) -> Result<(), WorkerError> {
        if self.was_cancelled(&job.id).await {
            tracing::info!(job_id = %job.id, "job cancelled mid-flight, skipping completion write");
            return Ok(());
        }

        self.substrate
            .job_put(
                job.id.as_str(),
                HashMap::from([
                    ("status".to_string(), JobStatus::Completed.to_string()),
                    ("completed_at".to_string(), format_ts(Utc::now())),
                    ("result".to_string(), result.to_string()),
                ]),
            )
            .await?;

        let mut event = QueueEvent::new(names::WORKER_JOB_COMPLETED);
        event.job_id = Some(job.id.to_string());
        event.worker_id = Some(self.worker_id.to_string());
        event.pool = Some(self.pool.clone());
        event.result = Some(result);
        event.trace_id = payload_trace_id(&job.payload);
        self.publish(&event).await
    }

    /// Record a failed attempt: requeue with degraded priority while retries
    /// remain, otherwise dead-letter and publish `worker.job.failed`.
    async fn fail_job(&self, job: &Job, error: &str, requeue: bool) -> Result<(), WorkerError> {
        if self.was_cancelled(&job.id).await {
            tracing::info!(job_id = %job.id, "job cancelled mid-flight, skipping failure write");
            return Ok(());
        }

        if requeue {
            let retry_count = match self.substrate.job_get(job.id.as_str()).await? {
                Some(fields) => fields
                    .get("retry_count")
                    .and_then(|s| s.parse::<u32>().ok())
                    .unwrap_or(0),
                None => 0,
            };

            if retry_count < self.config.max_retries {
                self.substrate
                    .job_put(
                        job.id.as_str(),
                        HashMap::from([
                            ("status".to_string(), JobStatus::Pending.to_string()),
                            ("retry_count".to_string(), (retry_count + 1).to_string()),
                            ("last_error".to_string(), error.to_string()),
                        ]),
                    )
                    .await?;
                // Degrade priority: retries queue behind fresh work.
                self.substrate
                    .priority_push(&self.pool, job.id.as_str(), (10 + retry_count) as f64)
                    .await?;
                tracing::info!(job_id = %job.id, retry = retry_count + 1, "requeued job");
                return Ok(());
            }
        }

        self.substrate
            .job_put(
                job.id.as_str(),
                HashMap::from([
                    ("status".to_string(), JobStatus::Failed.to_string()),
                    ("completed_at".to_string(), format_ts(Utc::now())),
                    ("error".to_string(), error.to_string()),
                ]),
            )
            .await?;
        self.substrate
            .dead_letter_push(&self.pool, job.id.as_str())
            .await?;

        let mut event = QueueEvent::new(names::WORKER_JOB_FAILED);
        event.job_id = Some(job.id.to_string());
        event.worker_id = Some(self.worker_id.to_string());
        event.pool = Some(self.pool.clone());
        event.error = Some(error.to_string());
        event.trace_id = payload_trace_id(&job.payload);
        self.publish(&event).await
    }

    async fn publish(&self, event: &QueueEvent) -> Result<(), WorkerError> {
        let payload = serde_json::to_string(event)
            .map_err(|e| SubstrateError::Protocol(format!("event encode failed: {e}")))?;
        self.substrate
            .publish(keys::EVENTS_CHANNEL, &payload)
            .await?;
        Ok(())
    }

    /// Shutdown path: requeue any in-flight job, deregister, stop.
    async fn finish(mut self) -> WorkerState {
        let had_error = self.state == WorkerState::Error;
        self.state = WorkerState::Stopping;
        tracing::info!(worker_id = %self.worker_id, "worker shutting down");

        if let Some(job_id) = self.current_job.take() {
            tracing::warn!(worker_id = %self.worker_id, job_id = %job_id, "requeueing incomplete job");
            if let Ok(Some(fields)) = self.substrate.job_get(job_id.as_str()).await {
                if let Ok(job) = Job::from_fields(job_id, &fields) {
                    if let Err(error) = self
                        .fail_job(&job, "Worker shutdown while processing", true)
                        .await
                    {
                        tracing::error!(%error, "failed to requeue in-flight job");
                    }
                }
            }
        }

        if let Err(error) = self.substrate.registry_delete(self.worker_id.as_str()).await {
            tracing::warn!(%error, "deregistration failed");
        }
        if let Err(error) = self
            .substrate
            .pool_member_remove(&self.pool, self.worker_id.as_str())
            .await
        {
            tracing::warn!(%error, "pool membership removal failed");
        }

        self.state = if had_error {
            WorkerState::Error
        } else {
            WorkerState::Stopped
        };
        tracing::info!(worker_id = %self.worker_id, state = %self.state, "worker stopped");
        self.state
    }
}

fn payload_trace_id(payload: &Value) -> Option<String> {
    payload
        .get("trace_id")
        .and_then(Value::as_str)
        .map(String::from)
}

#[cfg(test)]
#[path = "runtime_tests.rs"]
mod tests;
