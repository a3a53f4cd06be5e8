// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The worker service: process-wide job dispatch coordinator.
//!
//! Owns the in-memory job tracker, the pool table, worker process handles,
//! and auto-scaling. Jobs live in the substrate (hash + sorted set); workers
//! in separate processes pop and execute them; the pub/sub bridge feeds
//! their terminal events back into the tracker and the event bus.
//!
//! With no substrate the service degrades to in-memory tracking: `enqueue`
//! still records jobs locally but no worker can dequeue them.

use crate::error::EngineError;
use crate::launcher::{WorkerHandle, WorkerLauncher};
use arkham_core::event::{names, QueueEvent};
use arkham_core::time::format_ts;
use arkham_core::trace::current_trace_id;
use arkham_core::{Job, JobId, JobStatus, PoolKind, PoolTable, WorkerId};
use arkham_events::EventBus;
use arkham_substrate::Substrate;
use arkham_worker::{HandlerRegistry, JobHandler, WorkerConfig};
use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Dispatcher tuning knobs.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Substrate endpoint handed to spawned worker processes.
    pub substrate_url: String,
    /// Poll interval for `wait_for_result`.
    pub wait_poll_interval: Duration,
    /// Default `enqueue_and_wait` timeout.
    pub default_wait_timeout: Duration,
    /// Per-worker terminate→kill grace.
    pub stop_grace: Duration,
    /// Whole-service shutdown grace.
    pub shutdown_grace: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            substrate_url: "redis://localhost:6379".to_string(),
            wait_poll_interval: Duration::from_millis(500),
            default_wait_timeout: Duration::from_secs(300),
            stop_grace: Duration::from_secs(5),
            shutdown_grace: Duration::from_secs(30),
        }
    }
}

/// Result of a `scale` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScaleOutcome {
    pub pool: String,
    pub previous: usize,
    pub target: usize,
    pub current: usize,
}

/// Result of a `start_worker` call. Handler absence and pool saturation are
/// failure results, not errors.
#[derive(Debug, Clone)]
pub enum StartOutcome {
    Started { worker_id: WorkerId, pid: Option<u32> },
    Failed { reason: String },
}

impl StartOutcome {
    pub fn is_started(&self) -> bool {
        matches!(self, StartOutcome::Started { .. })
    }
}

/// Per-pool queue statistics assembled from the substrate and the tracker.
#[derive(Debug, Clone, serde::Serialize)]
pub struct QueueStats {
    pub pool: String,
    pub kind: PoolKind,
    pub max_workers: usize,
    pub pending: u64,
    pub active: usize,
    pub completed: usize,
    pub failed: usize,
}

/// Static + live pool information.
#[derive(Debug, Clone, serde::Serialize)]
pub struct PoolInfo {
    pub pool: String,
    pub kind: PoolKind,
    pub max_workers: usize,
    pub vram_mb: Option<u32>,
    pub current_workers: usize,
    pub target_workers: usize,
}

/// The process-wide dispatcher.
pub struct WorkerService {
    config: ServiceConfig,
    substrate: Option<Arc<dyn Substrate>>,
    events: Arc<EventBus>,
    handlers: HandlerRegistry,
    launcher: Arc<dyn WorkerLauncher>,
    pools: RwLock<PoolTable>,
    jobs: Mutex<HashMap<JobId, Job>>,
    handles: Mutex<HashMap<WorkerId, WorkerHandle>>,
    target_counts: Mutex<HashMap<String, usize>>,
    bridge_token: Mutex<Option<CancellationToken>>,
}

impl WorkerService {
    pub fn new(
        config: ServiceConfig,
        substrate: Option<Arc<dyn Substrate>>,
        events: Arc<EventBus>,
        handlers: HandlerRegistry,
        launcher: Arc<dyn WorkerLauncher>,
    ) -> Self {
        if substrate.is_none() {
            tracing::warn!("substrate unavailable, dispatcher degraded to in-memory tracking");
        }
        Self {
            config,
            substrate,
            events,
            handlers,
            launcher,
            pools: RwLock::new(PoolTable::builtin()),
            jobs: Mutex::new(HashMap::new()),
            handles: Mutex::new(HashMap::new()),
            target_counts: Mutex::new(HashMap::new()),
            bridge_token: Mutex::new(None),
        }
    }

    /// Whether the substrate is reachable (non-degraded mode).
    pub fn is_available(&self) -> bool {
        self.substrate.is_some()
    }

    pub fn substrate(&self) -> Option<Arc<dyn Substrate>> {
        self.substrate.clone()
    }

    pub fn events(&self) -> Arc<EventBus> {
        Arc::clone(&self.events)
    }

    pub fn handlers(&self) -> &HandlerRegistry {
        &self.handlers
    }

    /// Start the pub/sub bridge task. No-op in degraded mode.
    pub fn start_bridge(self: &Arc<Self>) {
        if self.substrate.is_none() {
            return;
        }
        let token = CancellationToken::new();
        *self.bridge_token.lock() = Some(token.clone());
        let service = Arc::clone(self);
        tokio::spawn(crate::bridge::run(service, token));
    }

    // --- Registration ---

    /// Register a worker implementation for a pool, with its worker
    /// configuration. Unknown pools are added to the table as custom pools.
    pub fn register_worker(
        &self,
        pool: &str,
        handler: Arc<dyn JobHandler>,
        config: WorkerConfig,
    ) {
        {
            let mut pools = self.pools.write();
            if !pools.contains(pool) {
                tracing::warn!(pool, "pool not in predefined table, adding dynamically");
                pools.add_custom(pool);
            }
        }
        self.handlers.register_with_config(pool, handler, config);
    }

    /// Register a handler with default worker configuration.
    pub fn register_handler(&self, pool: &str, handler: Arc<dyn JobHandler>) {
        self.register_worker(pool, handler, WorkerConfig::default());
    }

    // --- Job queuing ---

    /// Enqueue a job to a worker pool and ensure a worker exists for it.
    pub async fn enqueue(
        &self,
        pool: &str,
        job_id: impl Into<JobId>,
        payload: Value,
        priority: i64,
    ) -> Result<Job, EngineError> {
        if !self.pools.read().contains(pool) {
            return Err(EngineError::UnknownPool(pool.to_string()));
        }

        // Carry the ambient trace id across the process boundary.
        let mut payload = payload;
        if let Some(trace_id) = current_trace_id() {
            if let Value::Object(map) = &mut payload {
                map.entry("trace_id".to_string())
                    .or_insert_with(|| Value::String(trace_id));
            }
        }

        let job_id = job_id.into();
        let job = Job::new(job_id.clone(), pool, payload, priority, Utc::now());
        self.jobs.lock().insert(job_id.clone(), job.clone());

        if let Some(substrate) = &self.substrate {
            substrate
                .priority_push(pool, job_id.as_str(), priority as f64)
                .await?;
            substrate.job_put(job_id.as_str(), job.to_fields()).await?;
            tracing::debug!(job_id = %job_id, pool, priority, "enqueued job");
        } else {
            tracing::warn!(job_id = %job_id, "substrate unavailable, job tracked in memory only");
        }

        self.ensure_worker_for_pool(pool).await;

        Ok(job)
    }

    /// Pop the highest-priority job from a pool and mark it active.
    ///
    /// Coordinator-side dequeue helper; workers normally dequeue for
    /// themselves inside their own process.
    pub async fn dequeue(&self, pool: &str) -> Result<Option<Job>, EngineError> {
        let Some(substrate) = &self.substrate else {
            return Ok(None);
        };
        let Some(job_id) = substrate.priority_pop(pool).await? else {
            return Ok(None);
        };
        let Some(fields) = substrate.job_get(&job_id).await? else {
            return Ok(None);
        };

        let mut job = match Job::from_fields(JobId::new(job_id.clone()), &fields) {
            Ok(job) => job,
            Err(error) => {
                tracing::warn!(job_id, %error, "popped job hash undecodable");
                return Ok(None);
            }
        };
        job.status = JobStatus::Active;
        job.started_at = Some(Utc::now());

        substrate
            .job_put(
                &job_id,
                HashMap::from([
                    ("status".to_string(), JobStatus::Active.to_string()),
                    ("started_at".to_string(), format_ts(Utc::now())),
                ]),
            )
            .await?;
        self.jobs.lock().insert(job.id.clone(), job.clone());
        Ok(Some(job))
    }

    /// Enqueue with a generated id and wait for the result.
    pub async fn enqueue_and_wait(
        &self,
        pool: &str,
        payload: Value,
        priority: i64,
        timeout: Option<Duration>,
    ) -> Result<Value, EngineError> {
        let job_id = JobId::new(uuid::Uuid::new_v4().to_string());
        self.enqueue(pool, job_id.clone(), payload, priority).await?;
        self.wait_for_result(&job_id, timeout.unwrap_or(self.config.default_wait_timeout))
            .await
    }

    /// Poll until the job reaches a terminal state or the timeout expires.
    /// A timeout surfaces to the caller but does not cancel the job.
    pub async fn wait_for_result(
        &self,
        job_id: &JobId,
        timeout: Duration,
    ) -> Result<Value, EngineError> {
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            if let Some(job) = self.jobs.lock().get(job_id) {
                match job.status {
                    JobStatus::Completed => {
                        return Ok(job.result.clone().unwrap_or_else(|| json!({})));
                    }
                    JobStatus::Failed => {
                        return Err(EngineError::JobFailed {
                            job_id: job_id.to_string(),
                            error: job
                                .error
                                .clone()
                                .unwrap_or_else(|| "Unknown error".to_string()),
                        });
                    }
                    JobStatus::Cancelled => {
                        return Err(EngineError::JobCancelled(job_id.to_string()));
                    }
                    JobStatus::Pending | JobStatus::Active => {}
                }
            }

            // The bridge usually updates the tracker first, but check the
            // substrate too so waits survive a lost bridge message.
            if let Some(substrate) = &self.substrate {
                if let Some(fields) = substrate.job_get(job_id.as_str()).await? {
                    match fields.get("status").map(String::as_str) {
                        Some("completed") => {
                            let result = fields
                                .get("result")
                                .and_then(|raw| serde_json::from_str(raw).ok())
                                .unwrap_or_else(|| json!({}));
                            return Ok(result);
                        }
                        Some("failed") => {
                            return Err(EngineError::JobFailed {
                                job_id: job_id.to_string(),
                                error: fields
                                    .get("error")
                                    .cloned()
                                    .unwrap_or_else(|| "Unknown error".to_string()),
                            });
                        }
                        Some("cancelled") => {
                            return Err(EngineError::JobCancelled(job_id.to_string()));
                        }
                        _ => {}
                    }
                }
            }

            if tokio::time::Instant::now() >= deadline {
                return Err(EngineError::WaitTimeout {
                    job_id: job_id.to_string(),
                    timeout_secs: timeout.as_secs(),
                });
            }
            tokio::time::sleep(self.config.wait_poll_interval).await;
        }
    }

    // --- Auto-scaling & worker lifecycle ---

    /// Spawn one worker when the pool has none and a handler is registered.
    async fn ensure_worker_for_pool(&self, pool: &str) {
        if self.get_worker_count(pool) > 0 {
            return;
        }
        if !self.handlers.contains(pool) {
            tracing::debug!(pool, "no handler registered, skipping auto-scale");
            return;
        }

        tracing::info!(pool, "auto-scaling: spawning worker");
        if let Err(error) = self.scale(pool, 1).await {
            tracing::warn!(pool, %error, "auto-scale failed");
        }
    }

    /// Scale the pool toward `count` workers (clipped to the pool cap).
    pub async fn scale(&self, pool: &str, count: usize) -> Result<ScaleOutcome, EngineError> {
        let max_workers = self
            .pools
            .read()
            .get(pool)
            .map(|spec| spec.max_workers)
            .ok_or_else(|| EngineError::UnknownPool(pool.to_string()))?;

        let mut target = count;
        if target > max_workers {
            // Soft cap: clip and log rather than fail.
            tracing::warn!(pool, requested = count, max_workers, "clipping scale request");
            target = max_workers;
        }

        let previous = {
            let mut targets = self.target_counts.lock();
            let previous = targets.get(pool).copied().unwrap_or(0);
            targets.insert(pool.to_string(), target);
            previous
        };

        let current = self.get_worker_count(pool);
        if target > current {
            for _ in 0..(target - current) {
                let outcome = self.start_worker(pool).await?;
                if let StartOutcome::Failed { reason } = outcome {
                    tracing::warn!(pool, reason, "scale-up stopped early");
                    break;
                }
            }
        } else if target < current {
            let excess: Vec<WorkerId> = {
                let handles = self.handles.lock();
                handles
                    .values()
                    .filter(|h| h.pool == pool)
                    .skip(target)
                    .map(|h| h.worker_id.clone())
                    .collect()
            };
            for worker_id in excess {
                self.stop_worker(&worker_id).await?;
            }
        }

        let current = self.get_worker_count(pool);
        tracing::info!(pool, previous, target, current, "scaled pool");

        self.events
            .emit(
                names::WORKER_POOL_SCALED,
                json!({"pool": pool, "old_count": previous, "new_count": target}),
                "worker-service",
            )
            .await;

        Ok(ScaleOutcome { pool: pool.to_string(), previous, target, current })
    }

    /// Start one worker for a pool.
    pub async fn start_worker(&self, pool: &str) -> Result<StartOutcome, EngineError> {
        if !self.pools.read().contains(pool) {
            return Ok(StartOutcome::Failed { reason: format!("Unknown pool: {pool}") });
        }
        if !self.handlers.contains(pool) {
            return Ok(StartOutcome::Failed {
                reason: format!("No worker implementation for pool {pool}"),
            });
        }

        let max_workers = self
            .pools
            .read()
            .get(pool)
            .map(|spec| spec.max_workers)
            .unwrap_or(0);
        let current = self.get_worker_count(pool);
        if current >= max_workers {
            return Ok(StartOutcome::Failed {
                reason: format!("Pool {pool} already at max workers ({max_workers})"),
            });
        }

        let worker_id = WorkerId::generate(pool);
        let handle = match self.launcher.launch(pool, &worker_id).await {
            Ok(handle) => handle,
            Err(error) => {
                tracing::error!(pool, %error, "worker launch failed");
                return Ok(StartOutcome::Failed { reason: error.to_string() });
            }
        };
        let pid = handle.pid;
        self.handles.lock().insert(worker_id.clone(), handle);

        tracing::info!(worker_id = %worker_id, pool, ?pid, "started worker");
        self.events
            .emit(
                names::WORKER_STARTED,
                json!({"worker_id": worker_id.as_str(), "pool": pool, "pid": pid}),
                "worker-service",
            )
            .await;

        Ok(StartOutcome::Started { worker_id, pid })
    }

    /// Stop one worker: terminate, wait, kill. Returns false when unknown.
    pub async fn stop_worker(&self, worker_id: &WorkerId) -> Result<bool, EngineError> {
        let Some(handle) = self.handles.lock().remove(worker_id) else {
            return Ok(false);
        };
        let pool = handle.pool.clone();

        handle.shutdown(self.config.stop_grace).await;
        tracing::info!(worker_id = %worker_id, pool, "stopped worker");

        self.events
            .emit(
                names::WORKER_STOPPED,
                json!({"worker_id": worker_id.as_str(), "pool": pool}),
                "worker-service",
            )
            .await;
        Ok(true)
    }

    /// Stop every worker, optionally scoped to one pool.
    pub async fn stop_all_workers(&self, pool: Option<&str>) -> Result<Vec<WorkerId>, EngineError> {
        let worker_ids: Vec<WorkerId> = {
            let handles = self.handles.lock();
            handles
                .values()
                .filter(|h| pool.is_none_or(|p| h.pool == p))
                .map(|h| h.worker_id.clone())
                .collect()
        };

        let mut stopped = Vec::new();
        for worker_id in worker_ids {
            if self.stop_worker(&worker_id).await? {
                stopped.push(worker_id);
            }
        }
        Ok(stopped)
    }

    /// Live workers for a pool, reaping exited handles first.
    pub fn get_worker_count(&self, pool: &str) -> usize {
        let mut handles = self.handles.lock();
        handles.retain(|_, handle| handle.is_alive());
        handles.values().filter(|h| h.pool == pool).count()
    }

    pub fn get_target_count(&self, pool: &str) -> usize {
        self.target_counts.lock().get(pool).copied().unwrap_or(0)
    }

    // --- Cancellation & queue management ---

    /// Cancel a job. Pending jobs leave the queue; active jobs are marked
    /// cancelled and their terminal write is skipped when the handler
    /// returns. Repeated cancellation is a no-op success. Returns false for
    /// jobs already completed or failed.
    pub async fn cancel_job(&self, job_id: &JobId) -> Result<bool, EngineError> {
        let (old_status, pool) = {
            let jobs = self.jobs.lock();
            let Some(job) = jobs.get(job_id) else {
                return Err(EngineError::JobNotFound(job_id.to_string()));
            };
            (job.status, job.pool.clone())
        };

        match old_status {
            JobStatus::Cancelled => return Ok(true),
            JobStatus::Completed | JobStatus::Failed => return Ok(false),
            JobStatus::Pending | JobStatus::Active => {}
        }

        let now = Utc::now();
        {
            let mut jobs = self.jobs.lock();
            if let Some(job) = jobs.get_mut(job_id) {
                job.status = JobStatus::Cancelled;
                job.completed_at = Some(now);
            }
        }

        if let Some(substrate) = &self.substrate {
            if old_status == JobStatus::Pending {
                substrate.remove_from_queue(&pool, job_id.as_str()).await?;
            }
            substrate
                .job_put(
                    job_id.as_str(),
                    HashMap::from([
                        ("status".to_string(), JobStatus::Cancelled.to_string()),
                        ("completed_at".to_string(), format_ts(now)),
                    ]),
                )
                .await?;
        }

        tracing::info!(job_id = %job_id, pool, "cancelled job");
        self.events
            .emit(
                names::WORKER_JOB_CANCELLED,
                json!({"job_id": job_id.as_str(), "pool": pool}),
                "worker-service",
            )
            .await;
        Ok(true)
    }

    /// Clear jobs from a pool's queue (pending by default).
    pub async fn clear_queue(
        &self,
        pool: &str,
        status: Option<JobStatus>,
    ) -> Result<u64, EngineError> {
        if !self.pools.read().contains(pool) {
            return Err(EngineError::UnknownPool(pool.to_string()));
        }
        let status = status.unwrap_or(JobStatus::Pending);

        let mut cleared = 0u64;
        if status == JobStatus::Pending {
            if let Some(substrate) = &self.substrate {
                cleared = substrate.delete_queue(pool).await?;
            }
        }

        let removed: Vec<JobId> = {
            let mut jobs = self.jobs.lock();
            let ids: Vec<JobId> = jobs
                .iter()
                .filter(|(_, job)| job.pool == pool && job.status == status)
                .map(|(id, _)| id.clone())
                .collect();
            for id in &ids {
                jobs.remove(id);
            }
            ids
        };
        if let Some(substrate) = &self.substrate {
            for id in &removed {
                substrate.job_delete(id.as_str()).await?;
            }
        }
        cleared = cleared.max(removed.len() as u64);

        tracing::info!(pool, %status, cleared, "cleared queue");
        self.events
            .emit(
                names::WORKER_QUEUE_CLEARED,
                json!({"pool": pool, "status": status.to_string(), "count": cleared}),
                "worker-service",
            )
            .await;
        Ok(cleared)
    }

    /// Re-enqueue failed jobs under fresh ids. Returns (original, new) pairs.
    pub async fn retry_failed_jobs(
        &self,
        pool: &str,
        job_ids: Option<&[JobId]>,
    ) -> Result<Vec<(JobId, JobId)>, EngineError> {
        if !self.pools.read().contains(pool) {
            return Err(EngineError::UnknownPool(pool.to_string()));
        }

        let failed: Vec<Job> = {
            let jobs = self.jobs.lock();
            jobs.values()
                .filter(|job| job.pool == pool && job.status == JobStatus::Failed)
                .filter(|job| job_ids.is_none_or(|ids| ids.contains(&job.id)))
                .cloned()
                .collect()
        };

        let mut retried = Vec::new();
        for job in failed {
            let suffix = &uuid::Uuid::new_v4().simple().to_string()[..4];
            let new_id = JobId::new(format!("{}-retry-{}", job.id, suffix));
            self.enqueue(pool, new_id.clone(), job.payload.clone(), job.priority)
                .await?;
            self.jobs.lock().remove(&job.id);
            retried.push((job.id, new_id));
        }

        tracing::info!(pool, count = retried.len(), "retried failed jobs");
        let jobs_json: Vec<Value> = retried
            .iter()
            .map(|(original, new)| {
                json!({"original_id": original.as_str(), "new_id": new.as_str()})
            })
            .collect();
        self.events
            .emit(
                names::WORKER_JOBS_RETRIED,
                json!({"pool": pool, "count": retried.len(), "jobs": jobs_json}),
                "worker-service",
            )
            .await;
        Ok(retried)
    }

    // --- Tracker & stats reads ---

    pub fn get_job(&self, job_id: &JobId) -> Option<Job> {
        self.jobs.lock().get(job_id).cloned()
    }

    /// Tracked jobs with optional pool/status filters.
    pub fn get_jobs(
        &self,
        pool: Option<&str>,
        status: Option<JobStatus>,
        limit: usize,
    ) -> Vec<Job> {
        let jobs = self.jobs.lock();
        jobs.values()
            .filter(|job| pool.is_none_or(|p| job.pool == p))
            .filter(|job| status.is_none_or(|s| job.status == s))
            .take(limit)
            .cloned()
            .collect()
    }

    /// Queue statistics for one pool.
    pub async fn get_pool_stats(&self, pool: &str) -> Result<QueueStats, EngineError> {
        let spec = *self
            .pools
            .read()
            .get(pool)
            .ok_or_else(|| EngineError::UnknownPool(pool.to_string()))?;

        let pending = match &self.substrate {
            Some(substrate) => substrate.queue_len(pool).await?,
            None => 0,
        };

        let (active, completed, failed) = {
            let jobs = self.jobs.lock();
            let mut counts = (0, 0, 0);
            for job in jobs.values().filter(|j| j.pool == pool) {
                match job.status {
                    JobStatus::Active => counts.0 += 1,
                    JobStatus::Completed => counts.1 += 1,
                    JobStatus::Failed => counts.2 += 1,
                    _ => {}
                }
            }
            counts
        };

        Ok(QueueStats {
            pool: pool.to_string(),
            kind: spec.kind,
            max_workers: spec.max_workers,
            pending,
            active,
            completed,
            failed,
        })
    }

    /// Queue statistics for every known pool.
    pub async fn get_queue_stats(&self) -> Result<Vec<QueueStats>, EngineError> {
        let pools: Vec<String> = {
            let table = self.pools.read();
            table.names().into_iter().map(String::from).collect()
        };
        let mut stats = Vec::with_capacity(pools.len());
        for pool in pools {
            stats.push(self.get_pool_stats(&pool).await?);
        }
        Ok(stats)
    }

    /// Static + live information for every pool.
    pub fn get_pool_info(&self) -> Vec<PoolInfo> {
        let table = self.pools.read();
        table
            .iter()
            .map(|(name, spec)| PoolInfo {
                pool: name.to_string(),
                kind: spec.kind,
                max_workers: spec.max_workers,
                vram_mb: spec.vram_mb,
                current_workers: {
                    let mut handles = self.handles.lock();
                    handles.retain(|_, h| h.is_alive());
                    handles.values().filter(|h| h.pool == name).count()
                },
                target_workers: self.get_target_count(name),
            })
            .collect()
    }

    // --- Bridge plumbing ---

    /// Apply a worker-published queue event to the in-memory tracker.
    ///
    /// Terminal writes are skipped for jobs the tracker already marks
    /// cancelled (cancellation takes effect when the handler returns).
    pub(crate) fn apply_queue_event(&self, event: &QueueEvent) {
        let Some(job_id) = &event.job_id else {
            return;
        };
        let mut jobs = self.jobs.lock();
        let Some(job) = jobs.get_mut(job_id.as_str()) else {
            return;
        };
        if job.status == JobStatus::Cancelled {
            tracing::debug!(job_id, "ignoring terminal event for cancelled job");
            return;
        }

        match event.event.as_str() {
            names::WORKER_JOB_COMPLETED => {
                job.status = JobStatus::Completed;
                job.completed_at = Some(Utc::now());
                job.result = event.result.clone();
            }
            names::WORKER_JOB_FAILED => {
                job.status = JobStatus::Failed;
                job.completed_at = Some(Utc::now());
                job.error = event.error.clone();
            }
            _ => {}
        }
    }

    // --- Shutdown ---

    /// Cancel the bridge, then terminate every worker with the service
    /// grace window (terminate, wait, force-kill stragglers).
    pub async fn shutdown(&self) {
        if let Some(token) = self.bridge_token.lock().take() {
            token.cancel();
        }

        let handles: Vec<WorkerHandle> = {
            let mut map = self.handles.lock();
            map.drain().map(|(_, handle)| handle).collect()
        };
        if !handles.is_empty() {
            tracing::info!(count = handles.len(), "shutting down workers");
            let grace = self.config.shutdown_grace;
            futures_util::future::join_all(
                handles.into_iter().map(|handle| handle.shutdown(grace)),
            )
            .await;
        }
        tracing::info!("worker service shutdown complete");
    }
}

#[cfg(test)]
#[path = "service_tests.rs"]
mod tests;
