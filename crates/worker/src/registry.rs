// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Read-side view of the worker registry.
//!
//! Assembles worker records from substrate registry keys, with a short-lived
//! cache so status endpoints don't hammer the store. Workers own their own
//! records; this side only reads, aggregates, and garbage-collects entries
//! whose heartbeat is long gone.

use arkham_core::event::QueueEvent;
use arkham_core::{WorkerId, WorkerRecord};
use arkham_substrate::{keys, Substrate, SubstrateError};
use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// How long a scan result is served from cache.
pub const CACHE_TTL: Duration = Duration::from_secs(5);

/// Heartbeat age (seconds) past which `cleanup_dead_workers` deletes the
/// registry entry outright.
pub const DEAD_AFTER_SECS: i64 = 120;

/// Pool-scoped aggregates over worker records.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolStats {
    pub pool: String,
    pub total_workers: usize,
    pub alive_workers: usize,
    pub stuck_workers: usize,
    pub idle_workers: usize,
    pub processing_workers: usize,
    pub total_completed: u64,
    pub total_failed: u64,
}

struct CachedScan {
    fetched_at: Instant,
    records: HashMap<String, WorkerRecord>,
}

/// Cached reader over the substrate's worker records.
pub struct WorkerRegistry {
    substrate: Arc<dyn Substrate>,
    cache: Mutex<Option<CachedScan>>,
    cache_ttl: Duration,
}

impl WorkerRegistry {
    pub fn new(substrate: Arc<dyn Substrate>) -> Self {
        Self {
            substrate,
            cache: Mutex::new(None),
            cache_ttl: CACHE_TTL,
        }
    }

    /// All registered workers. `use_cache` serves a recent scan when fresh.
    pub async fn all_workers(&self, use_cache: bool) -> Result<Vec<WorkerRecord>, SubstrateError> {
        if use_cache {
            let cache = self.cache.lock();
            if let Some(cached) = cache.as_ref() {
                if cached.fetched_at.elapsed() < self.cache_ttl {
                    return Ok(cached.records.values().cloned().collect());
                }
            }
        }

        let mut records = HashMap::new();
        for worker_id in self.substrate.registry_scan().await? {
            let Some(fields) = self.substrate.registry_get(&worker_id).await? else {
                continue;
            };
            match WorkerRecord::from_fields(WorkerId::new(worker_id.clone()), &fields) {
                Ok(record) => {
                    records.insert(worker_id, record);
                }
                Err(error) => {
                    tracing::warn!(worker_id, %error, "undecodable worker record");
                }
            }
        }

        *self.cache.lock() = Some(CachedScan {
            fetched_at: Instant::now(),
            records: records.clone(),
        });
        Ok(records.into_values().collect())
    }

    /// One worker's record, bypassing the cache.
    pub async fn worker(&self, worker_id: &str) -> Result<Option<WorkerRecord>, SubstrateError> {
        let Some(fields) = self.substrate.registry_get(worker_id).await? else {
            return Ok(None);
        };
        match WorkerRecord::from_fields(WorkerId::new(worker_id), &fields) {
            Ok(record) => Ok(Some(record)),
            Err(error) => {
                tracing::warn!(worker_id, %error, "undecodable worker record");
                Ok(None)
            }
        }
    }

    /// Workers belonging to one pool.
    pub async fn pool_workers(&self, pool: &str) -> Result<Vec<WorkerRecord>, SubstrateError> {
        let workers = self.all_workers(true).await?;
        Ok(workers.into_iter().filter(|w| w.pool == pool).collect())
    }

    /// Workers with a fresh heartbeat, optionally scoped to a pool.
    pub async fn alive_workers(
        &self,
        pool: Option<&str>,
    ) -> Result<Vec<WorkerRecord>, SubstrateError> {
        let now = Utc::now();
        let workers = self.all_workers(true).await?;
        Ok(workers
            .into_iter()
            .filter(|w| pool.is_none_or(|p| w.pool == p) && w.is_alive(now))
            .collect())
    }

    /// Workers whose heartbeat has gone stale, optionally scoped to a pool.
    pub async fn stuck_workers(
        &self,
        pool: Option<&str>,
    ) -> Result<Vec<WorkerRecord>, SubstrateError> {
        let now = Utc::now();
        let workers = self.all_workers(true).await?;
        Ok(workers
            .into_iter()
            .filter(|w| pool.is_none_or(|p| w.pool == p) && w.is_stuck(now))
            .collect())
    }

    /// Aggregate worker counts for one pool.
    pub async fn pool_stats(&self, pool: &str) -> Result<PoolStats, SubstrateError> {
        let now = Utc::now();
        let workers = self.pool_workers(pool).await?;

        Ok(PoolStats {
            pool: pool.to_string(),
            total_workers: workers.len(),
            alive_workers: workers.iter().filter(|w| w.is_alive(now)).count(),
            stuck_workers: workers.iter().filter(|w| w.is_stuck(now)).count(),
            idle_workers: workers
                .iter()
                .filter(|w| w.state == arkham_core::WorkerState::Idle && w.is_alive(now))
                .count(),
            processing_workers: workers
                .iter()
                .filter(|w| w.state == arkham_core::WorkerState::Processing)
                .count(),
            total_completed: workers.iter().map(|w| w.jobs_completed).sum(),
            total_failed: workers.iter().map(|w| w.jobs_failed).sum(),
        })
    }

    /// Aggregates for every pool in the table.
    pub async fn all_pool_stats(
        &self,
        pools: &arkham_core::PoolTable,
    ) -> Result<Vec<PoolStats>, SubstrateError> {
        let mut stats = Vec::with_capacity(pools.len());
        for (pool, _) in pools.iter() {
            stats.push(self.pool_stats(pool).await?);
        }
        Ok(stats)
    }

    /// Delete registry entries whose heartbeat age exceeds two minutes.
    /// Returns how many were removed. Used by the dispatcher's monitor pass.
    pub async fn cleanup_dead_workers(&self) -> Result<usize, SubstrateError> {
        let now = Utc::now();
        let workers = self.all_workers(false).await?;
        let mut removed = 0;

        for worker in workers {
            let Some(age) = worker.heartbeat_age_secs(now) else {
                continue;
            };
            if age > DEAD_AFTER_SECS {
                self.substrate
                    .registry_delete(worker.worker_id.as_str())
                    .await?;
                self.substrate
                    .pool_member_remove(&worker.pool, worker.worker_id.as_str())
                    .await?;
                removed += 1;
                tracing::info!(worker_id = %worker.worker_id, "cleaned up dead worker");
            }
        }
        Ok(removed)
    }

    /// Publish an event envelope on the shared channel.
    pub async fn publish_event(&self, event: &QueueEvent) -> Result<(), SubstrateError> {
        let payload = serde_json::to_string(event)
            .map_err(|e| SubstrateError::Protocol(format!("event encode failed: {e}")))?;
        self.substrate.publish(keys::EVENTS_CHANNEL, &payload).await
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
