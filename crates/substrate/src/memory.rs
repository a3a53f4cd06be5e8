// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory substrate for tests.
//!
//! Implements the full [`Substrate`] trait over process-local maps and a
//! broadcast channel, preserving the semantics the core relies on: atomic
//! min-score pops, ZADD score replacement, registry TTLs (against the tokio
//! clock, so paused-time tests can cross them), and fan-out pub/sub.

use crate::adapter::{MessageStream, Substrate};
use crate::error::SubstrateError;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::time::{Duration, Instant};

#[derive(Default)]
struct MemoryState {
    /// pool → queue entries (score, insertion seq, job id)
    queues: HashMap<String, Vec<(f64, u64, String)>>,
    seq: u64,
    jobs: HashMap<String, HashMap<String, String>>,
    registry: HashMap<String, (HashMap<String, String>, Instant)>,
    pool_members: HashMap<String, HashSet<String>>,
    dead_letters: HashMap<String, Vec<String>>,
}

/// Process-local substrate fake.
#[derive(Clone)]
pub struct MemorySubstrate {
    state: Arc<Mutex<MemoryState>>,
    events: broadcast::Sender<(String, String)>,
}

impl MemorySubstrate {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            state: Arc::new(Mutex::new(MemoryState::default())),
            events,
        }
    }

    /// Drop expired registry entries (TTL emulation).
    fn expire_registry(state: &mut MemoryState) {
        let now = Instant::now();
        state.registry.retain(|_, (_, expiry)| *expiry > now);
    }

    /// Number of live pub/sub receivers. Lets tests wait for a background
    /// subscriber (e.g. the dispatcher bridge) before publishing.
    pub fn subscriber_count(&self) -> usize {
        self.events.receiver_count()
    }

    /// The current score of a queued job, for test assertions.
    pub fn queue_score(&self, pool: &str, job_id: &str) -> Option<f64> {
        let state = self.state.lock();
        state.queues.get(pool).and_then(|entries| {
            entries
                .iter()
                .find(|(_, _, id)| id == job_id)
                .map(|(score, _, _)| *score)
        })
    }
}

impl Default for MemorySubstrate {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Substrate for MemorySubstrate {
    async fn ping(&self) -> Result<(), SubstrateError> {
        Ok(())
    }

    async fn priority_push(
        &self,
        pool: &str,
        job_id: &str,
        score: f64,
    ) -> Result<(), SubstrateError> {
        let mut state = self.state.lock();
        state.seq += 1;
        let seq = state.seq;
        let entries = state.queues.entry(pool.to_string()).or_default();
        // ZADD semantics: re-adding an existing member replaces its score.
        entries.retain(|(_, _, id)| id != job_id);
        entries.push((score, seq, job_id.to_string()));
        Ok(())
    }

    async fn priority_pop(&self, pool: &str) -> Result<Option<String>, SubstrateError> {
        let mut state = self.state.lock();
        let Some(entries) = state.queues.get_mut(pool) else {
            return Ok(None);
        };
        let Some(min_idx) = entries
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| (a.0, a.1).partial_cmp(&(b.0, b.1)).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(idx, _)| idx)
        else {
            return Ok(None);
        };
        let (_, _, job_id) = entries.remove(min_idx);
        Ok(Some(job_id))
    }

    async fn queue_len(&self, pool: &str) -> Result<u64, SubstrateError> {
        let state = self.state.lock();
        Ok(state.queues.get(pool).map(|q| q.len() as u64).unwrap_or(0))
    }

    async fn remove_from_queue(&self, pool: &str, job_id: &str) -> Result<bool, SubstrateError> {
        let mut state = self.state.lock();
        let Some(entries) = state.queues.get_mut(pool) else {
            return Ok(false);
        };
        let before = entries.len();
        entries.retain(|(_, _, id)| id != job_id);
        Ok(entries.len() < before)
    }

    async fn delete_queue(&self, pool: &str) -> Result<u64, SubstrateError> {
        let mut state = self.state.lock();
        Ok(state
            .queues
            .remove(pool)
            .map(|q| q.len() as u64)
            .unwrap_or(0))
    }

    async fn job_put(
        &self,
        job_id: &str,
        fields: HashMap<String, String>,
    ) -> Result<(), SubstrateError> {
        let mut state = self.state.lock();
        state
            .jobs
            .entry(job_id.to_string())
            .or_default()
            .extend(fields);
        Ok(())
    }

    async fn job_get(
        &self,
        job_id: &str,
    ) -> Result<Option<HashMap<String, String>>, SubstrateError> {
        let state = self.state.lock();
        Ok(state.jobs.get(job_id).cloned())
    }

    async fn job_delete(&self, job_id: &str) -> Result<(), SubstrateError> {
        let mut state = self.state.lock();
        state.jobs.remove(job_id);
        Ok(())
    }

    async fn registry_put(
        &self,
        worker_id: &str,
        fields: HashMap<String, String>,
        ttl_secs: u64,
    ) -> Result<(), SubstrateError> {
        let mut state = self.state.lock();
        Self::expire_registry(&mut state);
        let expiry = Instant::now() + Duration::from_secs(ttl_secs);
        let entry = state
            .registry
            .entry(worker_id.to_string())
            .or_insert_with(|| (HashMap::new(), expiry));
        entry.0.extend(fields);
        entry.1 = expiry;
        Ok(())
    }

    async fn registry_scan(&self) -> Result<Vec<String>, SubstrateError> {
        let mut state = self.state.lock();
        Self::expire_registry(&mut state);
        Ok(state.registry.keys().cloned().collect())
    }

    async fn registry_get(
        &self,
        worker_id: &str,
    ) -> Result<Option<HashMap<String, String>>, SubstrateError> {
        let mut state = self.state.lock();
        Self::expire_registry(&mut state);
        Ok(state.registry.get(worker_id).map(|(fields, _)| fields.clone()))
    }

    async fn registry_delete(&self, worker_id: &str) -> Result<(), SubstrateError> {
        let mut state = self.state.lock();
        state.registry.remove(worker_id);
        Ok(())
    }

    async fn pool_member_add(&self, pool: &str, worker_id: &str) -> Result<(), SubstrateError> {
        let mut state = self.state.lock();
        state
            .pool_members
            .entry(pool.to_string())
            .or_default()
            .insert(worker_id.to_string());
        Ok(())
    }

    async fn pool_member_remove(&self, pool: &str, worker_id: &str) -> Result<(), SubstrateError> {
        let mut state = self.state.lock();
        if let Some(members) = state.pool_members.get_mut(pool) {
            members.remove(worker_id);
        }
        Ok(())
    }

    async fn dead_letter_push(&self, pool: &str, job_id: &str) -> Result<(), SubstrateError> {
        let mut state = self.state.lock();
        state
            .dead_letters
            .entry(pool.to_string())
            .or_default()
            .insert(0, job_id.to_string());
        Ok(())
    }

    async fn dead_letter_all(&self, pool: &str) -> Result<Vec<String>, SubstrateError> {
        let state = self.state.lock();
        Ok(state.dead_letters.get(pool).cloned().unwrap_or_default())
    }

    async fn publish(&self, channel: &str, payload: &str) -> Result<(), SubstrateError> {
        // No subscribers is fine; events are fire-and-forget.
        let _ = self
            .events
            .send((channel.to_string(), payload.to_string()));
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> Result<MessageStream, SubstrateError> {
        let rx = self.events.subscribe();
        let channel = channel.to_string();
        let stream = futures_util::stream::unfold(rx, move |mut rx| {
            let channel = channel.clone();
            async move {
                loop {
                    match rx.recv().await {
                        Ok((ch, payload)) if ch == channel => return Some((payload, rx)),
                        Ok(_) => continue,
                        Err(broadcast::error::RecvError::Lagged(_)) => continue,
                        Err(broadcast::error::RecvError::Closed) => return None,
                    }
                }
            }
        });
        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;
