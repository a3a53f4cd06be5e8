// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The substrate trait: everything the dispatch core needs from the store.

use crate::error::SubstrateError;
use async_trait::async_trait;
use futures_util::stream::Stream;
use std::collections::HashMap;
use std::pin::Pin;

/// Stream of raw messages from a pub/sub subscription.
pub type MessageStream = Pin<Box<dyn Stream<Item = String> + Send>>;

/// Typed operations over the external key/value store.
///
/// Atomicity requirements: `priority_pop` must pop the minimum-score member
/// atomically (the sorted set is written by both the dispatcher and
/// requeueing workers), and `registry_put` must apply the TTL so that dead
/// workers vanish from scans.
#[async_trait]
pub trait Substrate: Send + Sync {
    /// Liveness probe.
    async fn ping(&self) -> Result<(), SubstrateError>;

    // --- Priority queues ---

    /// Add a job to the pool's sorted set with the given score
    /// (lower score = higher priority).
    async fn priority_push(
        &self,
        pool: &str,
        job_id: &str,
        score: f64,
    ) -> Result<(), SubstrateError>;

    /// Atomically pop the minimum-score job id, if any.
    async fn priority_pop(&self, pool: &str) -> Result<Option<String>, SubstrateError>;

    /// Number of pending jobs in the pool's queue.
    async fn queue_len(&self, pool: &str) -> Result<u64, SubstrateError>;

    /// Remove a specific job from the pool's queue (cancellation).
    /// Returns true when the job was present.
    async fn remove_from_queue(&self, pool: &str, job_id: &str) -> Result<bool, SubstrateError>;

    /// Drop the pool's entire queue, returning how many entries it held.
    async fn delete_queue(&self, pool: &str) -> Result<u64, SubstrateError>;

    // --- Job hashes ---

    /// Merge fields into the per-job hash.
    async fn job_put(
        &self,
        job_id: &str,
        fields: HashMap<String, String>,
    ) -> Result<(), SubstrateError>;

    /// Read the per-job hash. `None` when the job is unknown.
    async fn job_get(&self, job_id: &str)
        -> Result<Option<HashMap<String, String>>, SubstrateError>;

    /// Delete the per-job hash.
    async fn job_delete(&self, job_id: &str) -> Result<(), SubstrateError>;

    // --- Worker registry ---

    /// Merge fields into a worker's registry hash and refresh its TTL.
    async fn registry_put(
        &self,
        worker_id: &str,
        fields: HashMap<String, String>,
        ttl_secs: u64,
    ) -> Result<(), SubstrateError>;

    /// All currently registered worker ids.
    async fn registry_scan(&self) -> Result<Vec<String>, SubstrateError>;

    /// Read one worker's registry hash.
    async fn registry_get(
        &self,
        worker_id: &str,
    ) -> Result<Option<HashMap<String, String>>, SubstrateError>;

    /// Remove a worker's registry hash.
    async fn registry_delete(&self, worker_id: &str) -> Result<(), SubstrateError>;

    /// Add a worker to its pool's membership set.
    async fn pool_member_add(&self, pool: &str, worker_id: &str) -> Result<(), SubstrateError>;

    /// Remove a worker from its pool's membership set.
    async fn pool_member_remove(&self, pool: &str, worker_id: &str) -> Result<(), SubstrateError>;

    // --- Dead letters ---

    /// Push a terminally failed job id onto the pool's dead-letter list.
    async fn dead_letter_push(&self, pool: &str, job_id: &str) -> Result<(), SubstrateError>;

    /// All job ids on the pool's dead-letter list, newest first.
    async fn dead_letter_all(&self, pool: &str) -> Result<Vec<String>, SubstrateError>;

    // --- Pub/sub ---

    /// Publish a raw payload on a channel.
    async fn publish(&self, channel: &str, payload: &str) -> Result<(), SubstrateError>;

    /// Subscribe to a channel, yielding raw message payloads. The stream ends
    /// when the underlying connection is lost; callers re-subscribe.
    async fn subscribe(&self, channel: &str) -> Result<MessageStream, SubstrateError>;
}
