// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Stable substrate key and channel names.
//!
//! These strings are shared with every worker process; changing them is a
//! wire-format break.

/// Cross-process event channel.
pub const EVENTS_CHANNEL: &str = "arkham:events";

/// Sorted set of pending job ids for a pool, scored by priority.
pub fn queue(pool: &str) -> String {
    format!("arkham:queue:{pool}")
}

/// Per-job hash.
pub fn job(job_id: &str) -> String {
    format!("arkham:job:{job_id}")
}

/// Per-worker registry hash (TTL-bound).
pub fn worker(worker_id: &str) -> String {
    format!("arkham:worker:{worker_id}")
}

/// Scan pattern covering every worker registry hash.
pub const WORKER_SCAN_PATTERN: &str = "arkham:worker:*";

/// Prefix of worker registry keys; strip to recover the worker id.
pub const WORKER_KEY_PREFIX: &str = "arkham:worker:";

/// Set of worker ids belonging to a pool.
pub fn pool_workers(pool: &str) -> String {
    format!("arkham:pool:{pool}:workers")
}

/// Dead-letter list of terminally failed job ids for a pool.
pub fn dead_letter(pool: &str) -> String {
    format!("arkham:dlq:{pool}")
}

#[cfg(test)]
#[path = "keys_tests.rs"]
mod tests;
