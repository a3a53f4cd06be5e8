// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event types: in-process bus events, the cross-process pub/sub envelope,
//! and glob matching over event type names.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Stable event type names emitted by the dispatch core.
pub mod names {
    pub const WORKER_JOB_COMPLETED: &str = "worker.job.completed";
    pub const WORKER_JOB_FAILED: &str = "worker.job.failed";
    pub const WORKER_JOB_CANCELLED: &str = "worker.job.cancelled";
    pub const WORKER_STARTED: &str = "worker.started";
    pub const WORKER_STOPPED: &str = "worker.stopped";
    pub const WORKER_POOL_SCALED: &str = "worker.pool.scaled";
    pub const WORKER_QUEUE_CLEARED: &str = "worker.queue.cleared";
    pub const WORKER_JOBS_RETRIED: &str = "worker.jobs.retried";
    pub const INGEST_DOCUMENT_COMPLETED: &str = "ingest.document.completed";
}

/// An event on the in-process bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusEvent {
    pub event_type: String,
    pub payload: Value,
    pub source: String,
    pub timestamp: DateTime<Utc>,
    /// Monotonic per-bus sequence; establishes a total order across emits
    /// even when timestamps collide.
    pub sequence: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
}

/// JSON envelope carried on the shared `arkham:events` pub/sub channel.
///
/// Workers publish these; the dispatcher's bridge decodes them and re-emits
/// onto the in-process bus. Unknown extra fields are ignored on decode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueEvent {
    pub event: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pool: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
}

impl QueueEvent {
    pub fn new(event: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            job_id: None,
            worker_id: None,
            pool: None,
            result: None,
            error: None,
            trace_id: None,
        }
    }

    /// The envelope body as a JSON object, without the `event` discriminant.
    /// This is the payload shape re-emitted on the in-process bus.
    pub fn payload(&self) -> Value {
        let mut map = serde_json::Map::new();
        if let Some(job_id) = &self.job_id {
            map.insert("job_id".to_string(), Value::String(job_id.clone()));
        }
        if let Some(worker_id) = &self.worker_id {
            map.insert("worker_id".to_string(), Value::String(worker_id.clone()));
        }
        if let Some(pool) = &self.pool {
            map.insert("pool".to_string(), Value::String(pool.clone()));
        }
        if let Some(result) = &self.result {
            map.insert("result".to_string(), result.clone());
        }
        if let Some(error) = &self.error {
            map.insert("error".to_string(), Value::String(error.clone()));
        }
        if let Some(trace_id) = &self.trace_id {
            map.insert("trace_id".to_string(), Value::String(trace_id.clone()));
        }
        Value::Object(map)
    }
}

/// Glob match over event type names.
///
/// `*` matches any run of characters, including dots (matching is
/// per-character, not per-segment). `?` matches exactly one character.
pub fn pattern_matches(pattern: &str, text: &str) -> bool {
    let pat: Vec<char> = pattern.chars().collect();
    let txt: Vec<char> = text.chars().collect();

    // Iterative wildcard match with single-star backtracking.
    let (mut p, mut t) = (0usize, 0usize);
    let mut star: Option<(usize, usize)> = None;

    while t < txt.len() {
        if p < pat.len() && (pat[p] == '?' || pat[p] == txt[t]) {
            p += 1;
            t += 1;
        } else if p < pat.len() && pat[p] == '*' {
            star = Some((p, t));
            p += 1;
        } else if let Some((sp, st)) = star {
            p = sp + 1;
            t = st + 1;
            star = Some((sp, st + 1));
        } else {
            return false;
        }
    }

    while p < pat.len() && pat[p] == '*' {
        p += 1;
    }
    p == pat.len()
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
