// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker identity, lifecycle states, and registry records.

use crate::id::random_suffix;
use crate::job::{FieldError, JobId};
use crate::time::{format_ts, parse_ts};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

crate::define_id! {
    /// Unique identifier for a worker instance.
    pub struct WorkerId;
}

impl WorkerId {
    /// Generate a fresh id following the `{pool}-{random}` convention.
    pub fn generate(pool: &str) -> Self {
        Self(format!("{}-{}", pool, random_suffix()))
    }
}

/// Heartbeat age below which a worker is considered alive.
pub const ALIVE_THRESHOLD_SECS: i64 = 30;

/// Heartbeat age above which a worker is considered stuck.
pub const STUCK_THRESHOLD_SECS: i64 = 60;

/// Registry entry TTL; a worker that stops heartbeating vanishes from the
/// registry within this window.
pub const REGISTRY_TTL_SECS: u64 = 120;

/// Worker lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    Starting,
    Idle,
    Processing,
    Stopping,
    Stopped,
    Error,
}

impl WorkerState {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "starting" => Some(WorkerState::Starting),
            "idle" => Some(WorkerState::Idle),
            "processing" => Some(WorkerState::Processing),
            "stopping" => Some(WorkerState::Stopping),
            "stopped" => Some(WorkerState::Stopped),
            "error" => Some(WorkerState::Error),
            _ => None,
        }
    }
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            WorkerState::Starting => "starting",
            WorkerState::Idle => "idle",
            WorkerState::Processing => "processing",
            WorkerState::Stopping => "stopping",
            WorkerState::Stopped => "stopped",
            WorkerState::Error => "error",
        })
    }
}

/// A worker's registry record, as stored in the substrate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerRecord {
    pub worker_id: WorkerId,
    pub pool: String,
    pub name: String,
    pub state: WorkerState,
    pub pid: Option<u32>,
    pub started_at: DateTime<Utc>,
    pub last_heartbeat: Option<DateTime<Utc>>,
    pub jobs_completed: u64,
    pub jobs_failed: u64,
    pub current_job: Option<JobId>,
}

impl WorkerRecord {
    pub fn new(worker_id: WorkerId, pool: impl Into<String>, started_at: DateTime<Utc>) -> Self {
        Self {
            worker_id,
            pool: pool.into(),
            name: String::new(),
            state: WorkerState::Starting,
            pid: None,
            started_at,
            last_heartbeat: None,
            jobs_completed: 0,
            jobs_failed: 0,
            current_job: None,
        }
    }

    /// Seconds since the last heartbeat, or `None` when never heartbeat.
    pub fn heartbeat_age_secs(&self, now: DateTime<Utc>) -> Option<i64> {
        self.last_heartbeat.map(|hb| (now - hb).num_seconds())
    }

    /// A worker is alive when its heartbeat is fresher than 30 s.
    pub fn is_alive(&self, now: DateTime<Utc>) -> bool {
        matches!(self.heartbeat_age_secs(now), Some(age) if age < ALIVE_THRESHOLD_SECS)
    }

    /// A worker is stuck when its heartbeat is older than 60 s (or missing).
    pub fn is_stuck(&self, now: DateTime<Utc>) -> bool {
        match self.heartbeat_age_secs(now) {
            Some(age) => age > STUCK_THRESHOLD_SECS,
            None => true,
        }
    }

    /// Encode as substrate hash fields.
    pub fn to_fields(&self) -> HashMap<String, String> {
        let mut fields = HashMap::from([
            ("pool".to_string(), self.pool.clone()),
            ("name".to_string(), self.name.clone()),
            ("state".to_string(), self.state.to_string()),
            ("started_at".to_string(), format_ts(self.started_at)),
            ("jobs_completed".to_string(), self.jobs_completed.to_string()),
            ("jobs_failed".to_string(), self.jobs_failed.to_string()),
            (
                "current_job".to_string(),
                self.current_job
                    .as_ref()
                    .map(|j| j.to_string())
                    .unwrap_or_default(),
            ),
        ]);
        if let Some(pid) = self.pid {
            fields.insert("pid".to_string(), pid.to_string());
        }
        if let Some(hb) = self.last_heartbeat {
            fields.insert("last_heartbeat".to_string(), format_ts(hb));
        }
        fields
    }

    /// Decode from substrate hash fields.
    pub fn from_fields(
        worker_id: WorkerId,
        fields: &HashMap<String, String>,
    ) -> Result<Self, FieldError> {
        let pool = fields
            .get("pool")
            .cloned()
            .ok_or(FieldError::Missing("pool"))?;

        Ok(Self {
            worker_id,
            pool,
            name: fields.get("name").cloned().unwrap_or_default(),
            state: fields
                .get("state")
                .and_then(|s| WorkerState::parse(s))
                .unwrap_or(WorkerState::Starting),
            pid: fields.get("pid").and_then(|s| s.parse().ok()),
            started_at: fields
                .get("started_at")
                .and_then(|s| parse_ts(s))
                .unwrap_or_default(),
            last_heartbeat: fields.get("last_heartbeat").and_then(|s| parse_ts(s)),
            jobs_completed: fields
                .get("jobs_completed")
                .and_then(|s| s.parse().ok())
                .unwrap_or(0),
            jobs_failed: fields
                .get("jobs_failed")
                .and_then(|s| s.parse().ok())
                .unwrap_or(0),
            current_job: fields
                .get("current_job")
                .filter(|s| !s.is_empty())
                .map(|s| JobId::new(s.clone())),
        })
    }
}

#[cfg(test)]
#[path = "worker_tests.rs"]
mod tests;
