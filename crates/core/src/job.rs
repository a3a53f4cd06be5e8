// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job identity, state machine, and substrate hash codec.

use crate::time::{format_ts, parse_ts};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

crate::define_id! {
    /// Unique identifier for a job instance.
    ///
    /// Job ids are opaque strings chosen by the caller (the dispatcher uses
    /// UUIDs for generated ids).
    pub struct JobId;
}

/// Status of a job in the queue.
///
/// Transitions are `Pending → Active → (Completed | Failed | Cancelled)`,
/// with `Cancelled` also reachable directly from `Pending`. A retried job
/// goes back to `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Active,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    /// Check if this status is terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    /// Parse the substrate hash representation.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(JobStatus::Pending),
            "active" => Some(JobStatus::Active),
            "completed" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            "cancelled" => Some(JobStatus::Cancelled),
            _ => None,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            JobStatus::Pending => "pending",
            JobStatus::Active => "active",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        })
    }
}

/// Error decoding a record from its substrate hash fields.
#[derive(Debug, Error)]
pub enum FieldError {
    #[error("missing field: {0}")]
    Missing(&'static str),
    #[error("invalid value for field {field}: {value}")]
    Invalid { field: &'static str, value: String },
}

/// A job in the queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub pool: String,
    pub payload: Value,
    pub priority: i64,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub result: Option<Value>,
    pub error: Option<String>,
    pub retry_count: u32,
    /// Worker currently processing the job. Set on the pending→active
    /// transition; at most one worker is ever associated with an active job.
    pub worker_id: Option<crate::worker::WorkerId>,
}

impl Job {
    /// Create a new pending job.
    pub fn new(
        id: impl Into<JobId>,
        pool: impl Into<String>,
        payload: Value,
        priority: i64,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            pool: pool.into(),
            payload,
            priority,
            status: JobStatus::Pending,
            created_at,
            started_at: None,
            completed_at: None,
            result: None,
            error: None,
            retry_count: 0,
            worker_id: None,
        }
    }

    /// Check if the job has reached a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Encode the job as substrate hash fields.
    ///
    /// Optional fields are omitted rather than written empty so that
    /// partial-update writers (workers own the active/terminal fields) never
    /// clobber fields they do not own.
    pub fn to_fields(&self) -> HashMap<String, String> {
        let mut fields = HashMap::from([
            ("pool".to_string(), self.pool.clone()),
            ("payload".to_string(), self.payload.to_string()),
            ("priority".to_string(), self.priority.to_string()),
            ("status".to_string(), self.status.to_string()),
            ("created_at".to_string(), format_ts(self.created_at)),
            ("retry_count".to_string(), self.retry_count.to_string()),
        ]);
        if let Some(ts) = self.started_at {
            fields.insert("started_at".to_string(), format_ts(ts));
        }
        if let Some(ts) = self.completed_at {
            fields.insert("completed_at".to_string(), format_ts(ts));
        }
        if let Some(result) = &self.result {
            fields.insert("result".to_string(), result.to_string());
        }
        if let Some(error) = &self.error {
            fields.insert("error".to_string(), error.clone());
        }
        if let Some(worker_id) = &self.worker_id {
            fields.insert("worker_id".to_string(), worker_id.to_string());
        }
        fields
    }

    /// Decode a job from substrate hash fields.
    pub fn from_fields(id: JobId, fields: &HashMap<String, String>) -> Result<Self, FieldError> {
        let pool = fields
            .get("pool")
            .cloned()
            .ok_or(FieldError::Missing("pool"))?;

        let payload = match fields.get("payload") {
            Some(raw) => {
                serde_json::from_str(raw).map_err(|_| FieldError::Invalid {
                    field: "payload",
                    value: raw.clone(),
                })?
            }
            None => Value::Object(Default::default()),
        };

        let priority = fields
            .get("priority")
            .map(|p| {
                p.parse::<i64>().map_err(|_| FieldError::Invalid {
                    field: "priority",
                    value: p.clone(),
                })
            })
            .transpose()?
            .unwrap_or(1);

        let status = fields
            .get("status")
            .map(|s| {
                JobStatus::parse(s).ok_or(FieldError::Invalid {
                    field: "status",
                    value: s.clone(),
                })
            })
            .transpose()?
            .unwrap_or(JobStatus::Pending);

        let result = fields
            .get("result")
            .and_then(|raw| serde_json::from_str(raw).ok());

        Ok(Self {
            id,
            pool,
            payload,
            priority,
            status,
            created_at: fields
                .get("created_at")
                .and_then(|s| parse_ts(s))
                .unwrap_or_default(),
            started_at: fields.get("started_at").and_then(|s| parse_ts(s)),
            completed_at: fields.get("completed_at").and_then(|s| parse_ts(s)),
            result,
            error: fields.get("error").cloned(),
            retry_count: fields
                .get("retry_count")
                .and_then(|s| s.parse().ok())
                .unwrap_or(0),
            worker_id: fields
                .get("worker_id")
                .filter(|s| !s.is_empty())
                .map(|s| crate::worker::WorkerId::new(s.clone())),
        })
    }
}

#[cfg(test)]
#[path = "job_tests.rs"]
mod tests;
