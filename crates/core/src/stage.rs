// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pipeline stage results and the shared stage context.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Status of a pipeline stage execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StageStatus::Pending => "pending",
            StageStatus::Running => "running",
            StageStatus::Completed => "completed",
            StageStatus::Failed => "failed",
            StageStatus::Skipped => "skipped",
        })
    }
}

/// Result of a single pipeline stage execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageResult {
    pub stage_name: String,
    pub status: StageStatus,
    /// Structured stage output, merged into the context for downstream
    /// stages when the stage completed.
    #[serde(default = "empty_object")]
    pub output: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

impl StageResult {
    pub fn completed(
        stage_name: impl Into<String>,
        output: Value,
        started_at: DateTime<Utc>,
        completed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            stage_name: stage_name.into(),
            status: StageStatus::Completed,
            output,
            error: None,
            started_at: Some(started_at),
            completed_at: Some(completed_at),
        }
    }

    pub fn failed(
        stage_name: impl Into<String>,
        error: impl Into<String>,
        started_at: Option<DateTime<Utc>>,
        completed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            stage_name: stage_name.into(),
            status: StageStatus::Failed,
            output: empty_object(),
            error: Some(error.into()),
            started_at,
            completed_at: Some(completed_at),
        }
    }

    pub fn skipped(stage_name: impl Into<String>) -> Self {
        Self {
            stage_name: stage_name.into(),
            status: StageStatus::Skipped,
            output: empty_object(),
            error: None,
            started_at: None,
            completed_at: None,
        }
    }

    /// Check if the stage completed successfully.
    pub fn success(&self) -> bool {
        self.status == StageStatus::Completed
    }

    /// Execution duration, when both bounds are recorded.
    pub fn duration_ms(&self) -> Option<i64> {
        match (self.started_at, self.completed_at) {
            (Some(start), Some(end)) => Some((end - start).num_milliseconds()),
            _ => None,
        }
    }
}

/// Mutable bag of keys threaded through pipeline stages.
///
/// Each stage reads what it needs and writes additional keys for downstream
/// stages; the coordinator merges stage outputs into the context.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PipelineContext {
    values: Map<String, Value>,
}

impl PipelineContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a context from a JSON object. Non-object values yield an empty
    /// context.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(values) => Self { values },
            _ => Self::default(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.values.get(key).and_then(Value::as_str)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.values.get(key).and_then(Value::as_bool)
    }

    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.values.get(key).and_then(Value::as_u64)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.values.insert(key.into(), value);
    }

    /// Merge the fields of a JSON object into the context, overwriting
    /// existing keys. Non-object values are ignored.
    pub fn merge(&mut self, output: &Value) {
        if let Value::Object(map) = output {
            for (key, value) in map {
                self.values.insert(key.clone(), value.clone());
            }
        }
    }

    pub fn as_object(&self) -> &Map<String, Value> {
        &self.values
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.values)
    }
}

#[cfg(test)]
#[path = "stage_tests.rs"]
mod tests;
