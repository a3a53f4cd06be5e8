// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Parse stage: entity extraction.

use crate::coordinator::PipelineStage;
use arkham_core::{PipelineContext, StageResult};
use arkham_engine::WorkerService;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

const DISPATCH_TIMEOUT: Duration = Duration::from_secs(300);
const POOL: &str = "cpu-ner";

/// Parses document text into entity mentions.
pub struct ParseStage {
    workers: Option<Arc<WorkerService>>,
}

impl ParseStage {
    pub fn new(workers: Option<Arc<WorkerService>>) -> Self {
        Self { workers }
    }
}

#[async_trait]
impl PipelineStage for ParseStage {
    fn name(&self) -> &str {
        "parse"
    }

    async fn validate(&self, context: &PipelineContext) -> bool {
        context.contains("document_id") || context.contains("text")
    }

    async fn execute(&self, context: &PipelineContext) -> StageResult {
        let started_at = Utc::now();
        let document_id = context.get_str("document_id").unwrap_or_default().to_string();

        tracing::info!(document_id, "parsing document");

        let dispatched = match &self.workers {
            Some(workers) if workers.handlers().contains(POOL) => {
                let payload = json!({
                    "document_id": &document_id,
                    "text": context.get_str("text"),
                    "job_type": "parse_entities",
                });
                match workers
                    .enqueue_and_wait(POOL, payload, 1, Some(DISPATCH_TIMEOUT))
                    .await
                {
                    Ok(result) => Some(result),
                    Err(error) => {
                        tracing::error!(%error, "parse dispatch failed");
                        return StageResult::failed(
                            self.name(),
                            error.to_string(),
                            Some(started_at),
                            Utc::now(),
                        );
                    }
                }
            }
            _ => None,
        };

        let entities_found = dispatched
            .as_ref()
            .and_then(|r| r.get("entities_found"))
            .and_then(Value::as_u64)
            .unwrap_or(0);
        let entity_types = dispatched
            .as_ref()
            .and_then(|r| r.get("entity_types").cloned())
            .unwrap_or_else(|| json!({}));

        let output = json!({
            "document_id": document_id,
            "entities_found": entities_found,
            "entity_types": entity_types,
            "status": "parsed",
        });
        StageResult::completed(self.name(), output, started_at, Utc::now())
    }
}
