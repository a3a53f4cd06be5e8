// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Embed stage: chunk embeddings.

use crate::coordinator::PipelineStage;
use arkham_core::{PipelineContext, StageResult};
use arkham_engine::WorkerService;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

const DISPATCH_TIMEOUT: Duration = Duration::from_secs(300);
const POOL: &str = "gpu-embed";
const DEFAULT_MODEL: &str = "bge-m3";

/// Generates embeddings for document chunks.
pub struct EmbedStage {
    workers: Option<Arc<WorkerService>>,
}

impl EmbedStage {
    pub fn new(workers: Option<Arc<WorkerService>>) -> Self {
        Self { workers }
    }
}

#[async_trait]
impl PipelineStage for EmbedStage {
    fn name(&self) -> &str {
        "embed"
    }

    async fn validate(&self, context: &PipelineContext) -> bool {
        context.contains("document_id") || context.contains("chunks")
    }

    async fn execute(&self, context: &PipelineContext) -> StageResult {
        let started_at = Utc::now();
        let document_id = context.get_str("document_id").unwrap_or_default().to_string();
        let embedding_model = context
            .get_str("embedding_model")
            .unwrap_or(DEFAULT_MODEL)
            .to_string();

        tracing::info!(document_id, embedding_model, "embedding document");

        let dispatched = match &self.workers {
            Some(workers) if workers.handlers().contains(POOL) => {
                let payload = json!({
                    "document_id": &document_id,
                    "chunks": context.get("chunks").cloned(),
                    "embedding_model": &embedding_model,
                    "job_type": "embed_chunks",
                });
                match workers
                    .enqueue_and_wait(POOL, payload, 1, Some(DISPATCH_TIMEOUT))
                    .await
                {
                    Ok(result) => Some(result),
                    Err(error) => {
                        tracing::error!(%error, "embed dispatch failed");
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

        let chunks_embedded = dispatched
            .as_ref()
            .and_then(|r| r.get("chunks_embedded"))
            .and_then(Value::as_u64)
            .unwrap_or(0);

        let output = json!({
            "document_id": document_id,
            "embedding_model": embedding_model,
            "chunks_embedded": chunks_embedded,
            "status": "embedded",
        });
        StageResult::completed(self.name(), output, started_at, Utc::now())
    }
}
