// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! OCR stage.

use crate::coordinator::PipelineStage;
use arkham_core::{PipelineContext, StageResult};
use arkham_engine::WorkerService;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

const DISPATCH_TIMEOUT: Duration = Duration::from_secs(300);

/// Runs OCR over document pages. Skipped entirely when the document
/// already carries a text layer.
pub struct OcrStage {
    workers: Option<Arc<WorkerService>>,
}

impl OcrStage {
    pub fn new(workers: Option<Arc<WorkerService>>) -> Self {
        Self { workers }
    }
}

fn engine_pool(engine: &str) -> &'static str {
    match engine {
        "qwen" => "gpu-qwen",
        _ => "gpu-paddle",
    }
}

#[async_trait]
impl PipelineStage for OcrStage {
    fn name(&self) -> &str {
        "ocr"
    }

    async fn validate(&self, context: &PipelineContext) -> bool {
        context.contains("document_id") || context.contains("page_paths")
    }

    fn should_skip(&self, context: &PipelineContext) -> bool {
        context.get_bool("has_text").unwrap_or(false)
    }

    async fn execute(&self, context: &PipelineContext) -> StageResult {
        let started_at = Utc::now();
        let document_id = context.get_str("document_id").unwrap_or_default().to_string();
        let ocr_engine = context.get_str("ocr_engine").unwrap_or("paddle").to_string();

        tracing::info!(document_id, ocr_engine, "running ocr");

        let pool = engine_pool(&ocr_engine);
        let dispatched = match &self.workers {
            Some(workers) if workers.handlers().contains(pool) => {
                let payload = json!({
                    "document_id": &document_id,
                    "page_paths": context.get("page_paths").cloned().unwrap_or_else(|| json!([])),
                    "ocr_engine": &ocr_engine,
                    "job_type": "ocr_pages",
                });
                match workers
                    .enqueue_and_wait(pool, payload, 1, Some(DISPATCH_TIMEOUT))
                    .await
                {
                    Ok(result) => Some(result),
                    Err(error) => {
                        tracing::error!(%error, "ocr dispatch failed");
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

        let pages_processed = dispatched
            .as_ref()
            .and_then(|r| r.get("pages_processed"))
            .and_then(Value::as_u64)
            .unwrap_or(0);

        let output = json!({
            "document_id": document_id,
            "ocr_engine": ocr_engine,
            "pages_processed": pages_processed,
            "status": "ocr_complete",
        });
        StageResult::completed(self.name(), output, started_at, Utc::now())
    }
}

#[cfg(test)]
#[path = "ocr_tests.rs"]
mod tests;
