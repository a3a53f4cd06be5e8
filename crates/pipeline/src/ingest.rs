// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Ingest stage: route the document to an extraction pool.

use crate::coordinator::PipelineStage;
use arkham_core::event::names;
use arkham_core::{PipelineContext, StageResult, StageStatus};
use arkham_engine::WorkerService;
use arkham_events::EventBus;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

/// How long ingest waits for the extraction job.
const DISPATCH_TIMEOUT: Duration = Duration::from_secs(120);

/// Dispatches ingestion jobs to worker pools.
///
/// Routing: documents/spreadsheets/presentations → `cpu-extract`, images →
/// `cpu-image`, archives → `cpu-archive`, everything else → `io-file`.
pub struct IngestStage {
    workers: Option<Arc<WorkerService>>,
    events: Option<Arc<EventBus>>,
}

impl IngestStage {
    pub fn new(workers: Option<Arc<WorkerService>>, events: Option<Arc<EventBus>>) -> Self {
        Self { workers, events }
    }
}

/// Select the worker pool for a file, guessing the type from the filename
/// extension when not provided.
pub fn select_pool(file_type: Option<&str>, filename: &str) -> &'static str {
    let file_type = match file_type {
        Some(t) => t.to_string(),
        None => {
            let ext = filename
                .rsplit_once('.')
                .map(|(_, ext)| ext.to_ascii_lowercase())
                .unwrap_or_default();
            match ext.as_str() {
                "pdf" | "docx" | "doc" => "document",
                "xlsx" | "xls" => "spreadsheet",
                "pptx" => "presentation",
                "png" | "jpg" | "jpeg" | "tiff" | "tif" => "image",
                "zip" | "tar" | "gz" | "7z" | "rar" => "archive",
                _ => "unknown",
            }
            .to_string()
        }
    };

    match file_type.as_str() {
        "document" | "spreadsheet" | "presentation" => "cpu-extract",
        "image" => "cpu-image",
        "archive" => "cpu-archive",
        _ => "io-file",
    }
}

fn skipped_with_reason(name: &str, reason: &str) -> StageResult {
    StageResult {
        stage_name: name.to_string(),
        status: StageStatus::Skipped,
        output: json!({"reason": reason}),
        error: None,
        started_at: Some(Utc::now()),
        completed_at: Some(Utc::now()),
    }
}

#[async_trait]
impl PipelineStage for IngestStage {
    fn name(&self) -> &str {
        "ingest"
    }

    /// A file to ingest must be present.
    async fn validate(&self, context: &PipelineContext) -> bool {
        context.contains("file_path") || context.contains("file_bytes")
    }

    async fn execute(&self, context: &PipelineContext) -> StageResult {
        let started_at = Utc::now();
        let document_id = context
            .get_str("document_id")
            .map(String::from)
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let filename = context.get_str("filename").unwrap_or("unknown").to_string();
        let file_type = context.get_str("file_type").map(String::from);

        tracing::info!(filename, "dispatching ingest");

        let Some(workers) = &self.workers else {
            tracing::warn!("worker service not available, skipping ingest dispatch");
            return skipped_with_reason(self.name(), "Worker service not available");
        };

        let mut pool = select_pool(file_type.as_deref(), &filename);
        if !workers.handlers().contains(pool) {
            // Fall back to basic file handling when the specialised pool
            // has no registered workers.
            if workers.handlers().contains("io-file") {
                pool = "io-file";
            } else {
                tracing::warn!(pool, "no workers registered for pool");
                return skipped_with_reason(self.name(), &format!("No workers for pool {pool}"));
            }
        }

        let payload = json!({
            "document_id": &document_id,
            "file_path": context.get_str("file_path"),
            "filename": &filename,
            "file_type": &file_type,
            "project_id": context.get_str("project_id"),
            "job_type": "ingest_file",
        });

        let output = match workers
            .enqueue_and_wait(pool, payload, 1, Some(DISPATCH_TIMEOUT))
            .await
        {
            Ok(result) => {
                let page_paths = result
                    .get("page_paths")
                    .cloned()
                    .unwrap_or_else(|| json!([]));
                let page_count = result
                    .get("page_count")
                    .and_then(Value::as_u64)
                    .unwrap_or_else(|| page_paths.as_array().map(|p| p.len() as u64).unwrap_or(0));

                json!({
                    "document_id": &document_id,
                    "filename": &filename,
                    "file_type": result.get("file_type").cloned().unwrap_or(Value::from(file_type)),
                    "pool_used": pool,
                    "page_count": page_count,
                    "page_paths": page_paths,
                    "has_text": result.get("has_text").and_then(Value::as_bool).unwrap_or(false),
                    "status": "ingested",
                })
            }
            Err(error) => {
                tracing::error!(%error, "ingest dispatch failed");
                json!({
                    "document_id": &document_id,
                    "filename": &filename,
                    "page_count": 0,
                    "error": error.to_string(),
                    "status": "ingest_failed",
                })
            }
        };

        if let Some(events) = &self.events {
            events
                .emit(
                    names::INGEST_DOCUMENT_COMPLETED,
                    json!({
                        "document_id": &document_id,
                        "filename": output["filename"],
                        "page_count": output["page_count"],
                    }),
                    "pipeline-ingest",
                )
                .await;
        }

        StageResult::completed(self.name(), output, started_at, Utc::now())
    }
}

#[cfg(test)]
#[path = "ingest_tests.rs"]
mod tests;
