// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The stage machine.

use crate::error::PipelineError;
use arkham_core::{PipelineContext, StageResult};
use arkham_engine::WorkerService;
use arkham_events::EventBus;
use async_trait::async_trait;
use indexmap::IndexMap;
use std::sync::Arc;
use tokio::time::Instant;

/// One stage of the document pipeline.
#[async_trait]
pub trait PipelineStage: Send + Sync {
    fn name(&self) -> &str;

    /// Can this stage run given the current context?
    async fn validate(&self, context: &PipelineContext) -> bool;

    /// Should this stage be skipped outright?
    fn should_skip(&self, _context: &PipelineContext) -> bool {
        false
    }

    /// Run the stage. Output is merged into the context on success.
    async fn execute(&self, context: &PipelineContext) -> StageResult;
}

/// Runs stages in order, threading the context through them.
pub struct PipelineCoordinator {
    stages: Vec<Arc<dyn PipelineStage>>,
}

impl PipelineCoordinator {
    /// Coordinator with the standard stages: Ingest → OCR → Parse → Embed.
    pub fn new(workers: Option<Arc<WorkerService>>, events: Option<Arc<EventBus>>) -> Self {
        let stages: Vec<Arc<dyn PipelineStage>> = vec![
            Arc::new(crate::ingest::IngestStage::new(workers.clone(), events)),
            Arc::new(crate::ocr::OcrStage::new(workers.clone())),
            Arc::new(crate::parse::ParseStage::new(workers.clone())),
            Arc::new(crate::embed::EmbedStage::new(workers)),
        ];
        tracing::info!(
            stages = ?stages.iter().map(|s| s.name().to_string()).collect::<Vec<_>>(),
            "pipeline initialized"
        );
        Self { stages }
    }

    /// Coordinator with no stages (for custom assemblies).
    pub fn empty() -> Self {
        Self { stages: Vec::new() }
    }

    pub fn add_stage(&mut self, stage: Arc<dyn PipelineStage>) {
        self.stages.push(stage);
    }

    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    fn stage_index(&self, name: &str) -> Result<usize, PipelineError> {
        self.stages
            .iter()
            .position(|s| s.name() == name)
            .ok_or_else(|| PipelineError::UnknownStage(name.to_string()))
    }

    /// Run the pipeline over `context`, optionally restricted to the
    /// inclusive `start_stage..=end_stage` range.
    ///
    /// A stage whose skip predicate fires is recorded as skipped and the
    /// run continues. A failed validation or execution aborts the run with
    /// that stage's result recorded. A start index past the end index
    /// yields an empty result map and no side effects.
    pub async fn process(
        &self,
        context: PipelineContext,
        start_stage: Option<&str>,
        end_stage: Option<&str>,
    ) -> Result<IndexMap<String, StageResult>, PipelineError> {
        let start_idx = match start_stage {
            Some(name) => self.stage_index(name)?,
            None => 0,
        };
        let end_idx = match end_stage {
            Some(name) => self.stage_index(name)? + 1,
            None => self.stages.len(),
        };

        let mut results = IndexMap::new();
        let mut current = context;

        for stage in self
            .stages
            .iter()
            .skip(start_idx)
            .take(end_idx.saturating_sub(start_idx))
        {
            let name = stage.name().to_string();
            tracing::info!(stage = %name, "running stage");
            let stage_started = Instant::now();

            if stage.should_skip(&current) {
                results.insert(name.clone(), StageResult::skipped(&name));
                tracing::info!(stage = %name, "stage skipped");
                continue;
            }

            if !stage.validate(&current).await {
                tracing::error!(stage = %name, "stage validation failed");
                results.insert(
                    name.clone(),
                    StageResult::failed(&name, "Validation failed", None, chrono::Utc::now()),
                );
                break;
            }

            let result = stage.execute(&current).await;
            let elapsed_ms = stage_started.elapsed().as_millis() as u64;
            tracing::info!(stage = %name, status = %result.status, elapsed_ms, "stage finished");

            let success = result.success();
            if success {
                current.merge(&result.output);
            }
            let error = result.error.clone();
            results.insert(name.clone(), result);

            if !success {
                tracing::error!(stage = %name, ?error, "stage failed, aborting pipeline");
                break;
            }
        }

        Ok(results)
    }
}

#[cfg(test)]
#[path = "coordinator_tests.rs"]
mod tests;
