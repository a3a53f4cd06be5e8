// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for the dispatcher.

use arkham_substrate::SubstrateError;
use thiserror::Error;

/// Errors surfaced by dispatcher operations.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("unknown worker pool: {0}")]
    UnknownPool(String),
    #[error("no worker registered for pool {0}")]
    HandlerMissing(String),
    #[error("job not found: {0}")]
    JobNotFound(String),
    #[error("failed to spawn worker for pool {pool}: {message}")]
    SpawnFailed { pool: String, message: String },
    #[error("job {job_id} timed out after {timeout_secs}s")]
    WaitTimeout { job_id: String, timeout_secs: u64 },
    #[error("job {job_id} failed: {error}")]
    JobFailed { job_id: String, error: String },
    #[error("job {0} was cancelled")]
    JobCancelled(String),
    #[error(transparent)]
    Substrate(#[from] SubstrateError),
}
