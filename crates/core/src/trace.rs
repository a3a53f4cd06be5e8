// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Ambient trace-id propagation.
//!
//! Each inbound request installs a trace id into its task; event emission,
//! job dispatch, and worker-side publication all read it from here and carry
//! it forward across process boundaries.

use std::future::Future;

tokio::task_local! {
    static TRACE_ID: String;
}

/// Run a future with the given ambient trace id installed.
pub async fn with_trace_id<F>(trace_id: impl Into<String>, fut: F) -> F::Output
where
    F: Future,
{
    TRACE_ID.scope(trace_id.into(), fut).await
}

/// The ambient trace id of the current task, when one is installed.
pub fn current_trace_id() -> Option<String> {
    TRACE_ID.try_with(|id| id.clone()).ok()
}

#[cfg(test)]
#[path = "trace_tests.rs"]
mod tests;
