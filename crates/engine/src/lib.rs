// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! arkham-engine: The coordinator side of the worker system.
//!
//! [`WorkerService`] owns job enqueueing, result waiting, worker process
//! lifecycle and auto-scaling, and the pub/sub bridge that surfaces worker
//! events on the in-process event bus.

pub mod bridge;
pub mod error;
pub mod launcher;
pub mod service;

pub use error::EngineError;
#[cfg(any(test, feature = "test-support"))]
pub use launcher::LocalLauncher;
pub use launcher::{ProcessLauncher, WorkerHandle, WorkerLauncher};
pub use service::{PoolInfo, QueueStats, ScaleOutcome, ServiceConfig, StartOutcome, WorkerService};
