// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job handler trait and the pool → handler registry.

use crate::config::WorkerConfig;
use arkham_core::JobId;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;

/// Error raised by a job handler. Treated by the worker runtime like any
/// other handler fault: retry or dead-letter.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct HandlerError(pub String);

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

impl From<String> for HandlerError {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for HandlerError {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// The code that processes jobs for one pool.
#[async_trait]
pub trait JobHandler: Send + Sync {
    /// Process a job. The returned value is stored as the job result; an
    /// error marks the attempt failed (the runtime decides retry vs.
    /// dead-letter).
    async fn process(&self, job_id: &JobId, payload: Value) -> Result<Value, HandlerError>;
}

/// Adapter turning an async closure into a [`JobHandler`].
pub struct FnHandler<F>(F);

impl<F> FnHandler<F> {
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

#[async_trait]
impl<F, Fut> JobHandler for FnHandler<F>
where
    F: Fn(JobId, Value) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, HandlerError>> + Send,
{
    async fn process(&self, job_id: &JobId, payload: Value) -> Result<Value, HandlerError> {
        (self.0)(job_id.clone(), payload).await
    }
}

#[derive(Clone)]
struct HandlerEntry {
    handler: Arc<dyn JobHandler>,
    config: WorkerConfig,
}

/// Registry pairing pools with their handler and worker configuration.
///
/// Shards register handlers during initialisation; the dispatcher consults
/// the registry to decide spawn eligibility, and worker-mode processes
/// consult it to find their pool's code.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    entries: Arc<RwLock<HashMap<String, HandlerEntry>>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for a pool with default worker configuration.
    pub fn register(&self, pool: impl Into<String>, handler: Arc<dyn JobHandler>) {
        self.register_with_config(pool, handler, WorkerConfig::default());
    }

    /// Register a handler with explicit worker configuration, replacing any
    /// existing registration for the pool.
    pub fn register_with_config(
        &self,
        pool: impl Into<String>,
        handler: Arc<dyn JobHandler>,
        config: WorkerConfig,
    ) {
        let pool = pool.into();
        tracing::info!(pool, name = %config.name, "registered handler");
        self.entries
            .write()
            .insert(pool, HandlerEntry { handler, config });
    }

    /// Remove a pool's registration.
    pub fn unregister(&self, pool: &str) -> bool {
        self.entries.write().remove(pool).is_some()
    }

    pub fn contains(&self, pool: &str) -> bool {
        self.entries.read().contains_key(pool)
    }

    pub fn handler(&self, pool: &str) -> Option<Arc<dyn JobHandler>> {
        self.entries.read().get(pool).map(|e| Arc::clone(&e.handler))
    }

    pub fn config(&self, pool: &str) -> Option<WorkerConfig> {
        self.entries.read().get(pool).map(|e| e.config.clone())
    }

    /// Pools with a registered handler.
    pub fn pools(&self) -> Vec<String> {
        self.entries.read().keys().cloned().collect()
    }
}

#[cfg(test)]
#[path = "handler_tests.rs"]
mod tests;
