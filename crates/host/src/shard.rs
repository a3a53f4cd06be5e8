// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shard loading and the shard contract.
//!
//! Shards are pluggable feature modules. Each one receives the host at
//! initialisation, may register worker handlers and routes, and can be
//! enabled or disabled at runtime. A fixed set of shards is protected and
//! cannot be unloaded.

use crate::host::Host;
use arkham_worker::{JobHandler, WorkerConfig};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;

/// Shards that can never be unloaded.
pub const PROTECTED_SHARDS: &[&str] = &["dashboard", "settings"];

#[derive(Debug, Error)]
pub enum ShardError {
    #[error("shard not found: {0}")]
    NotFound(String),
    #[error("shard already loaded: {0}")]
    AlreadyLoaded(String),
    #[error("cannot unload protected shard '{0}'")]
    Protected(String),
    #[error("shard {name} failed to initialize: {message}")]
    Init { name: String, message: String },
}

/// A worker implementation declared by a shard.
pub struct WorkerSpec {
    pub pool: String,
    pub handler: Arc<dyn JobHandler>,
    pub config: WorkerConfig,
}

/// One route registration a shard hands to the external HTTP collaborator.
/// The core only collects these; mounting is outside its scope.
#[derive(Debug, Clone, serde::Serialize)]
pub struct RouteDef {
    pub method: String,
    pub path: String,
}

/// The opaque router object a shard exposes.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct RouteTable {
    /// Mount prefix, e.g. `/api/patterns`.
    pub prefix: String,
    pub routes: Vec<RouteDef>,
}

/// The contract every shard implements.
#[async_trait]
pub trait Shard: Send + Sync {
    fn name(&self) -> &str;

    /// Called once at load time with the host; the shard may query services
    /// by name and keep the ones it needs.
    async fn initialize(&self, host: &Arc<Host>) -> Result<(), ShardError>;

    /// Symmetric cleanup, called on unload and at host shutdown.
    async fn shutdown(&self);

    /// Routes for the external router. Routes stay mounted until process
    /// restart even if the shard is later disabled.
    fn routes(&self) -> Option<RouteTable> {
        None
    }

    /// Badge count for the aggregated badge endpoint.
    fn badge_count(&self) -> Option<u64> {
        None
    }

    /// Badge count for one subroute.
    fn subroute_badge_count(&self, _sub_id: &str) -> Option<u64> {
        None
    }

    /// Worker implementations this shard provides; registered with the
    /// worker service at load time.
    fn worker_specs(&self) -> Vec<WorkerSpec> {
        Vec::new()
    }
}

/// Factory producing a shard instance.
pub type ShardFactory = Arc<dyn Fn() -> Arc<dyn Shard> + Send + Sync>;

/// Known shards, in registration order. Discovery (entry points, linkage)
/// is an external concern; the host is handed a populated registry.
#[derive(Clone, Default)]
pub struct ShardRegistry {
    factories: Vec<(String, ShardFactory)>,
}

impl ShardRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, factory: ShardFactory) {
        self.factories.push((name.into(), factory));
    }

    pub fn names(&self) -> Vec<&str> {
        self.factories.iter().map(|(name, _)| name.as_str()).collect()
    }

    /// Instantiate every registered shard without initialising it.
    pub fn instantiate_all(&self) -> Vec<Arc<dyn Shard>> {
        self.factories.iter().map(|(_, factory)| factory()).collect()
    }

    fn get(&self, name: &str) -> Option<&ShardFactory> {
        self.factories
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, factory)| factory)
    }
}

/// Holds the active shards and their collected routes.
#[derive(Default)]
pub struct ShardLoader {
    shards: RwLock<HashMap<String, Arc<dyn Shard>>>,
    /// Routes stay here even after a shard is disabled (mounted until
    /// restart).
    routes: RwLock<Vec<(String, RouteTable)>>,
}

impl ShardLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every registered shard, honouring the allowlist. Individual
    /// failures are logged and skipped; the host continues.
    pub async fn load_all(
        &self,
        host: &Arc<Host>,
        registry: &ShardRegistry,
        allowlist: Option<&HashSet<String>>,
    ) {
        for (name, _) in &registry.factories {
            if let Some(allowlist) = allowlist {
                if !allowlist.contains(name) {
                    tracing::info!(shard = %name, "skipping shard (not allowlisted)");
                    continue;
                }
            }
            if let Err(error) = self.load(host, registry, name).await {
                tracing::warn!(shard = %name, %error, "failed to load shard");
            }
        }
    }

    /// Load and initialize one shard by name.
    pub async fn load(
        &self,
        host: &Arc<Host>,
        registry: &ShardRegistry,
        name: &str,
    ) -> Result<(), ShardError> {
        if self.shards.read().contains_key(name) {
            return Err(ShardError::AlreadyLoaded(name.to_string()));
        }
        let factory = registry
            .get(name)
            .ok_or_else(|| ShardError::NotFound(name.to_string()))?;

        tracing::info!(shard = %name, "loading shard");
        let shard = factory();
        shard.initialize(host).await?;

        // Register the shard's workers with the dispatcher.
        if let Some(workers) = host.workers() {
            for spec in shard.worker_specs() {
                workers.register_worker(&spec.pool, spec.handler, spec.config);
            }
        }

        if let Some(table) = shard.routes() {
            self.routes.write().push((name.to_string(), table));
        }

        self.shards.write().insert(name.to_string(), shard);
        tracing::info!(shard = %name, "shard loaded");
        Ok(())
    }

    /// Disable a shard: shut it down and drop it from the active map.
    /// Its routes remain mounted until process restart.
    pub async fn unload(&self, name: &str) -> Result<(), ShardError> {
        if PROTECTED_SHARDS.contains(&name) {
            return Err(ShardError::Protected(name.to_string()));
        }
        let shard = self
            .shards
            .write()
            .remove(name)
            .ok_or_else(|| ShardError::NotFound(name.to_string()))?;

        shard.shutdown().await;
        tracing::info!(shard = %name, "shard unloaded");
        Ok(())
    }

    pub fn is_loaded(&self, name: &str) -> bool {
        self.shards.read().contains_key(name)
    }

    pub fn shard_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.shards.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Shard>> {
        self.shards.read().get(name).cloned()
    }

    /// Aggregated badge counts across loaded shards (shards without a badge
    /// are omitted).
    pub fn badge_counts(&self) -> HashMap<String, u64> {
        self.shards
            .read()
            .iter()
            .filter_map(|(name, shard)| shard.badge_count().map(|count| (name.clone(), count)))
            .collect()
    }

    /// Every collected route table, including those of disabled shards.
    pub fn routes(&self) -> Vec<(String, RouteTable)> {
        self.routes.read().clone()
    }

    /// Shut down all shards (host shutdown path).
    pub async fn shutdown_all(&self) {
        let shards: Vec<(String, Arc<dyn Shard>)> = self
            .shards
            .write()
            .drain()
            .collect();
        for (name, shard) in shards {
            tracing::info!(shard = %name, "shutting down shard");
            shard.shutdown().await;
        }
    }
}

#[cfg(test)]
#[path = "shard_tests.rs"]
mod tests;
