// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The host: brings up the core singletons in dependency order and serves
//! them by name.
//!
//! Order (first → last): configuration → event bus → worker service →
//! pipeline coordinator → session store → shards. A subsystem disabled by
//! flag is absent from the locator; an initialisation failure degrades the
//! locator (the slot stays absent) without aborting startup. Shutdown walks
//! the list in reverse.

use crate::config::ConfigService;
use crate::error::HostError;
use crate::session::SessionStore;
use crate::shard::{ShardLoader, ShardRegistry};
use crate::worker_main::builtin_worker_specs;
use arkham_engine::{ProcessLauncher, ServiceConfig, WorkerService};
use arkham_events::EventBus;
use arkham_pipeline::PipelineCoordinator;
use arkham_substrate::{RedisSubstrate, Substrate};
use arkham_worker::HandlerRegistry;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

static BOOTSTRAPPED: AtomicBool = AtomicBool::new(false);

/// A service resolved by name from the locator.
#[derive(Clone)]
pub enum ServiceRef {
    Config(Arc<ConfigService>),
    Events(Arc<EventBus>),
    Workers(Arc<WorkerService>),
    Pipeline(Arc<PipelineCoordinator>),
    Session(Arc<SessionStore>),
}

/// Snapshot of the host for status endpoints.
#[derive(Debug, Clone, serde::Serialize)]
pub struct HostState {
    pub version: String,
    /// Core service slots and whether they are present.
    pub services: BTreeMap<String, bool>,
    /// Subsystems disabled by configuration flags (external collaborators
    /// included).
    pub disabled: Vec<String>,
    pub shards: Vec<String>,
    pub substrate_available: bool,
}

/// The process-wide service owner.
pub struct Host {
    config: Arc<ConfigService>,
    events: Option<Arc<EventBus>>,
    workers: Option<Arc<WorkerService>>,
    pipeline: Option<Arc<PipelineCoordinator>>,
    session: Option<Arc<SessionStore>>,
    loader: ShardLoader,
}

impl std::fmt::Debug for Host {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Host").finish_non_exhaustive()
    }
}

impl Host {
    /// Bring up the host, connecting to the configured substrate.
    pub async fn bootstrap(config: ConfigService) -> Result<Arc<Self>, HostError> {
        let substrate: Option<Arc<dyn Substrate>> = if config.disabled.workers {
            None
        } else {
            match RedisSubstrate::connect(&config.substrate_url).await {
                Ok(substrate) => Some(Arc::new(substrate)),
                Err(error) => {
                    tracing::warn!(%error, "substrate connection failed, degrading");
                    None
                }
            }
        };
        Self::bootstrap_with_substrate(config, substrate).await
    }

    /// Bring up the host against an explicit substrate (or none). Fails if
    /// a host was already bootstrapped in this process.
    pub async fn bootstrap_with_substrate(
        config: ConfigService,
        substrate: Option<Arc<dyn Substrate>>,
    ) -> Result<Arc<Self>, HostError> {
        if BOOTSTRAPPED.swap(true, Ordering::SeqCst) {
            return Err(HostError::AlreadyBootstrapped);
        }

        tracing::info!("initializing host");
        let config = Arc::new(config);

        let events = if config.disabled.events {
            tracing::info!("event bus disabled via ARKHAM_DISABLE_EVENTS");
            None
        } else {
            Some(Arc::new(EventBus::new()))
        };

        let workers = if config.disabled.workers {
            tracing::info!("worker service disabled via ARKHAM_DISABLE_WORKERS");
            None
        } else {
            let bus = events.clone().unwrap_or_else(|| Arc::new(EventBus::new()));
            let service_config = ServiceConfig {
                substrate_url: config.substrate_url.clone(),
                ..ServiceConfig::default()
            };
            let launcher = Arc::new(ProcessLauncher::new(&config.substrate_url));
            let service = Arc::new(WorkerService::new(
                service_config,
                substrate,
                bus,
                HandlerRegistry::new(),
                launcher,
            ));
            for spec in builtin_worker_specs() {
                service.register_worker(&spec.pool, spec.handler, spec.config);
            }
            service.start_bridge();
            Some(service)
        };

        let pipeline = Some(Arc::new(PipelineCoordinator::new(
            workers.clone(),
            events.clone(),
        )));
        let session = Some(Arc::new(SessionStore::new()));

        let host = Arc::new(Self {
            config,
            events,
            workers,
            pipeline,
            session,
            loader: ShardLoader::new(),
        });
        tracing::info!("host initialization complete");
        Ok(host)
    }

    /// Load shards from the registry, honouring the disable flag and the
    /// allowlist.
    pub async fn load_shards(self: &Arc<Self>, registry: &ShardRegistry) {
        if self.config.disabled.shards {
            tracing::info!("shard loading disabled via ARKHAM_DISABLE_SHARDS");
            return;
        }
        self.loader
            .load_all(self, registry, self.config.shard_allowlist.as_ref())
            .await;
    }

    /// Resolve a service by its stable name.
    pub fn service(&self, name: &str) -> Option<ServiceRef> {
        match name {
            "config" => Some(ServiceRef::Config(Arc::clone(&self.config))),
            "events" => self.events.clone().map(ServiceRef::Events),
            "workers" => self.workers.clone().map(ServiceRef::Workers),
            "pipeline" => self.pipeline.clone().map(ServiceRef::Pipeline),
            "session" => self.session.clone().map(ServiceRef::Session),
            _ => None,
        }
    }

    pub fn config(&self) -> Arc<ConfigService> {
        Arc::clone(&self.config)
    }

    pub fn events(&self) -> Option<Arc<EventBus>> {
        self.events.clone()
    }

    pub fn workers(&self) -> Option<Arc<WorkerService>> {
        self.workers.clone()
    }

    pub fn pipeline(&self) -> Option<Arc<PipelineCoordinator>> {
        self.pipeline.clone()
    }

    pub fn session(&self) -> Option<Arc<SessionStore>> {
        self.session.clone()
    }

    pub fn loader(&self) -> &ShardLoader {
        &self.loader
    }

    // --- Active project (per-user; there is no process-global fallback) ---

    pub fn active_project_id(&self, user_id: &str) -> Option<String> {
        self.session.as_ref()?.active_project(user_id)
    }

    pub fn set_active_project(&self, user_id: &str, project_id: Option<&str>) {
        if let Some(session) = &self.session {
            session.set_active_project(user_id, project_id);
        }
    }

    /// Collection name scoped to the user's active project.
    pub fn collection_name(&self, base: &str, user_id: Option<&str>) -> String {
        match &self.session {
            Some(session) => session.collection_name(base, user_id),
            None => format!("arkham_{base}"),
        }
    }

    /// The documents/chunks/entities collection trio for a project.
    pub fn project_collections(
        &self,
        project_id: Option<&str>,
        user_id: Option<&str>,
    ) -> std::collections::HashMap<String, String> {
        match &self.session {
            Some(session) => session.project_collections(project_id, user_id),
            None => SessionStore::new().project_collections(project_id, None),
        }
    }

    /// Current host state for status endpoints.
    pub fn state(&self) -> HostState {
        let services = BTreeMap::from([
            ("config".to_string(), true),
            ("events".to_string(), self.events.is_some()),
            ("workers".to_string(), self.workers.is_some()),
            ("pipeline".to_string(), self.pipeline.is_some()),
            ("session".to_string(), self.session.is_some()),
        ]);

        let flags = &self.config.disabled;
        let disabled: Vec<String> = [
            ("models", flags.models),
            ("resources", flags.resources),
            ("storage", flags.storage),
            ("db", flags.db),
            ("vectors", flags.vectors),
            ("llm", flags.llm),
            ("chunks", flags.chunks),
            ("events", flags.events),
            ("workers", flags.workers),
            ("shards", flags.shards),
        ]
        .into_iter()
        .filter(|(_, disabled)| *disabled)
        .map(|(name, _)| name.to_string())
        .collect();

        HostState {
            version: env!("CARGO_PKG_VERSION").to_string(),
            services,
            disabled,
            shards: self.loader.shard_names(),
            substrate_available: self
                .workers
                .as_ref()
                .is_some_and(|workers| workers.is_available()),
        }
    }

    /// Shut down in reverse dependency order: shards, workers, events.
    pub async fn shutdown(&self) {
        tracing::info!("shutting down host");
        self.loader.shutdown_all().await;
        if let Some(workers) = &self.workers {
            workers.shutdown().await;
        }
        if let Some(events) = &self.events {
            let dropped = events.clear_history();
            tracing::debug!(dropped, "event history cleared");
        }
        tracing::info!("host shutdown complete");
    }

    /// Allow a fresh `bootstrap` in this process. Test isolation only.
    #[doc(hidden)]
    pub fn reset_bootstrap_guard() {
        BOOTSTRAPPED.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
#[path = "host_tests.rs"]
mod tests;
