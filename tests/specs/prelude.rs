// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared fixture for dispatch specs: a worker service wired to the
//! in-memory substrate and in-process launcher.

use arkham_engine::{LocalLauncher, ServiceConfig, WorkerService};
use arkham_events::EventBus;
use arkham_substrate::MemorySubstrate;
pub use arkham_substrate::Substrate;
use arkham_worker::{FnHandler, HandlerError, HandlerRegistry, WorkerConfig};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

pub struct Fixture {
    pub service: Arc<WorkerService>,
    pub substrate: MemorySubstrate,
    pub events: Arc<EventBus>,
}

/// Build a dispatcher over a fresh in-memory substrate and wait until its
/// pub/sub bridge is listening.
pub async fn fixture() -> Fixture {
    let substrate = MemorySubstrate::new();
    let events = Arc::new(EventBus::new());
    let handlers = HandlerRegistry::new();
    let launcher = Arc::new(LocalLauncher::new(
        Arc::new(substrate.clone()),
        handlers.clone(),
    ));
    let config = ServiceConfig {
        wait_poll_interval: Duration::from_millis(50),
        stop_grace: Duration::from_secs(1),
        shutdown_grace: Duration::from_secs(10),
        ..ServiceConfig::default()
    };
    let service = Arc::new(WorkerService::new(
        config,
        Some(Arc::new(substrate.clone())),
        Arc::clone(&events),
        handlers,
        launcher,
    ));
    service.start_bridge();
    while substrate.subscriber_count() == 0 {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    Fixture { service, substrate, events }
}

/// Worker knobs tuned for paused-time tests.
pub fn fast_config() -> WorkerConfig {
    WorkerConfig {
        poll_interval: Duration::from_millis(50),
        heartbeat_interval: Duration::from_secs(1),
        idle_timeout: Duration::from_secs(60),
        job_timeout: Duration::from_secs(5),
        max_retries: 2,
        ..WorkerConfig::named("SpecWorker")
    }
}

/// Register an echo handler: `{"msg": x}` → `{"echo": x}`.
pub fn register_echo(fixture: &Fixture, pool: &str) {
    fixture.service.register_worker(
        pool,
        Arc::new(FnHandler::new(|_, payload: Value| async move {
            Ok(json!({"echo": payload["msg"]}))
        })),
        fast_config(),
    );
}

/// Register a handler that always fails with `message`.
pub fn register_failing(fixture: &Fixture, pool: &str, message: &str) {
    let message = message.to_string();
    fixture.service.register_worker(
        pool,
        Arc::new(FnHandler::new(move |_, _| {
            let message = message.clone();
            async move { Err::<Value, _>(HandlerError::new(message)) }
        })),
        fast_config(),
    );
}

/// Poll a condition under paused time until it holds or `max_ms` elapses.
pub async fn wait_until(mut cond: impl FnMut() -> bool, max_ms: u64) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_millis(max_ms);
    loop {
        if cond() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
