// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! arkham-host: Process lifecycle, service locator, and shard loading.
//!
//! The `arkhamd` binary runs in two modes: host mode (the long-lived
//! coordinator process that owns the event bus, the worker service, the
//! pipeline, and the loaded shards) and worker mode (a single worker bound
//! to one pool, spawned by the dispatcher).

pub mod config;
pub mod error;
pub mod host;
pub mod port;
pub mod session;
pub mod shard;
pub mod worker_main;

pub use config::{ConfigService, SubsystemFlags};
pub use error::HostError;
pub use host::{Host, HostState, ServiceRef};
pub use session::SessionStore;
pub use shard::{
    RouteTable, Shard, ShardError, ShardLoader, ShardRegistry, WorkerSpec, PROTECTED_SHARDS,
};
