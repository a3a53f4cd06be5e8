// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::host::Host;
use crate::shard::{RouteTable, Shard, ShardError, ShardFactory};
use arkham_worker::FnHandler;
use async_trait::async_trait;
use serde_json::json;

#[test]
fn builtin_specs_cover_test_pools() {
    let specs = builtin_worker_specs();
    let pools: Vec<&str> = specs.iter().map(|s| s.pool.as_str()).collect();
    assert_eq!(pools, vec!["cpu-light", "cpu-heavy"]);

    // Built-in configs carry their tuned knobs.
    let echo = &specs[0];
    assert_eq!(echo.config.name, "EchoWorker");
    let slow = &specs[1];
    assert_eq!(slow.config.job_timeout.as_secs(), 10);
}

struct PoolShard;

#[async_trait]
impl Shard for PoolShard {
    fn name(&self) -> &str {
        "pools"
    }

    async fn initialize(&self, _host: &Arc<Host>) -> Result<(), ShardError> {
        Ok(())
    }

    async fn shutdown(&self) {}

    fn routes(&self) -> Option<RouteTable> {
        None
    }

    fn worker_specs(&self) -> Vec<WorkerSpec> {
        vec![WorkerSpec {
            pool: "shard-pool".to_string(),
            handler: Arc::new(FnHandler::new(|_, _| async { Ok(json!({})) })),
            config: arkham_worker::WorkerConfig::named("ShardWorker"),
        }]
    }
}

#[test]
fn assemble_registry_merges_builtin_and_shard_pools() {
    let mut shards = ShardRegistry::new();
    let factory: ShardFactory = Arc::new(|| Arc::new(PoolShard) as Arc<dyn Shard>);
    shards.register("pools", factory);

    let registry = assemble_registry(&shards);
    assert!(registry.contains("cpu-light"));
    assert!(registry.contains("cpu-heavy"));
    assert!(registry.contains("shard-pool"));
    assert_eq!(registry.config("shard-pool").unwrap().name, "ShardWorker");
}

#[test]
fn registry_without_shards_is_builtin_only() {
    let registry = assemble_registry(&ShardRegistry::new());
    let mut pools = registry.pools();
    pools.sort();
    assert_eq!(pools, vec!["cpu-heavy".to_string(), "cpu-light".to_string()]);
}
