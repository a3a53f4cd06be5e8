// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker pool descriptors.
//!
//! Pools pair a named queue with a capacity cap. The built-in table covers
//! the document-processing pools; shards may add custom pools at runtime.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Category of work a pool carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PoolKind {
    Io,
    Cpu,
    Gpu,
    Llm,
    Custom,
}

impl fmt::Display for PoolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PoolKind::Io => "io",
            PoolKind::Cpu => "cpu",
            PoolKind::Gpu => "gpu",
            PoolKind::Llm => "llm",
            PoolKind::Custom => "custom",
        })
    }
}

/// Static description of a worker pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolSpec {
    pub kind: PoolKind,
    /// Hard cap on concurrent workers for this pool.
    pub max_workers: usize,
    /// GPU memory budget, for gpu pools.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vram_mb: Option<u32>,
}

impl PoolSpec {
    pub fn new(kind: PoolKind, max_workers: usize) -> Self {
        Self { kind, max_workers, vram_mb: None }
    }

    pub fn gpu(max_workers: usize, vram_mb: u32) -> Self {
        Self { kind: PoolKind::Gpu, max_workers, vram_mb: Some(vram_mb) }
    }
}

/// Default capacity for dynamically registered custom pools.
pub const CUSTOM_POOL_MAX_WORKERS: usize = 4;

/// Table of known pools, keyed by name.
#[derive(Debug, Clone)]
pub struct PoolTable {
    pools: HashMap<String, PoolSpec>,
}

impl PoolTable {
    /// The built-in pool set.
    pub fn builtin() -> Self {
        let pools = HashMap::from([
            // IO pools
            ("io-file".to_string(), PoolSpec::new(PoolKind::Io, 20)),
            ("io-db".to_string(), PoolSpec::new(PoolKind::Io, 10)),
            // CPU pools
            ("cpu-light".to_string(), PoolSpec::new(PoolKind::Cpu, 50)),
            ("cpu-heavy".to_string(), PoolSpec::new(PoolKind::Cpu, 6)),
            ("cpu-ner".to_string(), PoolSpec::new(PoolKind::Cpu, 8)),
            ("cpu-extract".to_string(), PoolSpec::new(PoolKind::Cpu, 4)),
            ("cpu-image".to_string(), PoolSpec::new(PoolKind::Cpu, 4)),
            ("cpu-archive".to_string(), PoolSpec::new(PoolKind::Cpu, 2)),
            // GPU pools
            ("gpu-paddle".to_string(), PoolSpec::gpu(1, 2000)),
            ("gpu-qwen".to_string(), PoolSpec::gpu(1, 8000)),
            ("gpu-whisper".to_string(), PoolSpec::gpu(1, 4000)),
            ("gpu-embed".to_string(), PoolSpec::gpu(1, 2000)),
            // LLM pools
            ("llm-enrich".to_string(), PoolSpec::new(PoolKind::Llm, 4)),
            ("llm-analysis".to_string(), PoolSpec::new(PoolKind::Llm, 2)),
        ]);
        Self { pools }
    }

    /// An empty table (for tests that want full control).
    pub fn empty() -> Self {
        Self { pools: HashMap::new() }
    }

    pub fn get(&self, pool: &str) -> Option<&PoolSpec> {
        self.pools.get(pool)
    }

    pub fn contains(&self, pool: &str) -> bool {
        self.pools.contains_key(pool)
    }

    /// Register a custom pool with the default capacity. No-op when the pool
    /// already exists.
    pub fn add_custom(&mut self, pool: &str) -> &PoolSpec {
        self.pools
            .entry(pool.to_string())
            .or_insert(PoolSpec::new(PoolKind::Custom, CUSTOM_POOL_MAX_WORKERS))
    }

    /// Register a pool with an explicit spec, replacing any existing entry.
    pub fn insert(&mut self, pool: impl Into<String>, spec: PoolSpec) {
        self.pools.insert(pool.into(), spec);
    }

    /// Pool names in unspecified order.
    pub fn names(&self) -> Vec<&str> {
        self.pools.keys().map(String::as_str).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &PoolSpec)> {
        self.pools.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.pools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }
}

impl Default for PoolTable {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
#[path = "pool_tests.rs"]
mod tests;
