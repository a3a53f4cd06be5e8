// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Configuration: environment variables first, optional TOML file second.

use crate::error::HostError;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

/// Default substrate endpoint.
pub const DEFAULT_SUBSTRATE_URL: &str = "redis://localhost:6379";

/// Default HTTP port claimed for the external router.
pub const DEFAULT_PORT: u16 = 8420;

/// Per-subsystem disable flags (`ARKHAM_DISABLE_*`). A disabled subsystem
/// is absent from the service locator.
#[derive(Debug, Clone, Copy, Default)]
pub struct SubsystemFlags {
    pub models: bool,
    pub resources: bool,
    pub storage: bool,
    pub db: bool,
    pub vectors: bool,
    pub llm: bool,
    pub chunks: bool,
    pub events: bool,
    pub workers: bool,
    pub shards: bool,
}

/// Typed configuration for the host process.
#[derive(Debug, Clone)]
pub struct ConfigService {
    pub substrate_url: String,
    pub port: u16,
    pub state_dir: PathBuf,
    pub force_port_kill: bool,
    pub serve_shell: bool,
    /// When set, only these shards are loaded.
    pub shard_allowlist: Option<HashSet<String>>,
    pub disabled: SubsystemFlags,
    /// Unrecognised keys from the TOML file, reachable via dotted paths.
    extras: toml::Table,
}

fn flag(vars: &HashMap<String, String>, key: &str) -> bool {
    vars.get(key)
        .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes"))
        .unwrap_or(false)
}

impl ConfigService {
    /// Load from the process environment and the optional `ARKHAM_CONFIG`
    /// TOML file.
    pub fn load() -> Result<Self, HostError> {
        let vars: HashMap<String, String> = std::env::vars().collect();
        let file = match vars.get("ARKHAM_CONFIG") {
            Some(path) => Some(std::fs::read_to_string(path).map_err(|e| {
                HostError::Config(format!("cannot read config file {path}: {e}"))
            })?),
            None => None,
        };
        Self::from_sources(&vars, file.as_deref())
    }

    /// Build from explicit sources (testable without touching the real
    /// environment).
    pub fn from_sources(
        vars: &HashMap<String, String>,
        file: Option<&str>,
    ) -> Result<Self, HostError> {
        let extras: toml::Table = match file {
            Some(contents) => contents
                .parse()
                .map_err(|e| HostError::Config(format!("invalid config file: {e}")))?,
            None => toml::Table::new(),
        };

        let substrate_url = vars
            .get("ARKHAM_SUBSTRATE_URL")
            .or_else(|| vars.get("REDIS_URL"))
            .cloned()
            .or_else(|| {
                extras
                    .get("substrate_url")
                    .and_then(|v| v.as_str())
                    .map(String::from)
            })
            .unwrap_or_else(|| DEFAULT_SUBSTRATE_URL.to_string());

        let port = match vars.get("ARKHAM_PORT") {
            Some(raw) => raw
                .parse()
                .map_err(|_| HostError::Config(format!("invalid ARKHAM_PORT: {raw}")))?,
            None => extras
                .get("port")
                .and_then(|v| v.as_integer())
                .map(|p| p as u16)
                .unwrap_or(DEFAULT_PORT),
        };

        let state_dir = vars
            .get("ARKHAM_STATE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(default_state_dir);

        let shard_allowlist = vars.get("ARKHAM_SHARDS").and_then(|raw| {
            let set: HashSet<String> = raw
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
            if set.is_empty() {
                None
            } else {
                Some(set)
            }
        });

        let disabled = SubsystemFlags {
            models: flag(vars, "ARKHAM_DISABLE_MODELS"),
            resources: flag(vars, "ARKHAM_DISABLE_RESOURCES"),
            storage: flag(vars, "ARKHAM_DISABLE_STORAGE"),
            db: flag(vars, "ARKHAM_DISABLE_DB"),
            vectors: flag(vars, "ARKHAM_DISABLE_VECTORS"),
            llm: flag(vars, "ARKHAM_DISABLE_LLM"),
            chunks: flag(vars, "ARKHAM_DISABLE_CHUNKS"),
            events: flag(vars, "ARKHAM_DISABLE_EVENTS"),
            workers: flag(vars, "ARKHAM_DISABLE_WORKERS"),
            shards: flag(vars, "ARKHAM_DISABLE_SHARDS"),
        };

        Ok(Self {
            substrate_url,
            port,
            state_dir,
            force_port_kill: flag(vars, "ARKHAM_FORCE_PORT_KILL"),
            serve_shell: flag(vars, "ARKHAM_SERVE_SHELL"),
            shard_allowlist,
            disabled,
            extras,
        })
    }

    /// Read an extra config value by dotted path (`"llm.endpoint"`).
    pub fn get(&self, dotted: &str) -> Option<&toml::Value> {
        let mut parts = dotted.split('.');
        let first = parts.next()?;
        let mut value = self.extras.get(first)?;
        for part in parts {
            value = value.as_table()?.get(part)?;
        }
        Some(value)
    }

    /// Set an extra config value by dotted path, creating tables as needed.
    pub fn set(&mut self, dotted: &str, value: toml::Value) {
        let mut parts: Vec<&str> = dotted.split('.').collect();
        let Some(last) = parts.pop() else {
            return;
        };

        let mut table = &mut self.extras;
        for part in parts {
            let entry = table
                .entry(part.to_string())
                .or_insert_with(|| toml::Value::Table(toml::Table::new()));
            if !entry.is_table() {
                *entry = toml::Value::Table(toml::Table::new());
            }
            // Just inserted or replaced with a table above.
            match entry.as_table_mut() {
                Some(t) => table = t,
                None => return,
            }
        }
        table.insert(last.to_string(), value);
    }

    pub fn log_path(&self) -> PathBuf {
        self.state_dir.join("arkhamd.log")
    }

    pub fn lock_path(&self) -> PathBuf {
        self.state_dir.join("arkhamd.lock")
    }
}

fn default_state_dir() -> PathBuf {
    dirs::state_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join("arkham")
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
