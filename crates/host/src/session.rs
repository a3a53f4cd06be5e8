// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-user session state: the active project.
//!
//! Collection names are scoped to the user's active project so that vector
//! and document collections stay isolated per investigation.

use parking_lot::RwLock;
use std::collections::HashMap;

/// Prefix used for unscoped (global) collections.
const GLOBAL_PREFIX: &str = "arkham";

/// In-process store of per-user session state. Durable session storage is
/// an external collaborator; the host only needs the active-project lookup.
#[derive(Default)]
pub struct SessionStore {
    active_projects: RwLock<HashMap<String, String>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The user's active project, if any.
    pub fn active_project(&self, user_id: &str) -> Option<String> {
        self.active_projects.read().get(user_id).cloned()
    }

    /// Set or clear the user's active project.
    pub fn set_active_project(&self, user_id: &str, project_id: Option<&str>) {
        let mut projects = self.active_projects.write();
        match project_id {
            Some(project_id) => {
                projects.insert(user_id.to_string(), project_id.to_string());
                tracing::info!(user_id, project_id, "active project set");
            }
            None => {
                projects.remove(user_id);
                tracing::info!(user_id, "active project cleared");
            }
        }
    }

    /// Collection name scoped to the user's active project:
    /// `project_{id}_{base}` when one is set, `arkham_{base}` otherwise.
    pub fn collection_name(&self, base: &str, user_id: Option<&str>) -> String {
        let active = user_id.and_then(|u| self.active_project(u));
        match active {
            Some(project_id) => format!("project_{project_id}_{base}"),
            None => format!("{GLOBAL_PREFIX}_{base}"),
        }
    }

    /// The full collection trio for a project (explicit id wins over the
    /// user's active project).
    pub fn project_collections(
        &self,
        project_id: Option<&str>,
        user_id: Option<&str>,
    ) -> HashMap<String, String> {
        let active;
        let pid = match project_id {
            Some(pid) => Some(pid),
            None => {
                active = user_id.and_then(|u| self.active_project(u));
                active.as_deref()
            }
        };
        let prefix = match pid {
            Some(pid) => format!("project_{pid}_"),
            None => format!("{GLOBAL_PREFIX}_"),
        };

        ["documents", "chunks", "entities"]
            .into_iter()
            .map(|base| (base.to_string(), format!("{prefix}{base}")))
            .collect()
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
