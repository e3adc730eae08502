//! Seed manifests: the managed resources and executions to load on start.

use std::path::Path;

use anyhow::{Context, Result};
use reaper_state::{ExecutionResource, ManagedResource, ResourceStore};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Manifest {
    pub managed: Vec<ManagedResource>,
    pub executions: Vec<ExecutionResource>,
}

impl Manifest {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read manifest {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse manifest {}", path.display()))
    }

    /// Apply every resource, managed first so owners exist before their runs.
    pub async fn apply(&self, store: &dyn ResourceStore) -> Result<usize> {
        for managed in &self.managed {
            store
                .apply_managed(managed.clone())
                .await
                .with_context(|| format!("Failed to apply managed resource {}", managed.key()))?;
        }
        for run in &self.executions {
            store
                .apply_execution(run.clone())
                .await
                .with_context(|| format!("Failed to apply execution {}", run.key()))?;
        }
        Ok(self.managed.len() + self.executions.len())
    }
}
