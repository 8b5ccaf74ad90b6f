//! Shared application state.

use crate::config::ServiceConfig;
use crate::error::{ApiError, StartupError};
use crate::shell::ShellRunner;
use crate::snippet::SnippetRunner;
use crate::workspace::Workspace;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info, warn};

/// Everything a handler needs. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub workspace: Workspace,
    pub shell: Arc<ShellRunner>,
    pub snippets: Arc<SnippetRunner>,
    /// Admission gate for executions; file operations and health bypass it.
    gate: Arc<Semaphore>,
}

impl AppState {
    pub fn new(workspace: Workspace, interpreter: impl Into<PathBuf>, max_concurrent: usize) -> Self {
        let max_concurrent = max_concurrent.max(1);
        Self {
            shell: Arc::new(ShellRunner::new(workspace.clone())),
            snippets: Arc::new(SnippetRunner::new(workspace.clone(), interpreter)),
            workspace,
            gate: Arc::new(Semaphore::new(max_concurrent)),
        }
    }

    pub fn from_config(config: &ServiceConfig) -> Result<Self, StartupError> {
        let workspace =
            Workspace::open(&config.workspace).map_err(|source| StartupError::Workspace {
                path: config.workspace.display().to_string(),
                source,
            })?;
        let state = Self::new(
            workspace,
            config.resolve_interpreter(),
            config.max_concurrent,
        );
        let bindings = state.snippets.bindings();
        if bindings.is_empty() {
            warn!("No snippet bindings configured");
        }
        info!(
            workspace = %state.workspace.root().display(),
            interpreter = %state.snippets.interpreter().display(),
            bindings = bindings.len(),
            max_concurrent = config.max_concurrent,
            "Execution state ready"
        );
        Ok(state)
    }

    /// Wait for an execution slot. The slot is held until the permit drops.
    pub async fn admit(&self) -> Result<OwnedSemaphorePermit, ApiError> {
        if self.gate.available_permits() == 0 {
            debug!("All execution slots busy, queueing");
        }
        Arc::clone(&self.gate)
            .acquire_owned()
            .await
            .map_err(|e| ApiError::Internal(format!("Failed to acquire execution slot: {e}")))
    }

    pub fn available_slots(&self) -> usize {
        self.gate.available_permits()
    }
}
