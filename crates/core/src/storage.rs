//! Storage coordinator: runs repository sync and refreshes open documents.
//!
//! A sync pass has two phases:
//!
//! 1. **Exchange** -- the [`SyncProvider`] fetches, merges and publishes on a
//!    blocking thread. A failure here aborts the pass.
//! 2. **Refresh** -- every live document in `read`, `saved` and `modified`
//!    state (in that order) is re-read so the editor notices files the
//!    merge changed. Per-document failures are recorded and skipped.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::document::{DocumentHandle, DocumentState};
use crate::editor::Editor;
use crate::errors::SyncError;
use crate::git::SyncProvider;

/// Outcome of one [`StorageCoordinator::sync`] pass.
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Documents that were re-read, in sweep order.
    pub reread: Vec<String>,
    /// Documents that ended the sweep in a conflict state.
    pub conflicts: Vec<String>,
    pub failures: Vec<SyncFailure>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncFailure {
    pub name: String,
    pub error: String,
}

impl SyncReport {
    fn new() -> Self {
        Self {
            started_at: Utc::now(),
            completed_at: None,
            reread: Vec::new(),
            conflicts: Vec::new(),
            failures: Vec::new(),
        }
    }
}

/// Drives sync for one [`Editor`].
pub struct StorageCoordinator {
    editor: Editor,
    provider: Option<Arc<dyn SyncProvider>>,
    /// Atomic flag preventing concurrent sync passes.
    running: Arc<AtomicBool>,
}

impl StorageCoordinator {
    pub fn new(editor: Editor, provider: Arc<dyn SyncProvider>) -> Self {
        Self {
            editor,
            provider: Some(provider),
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Coordinator without a remote; `sync` only refreshes documents.
    pub fn local(editor: Editor) -> Self {
        Self {
            editor,
            provider: None,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn editor(&self) -> &Editor {
        &self.editor
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Run one sync pass.
    pub async fn sync(&self) -> Result<SyncReport, SyncError> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(SyncError::AlreadyRunning);
        }
        let _guard = SyncLockGuard(self.running.clone());

        let mut report = SyncReport::new();
        match &self.provider {
            Some(provider) => {
                let provider = Arc::clone(provider);
                tokio::task::spawn_blocking(move || provider.sync_data())
                    .await
                    .map_err(|e| SyncError::TaskFailed(e.to_string()))??;
            }
            None => debug!("no sync provider configured, refreshing only"),
        }

        for state in [DocumentState::Read, DocumentState::Saved, DocumentState::Modified] {
            for handle in self.editor.files(state).await {
                self.refresh(&handle, &mut report).await;
            }
        }

        report.completed_at = Some(Utc::now());
        info!(
            reread = report.reread.len(),
            conflicts = report.conflicts.len(),
            failures = report.failures.len(),
            "sync pass completed"
        );
        Ok(report)
    }

    async fn refresh(&self, handle: &DocumentHandle, report: &mut SyncReport) {
        let name = handle.name().to_string();
        match handle.read().await {
            Ok(()) => {
                if handle.state().await.is_conflict() {
                    warn!(name = %name, "document in conflict after sync");
                    report.conflicts.push(name.clone());
                }
                report.reread.push(name);
            }
            Err(e) => {
                warn!(name = %name, error = %e, "failed to re-read document");
                report.failures.push(SyncFailure {
                    name,
                    error: e.to_string(),
                });
            }
        }
    }

    /// Record local changes with the provider.
    pub async fn commit(&self, message: &str) -> Result<String, SyncError> {
        let provider = self
            .provider
            .as_ref()
            .map(Arc::clone)
            .ok_or(SyncError::RepositoryNotInitialised)?;
        let message = message.to_string();
        let id = tokio::task::spawn_blocking(move || provider.commit(&message))
            .await
            .map_err(|e| SyncError::TaskFailed(e.to_string()))??;
        info!(id = %id, "committed");
        Ok(id)
    }

    /// Names of live documents in either conflict state.
    pub async fn conflicts(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .editor
            .files(DocumentState::Conflict)
            .await
            .into_iter()
            .chain(self.editor.files(DocumentState::TwoWayConflict).await)
            .map(|h| h.name().to_string())
            .collect();
        names.sort();
        names
    }
}

/// Drop guard that resets the `running` flag to `false`.
struct SyncLockGuard(Arc<AtomicBool>);

impl Drop for SyncLockGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}
