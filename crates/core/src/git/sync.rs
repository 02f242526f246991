//! Repository-level sync capability.

use std::path::Path;
use std::sync::Mutex;

use git2::Signature;
use tracing::{info, instrument};

use super::client::{GitClient, MergeOutcome};
use crate::config::GitConfig;
use crate::errors::{GitError, SyncError};

/// Exchanges the data directory's contents with a remote.
///
/// Calls block; async callers run them on a blocking thread.
pub trait SyncProvider: Send + Sync {
    /// Fetch, merge and publish. Conflicting edits are left in the files as
    /// conflict markers.
    fn sync_data(&self) -> Result<(), SyncError>;

    /// Record local changes and return the resulting revision id.
    fn commit(&self, message: &str) -> Result<String, SyncError>;
}

/// Where and as whom a [`GitSync`] publishes.
#[derive(Debug, Clone)]
pub struct GitSettings {
    pub remote: String,
    pub branch: String,
    pub token: Option<String>,
    pub author_name: String,
    pub author_email: String,
}

impl Default for GitSettings {
    fn default() -> Self {
        Self {
            remote: "origin".into(),
            branch: "main".into(),
            token: None,
            author_name: "docsync".into(),
            author_email: "docsync@localhost".into(),
        }
    }
}

impl From<&GitConfig> for GitSettings {
    fn from(config: &GitConfig) -> Self {
        Self {
            remote: config.remote.clone(),
            branch: config.branch.clone(),
            token: config.token.clone(),
            author_name: config.author_name.clone(),
            author_email: config.author_email.clone(),
        }
    }
}

/// [`SyncProvider`] backed by a git working copy.
pub struct GitSync {
    client: Mutex<GitClient>,
    settings: GitSettings,
}

impl GitSync {
    pub fn new(client: GitClient, settings: GitSettings) -> Self {
        Self {
            client: Mutex::new(client),
            settings,
        }
    }

    /// Open the working copy at `data_dir`, cloning `remote_url` into it
    /// first if it is not a repository yet.
    pub fn open_or_clone(config: &GitConfig, data_dir: &Path) -> Result<Self, GitError> {
        let client = if data_dir.join(".git").exists() {
            GitClient::new(data_dir)?
        } else {
            GitClient::clone_repo(&config.remote_url, data_dir, config.token.as_deref())?
        };
        Ok(Self::new(client, GitSettings::from(config)))
    }

    pub fn settings(&self) -> &GitSettings {
        &self.settings
    }

    fn signature(&self) -> Result<Signature<'static>, GitError> {
        Ok(Signature::now(&self.settings.author_name, &self.settings.author_email)?)
    }

    fn client(&self) -> std::sync::MutexGuard<'_, GitClient> {
        self.client.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl SyncProvider for GitSync {
    #[instrument(skip(self), fields(remote = %self.settings.remote, branch = %self.settings.branch))]
    fn sync_data(&self) -> Result<(), SyncError> {
        let client = self.client();
        let settings = &self.settings;
        let token = settings.token.as_deref();

        client.fetch(&settings.remote, token)?;
        let outcome = client.merge_remote(&settings.remote, &settings.branch, &self.signature()?)?;
        if let MergeOutcome::Merged { conflicted } = &outcome {
            if !conflicted.is_empty() {
                info!(files = ?conflicted, "merged with conflicts");
            }
        }

        let ahead = client.commits_ahead(&settings.remote, &settings.branch)?;
        if ahead > 0 {
            client.push(&settings.remote, &settings.branch, token)?;
        }
        info!(?outcome, pushed = ahead, "sync completed");
        Ok(())
    }

    #[instrument(skip(self, message))]
    fn commit(&self, message: &str) -> Result<String, SyncError> {
        let oid = self.client().commit(message, &self.signature()?)?;
        Ok(oid.to_string())
    }
}
