//! Local Git repository operations via `git2`.

use std::path::{Path, PathBuf};

use git2::{
    build::CheckoutBuilder, Cred, ErrorCode, FetchOptions, IndexAddOption, Oid, PushOptions,
    RemoteCallbacks, Repository, Signature,
};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::errors::GitError;

/// High-level Git client wrapping a `git2::Repository`.
pub struct GitClient {
    repo: Repository,
    repo_path: PathBuf,
}

/// What merging the remote branch into HEAD did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum MergeOutcome {
    /// The remote has no such branch yet.
    NoRemoteBranch,
    UpToDate,
    FastForward,
    /// A merge commit was created. Paths listed in `conflicted` were
    /// committed with conflict markers in them.
    Merged { conflicted: Vec<String> },
}

fn callbacks(token: Option<&str>) -> RemoteCallbacks<'static> {
    let mut callbacks = RemoteCallbacks::new();
    if let Some(tok) = token {
        let tok = tok.to_string();
        callbacks.credentials(move |_url, _username, _allowed| {
            Cred::userpass_plaintext("x-access-token", &tok)
        });
    }
    callbacks
}

impl GitClient {
    /// Open an existing Git repository at `repo_path`.
    pub fn new<P: AsRef<Path>>(repo_path: P) -> Result<Self, GitError> {
        let path = repo_path.as_ref();
        info!(path = %path.display(), "opening git repository");
        let repo = Repository::open(path)
            .map_err(|_| GitError::RepositoryNotFound(path.display().to_string()))?;
        Ok(Self { repo, repo_path: path.to_path_buf() })
    }

    /// Clone a remote repository to `path`.
    #[instrument(skip(token), fields(url = %url, path = %path.display()))]
    pub fn clone_repo(url: &str, path: &Path, token: Option<&str>) -> Result<Self, GitError> {
        info!("cloning git repository");
        let mut fetch_opts = FetchOptions::new();
        fetch_opts.remote_callbacks(callbacks(token));
        let mut builder = git2::build::RepoBuilder::new();
        builder.fetch_options(fetch_opts);
        let repo = builder.clone(url, path)?;
        info!("clone completed");
        Ok(Self { repo, repo_path: path.to_path_buf() })
    }

    pub fn repo_path(&self) -> &Path { &self.repo_path }
    pub fn repo(&self) -> &Repository { &self.repo }

    /// Fetch from a named remote.
    #[instrument(skip(self, token))]
    pub fn fetch(&self, remote_name: &str, token: Option<&str>) -> Result<(), GitError> {
        info!(remote = remote_name, "fetching");
        let mut remote = self.repo.find_remote(remote_name)?;
        let mut fetch_opts = FetchOptions::new();
        fetch_opts.remote_callbacks(callbacks(token));
        remote.fetch(&[] as &[&str], Some(&mut fetch_opts), None)?;
        debug!("fetch completed");
        Ok(())
    }

    /// Merge `refs/remotes/<remote>/<branch>` into HEAD.
    ///
    /// Fast-forwards when possible. Otherwise performs a real merge; any
    /// textual conflicts are left in the working tree as conflict markers
    /// and committed as-is, so the files themselves carry both versions.
    #[instrument(skip(self, signature))]
    pub fn merge_remote(
        &self,
        remote_name: &str,
        branch: &str,
        signature: &Signature<'_>,
    ) -> Result<MergeOutcome, GitError> {
        let remote_ref = format!("refs/remotes/{}/{}", remote_name, branch);
        let reference = match self.repo.find_reference(&remote_ref) {
            Ok(r) => r,
            Err(e) if e.code() == ErrorCode::NotFound => {
                debug!(%remote_ref, "remote branch does not exist");
                return Ok(MergeOutcome::NoRemoteBranch);
            }
            Err(e) => return Err(e.into()),
        };
        let theirs = self.repo.reference_to_annotated_commit(&reference)?;
        let (analysis, _) = self.repo.merge_analysis(&[&theirs])?;

        if analysis.is_up_to_date() {
            debug!("already up to date");
            return Ok(MergeOutcome::UpToDate);
        }

        let local_ref = format!("refs/heads/{}", branch);
        if analysis.is_unborn() || analysis.is_fast_forward() {
            match self.repo.find_reference(&local_ref) {
                Ok(mut r) => {
                    r.set_target(theirs.id(), "docsync: fast-forward")?;
                }
                Err(_) => {
                    self.repo.reference(&local_ref, theirs.id(), true, "docsync: fast-forward")?;
                }
            }
            self.repo.set_head(&local_ref)?;
            self.repo.checkout_head(Some(CheckoutBuilder::new().force()))?;
            info!(sha = %theirs.id(), "fast-forwarded");
            return Ok(MergeOutcome::FastForward);
        }

        let mut checkout = CheckoutBuilder::new();
        checkout.allow_conflicts(true).conflict_style_merge(true);
        self.repo.merge(&[&theirs], None, Some(&mut checkout))?;

        let mut index = self.repo.index()?;
        let mut conflicted = Vec::new();
        if index.has_conflicts() {
            for conflict in index.conflicts()? {
                let conflict = conflict?;
                if let Some(entry) = conflict.our.or(conflict.their) {
                    conflicted.push(String::from_utf8_lossy(&entry.path).into_owned());
                }
            }
        }
        for path in &conflicted {
            warn!(path = %path, "merge conflict, committing markers");
            index.add_path(Path::new(path))?;
        }
        index.add_all(["*"].iter(), IndexAddOption::DEFAULT, None)?;
        index.write()?;

        let tree = self.repo.find_tree(index.write_tree()?)?;
        let ours = self.repo.head()?.peel_to_commit()?;
        let theirs_commit = self.repo.find_commit(theirs.id())?;
        let message = format!("Merge {}/{}", remote_name, branch);
        let oid = self.repo.commit(
            Some("HEAD"),
            signature,
            signature,
            &message,
            &tree,
            &[&ours, &theirs_commit],
        )?;
        self.repo.cleanup_state()?;
        info!(sha = %oid, conflicts = conflicted.len(), "merge committed");
        Ok(MergeOutcome::Merged { conflicted })
    }

    /// Stage all changes and create a commit. Returns the HEAD id unchanged
    /// when the tree matches HEAD.
    #[instrument(skip(self, message, signature))]
    pub fn commit(&self, message: &str, signature: &Signature<'_>) -> Result<Oid, GitError> {
        let mut index = self.repo.index()?;
        index.add_all(["*"].iter(), IndexAddOption::DEFAULT, None)?;
        index.update_all(["*"].iter(), None)?;
        index.write()?;
        let tree_oid = index.write_tree()?;
        let tree = self.repo.find_tree(tree_oid)?;
        let parent_commit = match self.repo.head() {
            Ok(head) => Some(head.peel_to_commit()?),
            Err(_) => None,
        };
        if let Some(parent) = &parent_commit {
            if parent.tree_id() == tree_oid {
                debug!("nothing to commit");
                return Ok(parent.id());
            }
        }
        let parents: Vec<&git2::Commit> = parent_commit.iter().collect();
        let oid = self.repo.commit(Some("HEAD"), signature, signature, message, &tree, &parents)?;
        info!(sha = %oid, "created commit");
        Ok(oid)
    }

    /// Push a local branch to a remote.
    #[instrument(skip(self, token))]
    pub fn push(&self, remote_name: &str, branch: &str, token: Option<&str>) -> Result<(), GitError> {
        info!(remote = remote_name, branch, "pushing");
        let mut remote = self.repo.find_remote(remote_name)?;
        let mut callbacks = callbacks(token);
        let push_error = std::sync::Arc::new(std::sync::Mutex::new(None::<String>));
        let push_error_clone = push_error.clone();
        callbacks.push_update_reference(move |refname, status| {
            if let Some(msg) = status {
                warn!(refname, msg, "push rejected");
                *push_error_clone.lock().unwrap_or_else(|e| e.into_inner()) = Some(msg.to_string());
            }
            Ok(())
        });
        let mut push_opts = PushOptions::new();
        push_opts.remote_callbacks(callbacks);
        let refspec = format!("refs/heads/{}:refs/heads/{}", branch, branch);
        remote.push(&[&refspec], Some(&mut push_opts))?;
        if let Some(err_msg) = push_error.lock().unwrap_or_else(|e| e.into_inner()).take() {
            return Err(GitError::PushRejected { branch: branch.to_string(), detail: err_msg });
        }
        info!("push completed");
        Ok(())
    }

    /// Commits on the local branch that the remote-tracking branch lacks.
    pub fn commits_ahead(&self, remote_name: &str, branch: &str) -> Result<usize, GitError> {
        let local = match self.repo.head() {
            Ok(head) => head.peel_to_commit()?.id(),
            Err(_) => return Ok(0),
        };
        let remote_ref = format!("refs/remotes/{}/{}", remote_name, branch);
        match self.repo.refname_to_id(&remote_ref) {
            Ok(upstream) => Ok(self.repo.graph_ahead_behind(local, upstream)?.0),
            Err(e) if e.code() == ErrorCode::NotFound => Ok(1),
            Err(e) => Err(e.into()),
        }
    }

    /// Return the SHA of HEAD.
    pub fn get_head_sha(&self) -> Result<String, GitError> {
        let head = self.repo.head()?;
        let commit = head.peel_to_commit()?;
        Ok(commit.id().to_string())
    }
}
