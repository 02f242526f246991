//! Error types for the docsync core library.
//!
//! Each subsystem has its own error type derived with `thiserror`, and a
//! top-level [`CoreError`] enum unifies them all for callers that want a
//! single error type.

use thiserror::Error;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Unified error type for the entire core library.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Editor(#[from] EditorError),

    #[error(transparent)]
    FileSystem(#[from] FileSystemError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Git(#[from] GitError),

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

// ---------------------------------------------------------------------------
// Editor errors
// ---------------------------------------------------------------------------

/// Errors reported by the [`Editor`](crate::editor::Editor) when an operation
/// is attempted in a state that forbids it, or when its I/O fails.
#[derive(Debug, Error)]
pub enum EditorError {
    /// The document has unsaved edits; the operation would discard them.
    #[error("document '{0}' has unsaved changes")]
    NotSaved(String),

    /// The document is in a conflict state and must be resolved first.
    #[error("document '{0}' is in conflict")]
    InConflict(String),

    /// The document was deleted.
    #[error("document '{0}' is deleted")]
    IsDeleted(String),

    /// The document was closed.
    #[error("document '{0}' is closed")]
    IsClosed(String),

    /// The document has never been opened.
    #[error("document '{0}' is not opened")]
    NotOpened(String),

    /// A resolve operation was issued for a document that is not in conflict.
    #[error("document '{0}' is not in conflict")]
    NotInConflict(String),

    /// `resolve_with_current_on_disk` on a one-way conflict.
    #[error("document '{0}' has no current-on-disk version")]
    NoCurrentOnDisk(String),

    /// The name is registered under a different document kind.
    #[error("document '{name}' is a '{found}', not a '{expected}'")]
    TypeMismatch {
        name: String,
        expected: String,
        found: String,
    },

    /// No document kind is registered under this tag.
    #[error("unknown document kind '{0}'")]
    UnknownKind(String),

    /// The editor that owned this document handle has been dropped.
    #[error("editor for document '{0}' is no longer running")]
    EditorDropped(String),

    /// Serialization or deserialization failed.
    #[error("codec error for document '{name}': {source}")]
    Codec {
        name: String,
        #[source]
        source: CodecError,
    },

    /// The filesystem capability failed.
    #[error(transparent)]
    FileSystem(#[from] FileSystemError),

    /// The blocking filesystem task panicked or was cancelled.
    #[error("filesystem task failed: {0}")]
    TaskFailed(String),
}

// ---------------------------------------------------------------------------
// Filesystem errors
// ---------------------------------------------------------------------------

/// Errors from the filesystem capability.
#[derive(Debug, Error)]
pub enum FileSystemError {
    /// No file is stored under this name.
    #[error("file not found: {0}")]
    NotFound(String),

    /// `create_bytes` was called for a name that already exists.
    #[error("file already exists: {0}")]
    AlreadyExists(String),

    /// Any other I/O failure.
    #[error("I/O error on '{name}': {source}")]
    Io {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

impl FileSystemError {
    /// Map an `io::Error` to the matching variant for `name`.
    pub fn from_io(name: &str, err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(name.to_string()),
            std::io::ErrorKind::AlreadyExists => Self::AlreadyExists(name.to_string()),
            _ => Self::Io {
                name: name.to_string(),
                source: err,
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Codec errors
// ---------------------------------------------------------------------------

/// Errors from document (de)serialization and conflict-marker parsing.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// The payload is not valid JSON.
    #[error("invalid JSON: {0}")]
    InvalidJson(String),

    /// The payload is valid JSON but not an object.
    #[error("document payload is not a JSON object")]
    NotAnObject,

    /// A declared field holds a value of the wrong kind.
    #[error("field '{field}' expected a {expected}")]
    TypeMismatch { field: String, expected: String },

    /// The payload is not valid UTF-8.
    #[error("document payload is not valid UTF-8")]
    InvalidUtf8,

    /// Conflict-marker parsing: no `<<<<<<<` line.
    #[error("conflict start marker not found")]
    MissingStartMarker,

    /// Conflict-marker parsing: no `=======` line inside a hunk.
    #[error("conflict separator not found")]
    MissingSeparator,

    /// Conflict-marker parsing: no `>>>>>>>` line closing a hunk.
    #[error("conflict end marker not found")]
    MissingEndMarker,

    /// A reconstructed conflict side does not parse.
    #[error("{side} side of the conflict is not a valid document: {detail}")]
    InvalidSide { side: String, detail: String },
}

// ---------------------------------------------------------------------------
// Git errors
// ---------------------------------------------------------------------------

/// Errors from local Git (git2) operations.
#[derive(Debug, Error)]
pub enum GitError {
    /// The repository path does not exist or is not a git repo.
    #[error("git repository not found at '{0}'")]
    RepositoryNotFound(String),

    /// A `git2` library error.
    #[error("git2 error: {0}")]
    Git2Error(#[from] git2::Error),

    /// Push was rejected (e.g. non-fast-forward).
    #[error("git push rejected for branch '{branch}': {detail}")]
    PushRejected { branch: String, detail: String },
}

// ---------------------------------------------------------------------------
// Sync errors
// ---------------------------------------------------------------------------

/// Errors from the storage coordinator and sync capability.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Another sync pass is already running.
    #[error("sync already in progress")]
    AlreadyRunning,

    /// No repository is configured for this replica.
    #[error("repository is not initialised")]
    RepositoryNotInitialised,

    /// Underlying Git error during sync.
    #[error("sync Git error: {0}")]
    Git(#[from] GitError),

    /// Editor error while re-reading documents.
    #[error("sync editor error: {0}")]
    Editor(#[from] EditorError),

    /// The blocking sync task panicked or was cancelled.
    #[error("sync task failed: {0}")]
    TaskFailed(String),
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// Errors from configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file not found.
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    /// TOML parse error.
    #[error("configuration parse error: {0}")]
    ParseError(String),

    /// A required environment variable is not set.
    #[error("required environment variable '{var}' is not set (referenced by config field '{field}')")]
    EnvVarMissing { var: String, field: String },

    /// A config value is invalid.
    #[error("invalid configuration value for '{field}': {detail}")]
    InvalidValue { field: String, detail: String },

    /// Generic I/O error reading the config file.
    #[error("configuration I/O error: {0}")]
    IoError(#[from] std::io::Error),
}
