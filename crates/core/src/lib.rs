//! docsync core library.
//!
//! Local-first document editing with conflict-aware sync: typed documents
//! backed by JSON files, a single-owner editor that serializes every
//! document operation, conflict-marker recovery, and a git-backed storage
//! coordinator that refreshes open documents after each sync.

pub mod codec;
pub mod config;
pub mod conflict;
pub mod document;
pub mod editor;
pub mod errors;
pub mod field;
pub mod fs;
pub mod git;
pub mod storage;

// Re-exports for convenience.
pub use config::AppConfig;
pub use conflict::Resolution;
pub use document::{
    DocumentEvent, DocumentHandle, DocumentKind, DocumentObserver, DocumentSnapshot,
    DocumentState, Note,
};
pub use editor::Editor;
pub use field::{FieldStore, FieldValue};
pub use fs::{FileSystem, LocalFileSystem, MemoryFileSystem};
pub use git::{GitClient, GitSync, SyncProvider};
pub use storage::{StorageCoordinator, SyncReport};
