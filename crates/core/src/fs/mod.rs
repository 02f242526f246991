//! Filesystem capability.
//!
//! The editor only touches storage through [`FileSystem`], keyed by document
//! name (a path relative to the data directory). Two implementations ship:
//! [`LocalFileSystem`] over a real directory and [`MemoryFileSystem`] for
//! tests and embedding.

pub mod local;
pub mod memory;

use chrono::{DateTime, Utc};

use crate::errors::FileSystemError;

pub use local::LocalFileSystem;
pub use memory::MemoryFileSystem;

/// Name-keyed byte storage with modification times.
///
/// The editor calls these from tokio's blocking pool while it holds the
/// document registry, so implementations may block.
pub trait FileSystem: Send + Sync {
    /// All stored document names, sorted.
    fn list_names(&self) -> Result<Vec<String>, FileSystemError>;

    fn read_bytes(&self, name: &str) -> Result<Vec<u8>, FileSystemError>;

    /// Overwrite (or create) the file.
    fn write_bytes(&self, name: &str, bytes: &[u8]) -> Result<(), FileSystemError>;

    /// Create the file, failing with `AlreadyExists` if it is present.
    fn create_bytes(&self, name: &str, bytes: &[u8]) -> Result<(), FileSystemError>;

    fn delete_bytes(&self, name: &str) -> Result<(), FileSystemError>;

    fn exists(&self, name: &str) -> bool;

    fn modified_time(&self, name: &str) -> Result<DateTime<Utc>, FileSystemError>;
}
