//! Git-backed sync for the data directory.

pub mod client;
pub mod sync;

pub use client::{GitClient, MergeOutcome};
pub use sync::{GitSettings, GitSync, SyncProvider};
