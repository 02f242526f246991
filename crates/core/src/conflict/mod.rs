//! Conflict detection and resolution choices.
//!
//! 1. **Markers** -- splitting a merge artifact back into two versions.
//! 2. **Resolution** -- which competing version a caller keeps.

pub mod markers;

use serde::{Deserialize, Serialize};

pub use markers::{has_conflict_markers, split_conflict, ConflictSides};

/// Which version of a conflicted document to keep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    /// Take the incoming (remote) version.
    Incoming,
    /// Keep the in-memory version.
    Current,
    /// Take the on-disk current side (two-way conflicts only).
    CurrentOnDisk,
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Incoming => write!(f, "incoming"),
            Self::Current => write!(f, "current"),
            Self::CurrentOnDisk => write!(f, "current-on-disk"),
        }
    }
}

impl std::str::FromStr for Resolution {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "incoming" | "theirs" => Ok(Self::Incoming),
            "current" | "ours" => Ok(Self::Current),
            "current-on-disk" | "current_on_disk" => Ok(Self::CurrentOnDisk),
            other => Err(format!(
                "invalid resolution '{}': use 'incoming', 'current' or 'current-on-disk'",
                other
            )),
        }
    }
}
