//! Conflict-marker splitting.
//!
//! A merge tool that cannot reconcile two edits leaves both versions in the
//! file between standard markers:
//!
//! ```text
//! {
//! <<<<<<< HEAD
//!   "contents" : "1"
//! =======
//!   "contents" : "tests"
//! >>>>>>> origin/main
//! }
//! ```
//!
//! [`split_conflict`] rebuilds the two competing versions from such text.
//! Lines outside the hunks belong to both sides; a diff3 base section
//! (`|||||||`) is dropped.

use tracing::debug;

use crate::errors::CodecError;

pub const START_MARKER: &str = "<<<<<<<";
pub const BASE_MARKER: &str = "|||||||";
pub const SEPARATOR: &str = "=======";
pub const END_MARKER: &str = ">>>>>>>";

/// The two versions reconstructed from a conflicted file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictSides {
    /// Whole text as the current ("ours") side sees it.
    pub current: String,
    /// Whole text as the incoming ("theirs") side sees it.
    pub incoming: String,
    /// Only the lines inside the hunks on the current side.
    pub current_fragment: String,
    /// Only the lines inside the hunks on the incoming side.
    pub incoming_fragment: String,
    /// Number of conflict hunks found.
    pub hunks: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Shared,
    Current,
    Base,
    Incoming,
}

/// Split conflicted text into its current and incoming versions.
///
/// Fails if the bytes are not UTF-8, if there is no start marker, or if a
/// hunk is missing its separator or end marker.
pub fn split_conflict(bytes: &[u8]) -> Result<ConflictSides, CodecError> {
    let text = std::str::from_utf8(bytes).map_err(|_| CodecError::InvalidUtf8)?;

    let mut sides = ConflictSides {
        current: String::new(),
        incoming: String::new(),
        current_fragment: String::new(),
        incoming_fragment: String::new(),
        hunks: 0,
    };
    let mut section = Section::Shared;

    for line in text.split_inclusive('\n') {
        let bare = line.trim_end_matches(['\r', '\n']);
        match section {
            Section::Shared => {
                if bare.starts_with(START_MARKER) {
                    sides.hunks += 1;
                    section = Section::Current;
                } else {
                    sides.current.push_str(line);
                    sides.incoming.push_str(line);
                }
            }
            Section::Current | Section::Base => {
                if bare == SEPARATOR {
                    section = Section::Incoming;
                } else if bare.starts_with(END_MARKER) || bare.starts_with(START_MARKER) {
                    return Err(CodecError::MissingSeparator);
                } else if bare.starts_with(BASE_MARKER) {
                    section = Section::Base;
                } else if section == Section::Current {
                    sides.current.push_str(line);
                    sides.current_fragment.push_str(line);
                }
            }
            Section::Incoming => {
                if bare.starts_with(END_MARKER) {
                    section = Section::Shared;
                } else if bare.starts_with(START_MARKER) {
                    return Err(CodecError::MissingEndMarker);
                } else {
                    sides.incoming.push_str(line);
                    sides.incoming_fragment.push_str(line);
                }
            }
        }
    }

    match section {
        Section::Shared if sides.hunks == 0 => Err(CodecError::MissingStartMarker),
        Section::Shared => {
            debug!(hunks = sides.hunks, "split conflicted text");
            Ok(sides)
        }
        Section::Current | Section::Base => Err(CodecError::MissingSeparator),
        Section::Incoming => Err(CodecError::MissingEndMarker),
    }
}

/// Quick check for a start marker at the beginning of any line.
pub fn has_conflict_markers(bytes: &[u8]) -> bool {
    String::from_utf8_lossy(bytes)
        .lines()
        .any(|l| l.starts_with(START_MARKER))
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFLICTED: &str = "{\n<<<<<<< HEAD\n  \"contents\" : \"1\"\n=======\n  \"contents\" : \"tests\"\n>>>>>>> origin/main\n}\n";

    #[test]
    fn test_single_hunk() {
        let sides = split_conflict(CONFLICTED.as_bytes()).unwrap();
        assert_eq!(sides.hunks, 1);
        assert_eq!(sides.current, "{\n  \"contents\" : \"1\"\n}\n");
        assert_eq!(sides.incoming, "{\n  \"contents\" : \"tests\"\n}\n");
        assert_eq!(sides.current_fragment, "  \"contents\" : \"1\"\n");
        assert_eq!(sides.incoming_fragment, "  \"contents\" : \"tests\"\n");
    }

    #[test]
    fn test_diff3_base_is_dropped() {
        let text = "<<<<<<< ours\na\n||||||| base\nbase\n=======\nb\n>>>>>>> theirs\n";
        let sides = split_conflict(text.as_bytes()).unwrap();
        assert_eq!(sides.current, "a\n");
        assert_eq!(sides.incoming, "b\n");
    }

    #[test]
    fn test_multiple_hunks_share_context() {
        let text = "x\n<<<<<<<\n1\n=======\n2\n>>>>>>>\ny\n<<<<<<<\n3\n=======\n4\n>>>>>>>\nz";
        let sides = split_conflict(text.as_bytes()).unwrap();
        assert_eq!(sides.hunks, 2);
        assert_eq!(sides.current, "x\n1\ny\n3\nz");
        assert_eq!(sides.incoming, "x\n2\ny\n4\nz");
    }

    #[test]
    fn test_crlf_lines() {
        let text = "<<<<<<< HEAD\r\na\r\n=======\r\nb\r\n>>>>>>> other\r\n";
        let sides = split_conflict(text.as_bytes()).unwrap();
        assert_eq!(sides.current, "a\r\n");
        assert_eq!(sides.incoming, "b\r\n");
    }

    #[test]
    fn test_missing_markers() {
        assert_eq!(
            split_conflict(b"{\"contents\": \"x\"}"),
            Err(CodecError::MissingStartMarker)
        );
        assert_eq!(
            split_conflict(b"<<<<<<< HEAD\na\n>>>>>>> x\n"),
            Err(CodecError::MissingSeparator)
        );
        assert_eq!(
            split_conflict(b"<<<<<<< HEAD\na\n=======\nb\n"),
            Err(CodecError::MissingEndMarker)
        );
        assert_eq!(split_conflict(&[0xff, 0xfe]), Err(CodecError::InvalidUtf8));
    }

    #[test]
    fn test_has_conflict_markers() {
        assert!(has_conflict_markers(CONFLICTED.as_bytes()));
        assert!(!has_conflict_markers(b"{}"));
    }
}
