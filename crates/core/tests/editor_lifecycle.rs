//! Document lifecycle tests against a real data directory.
//!
//! Every test gets its own `TempDir`; external edits are simulated by
//! writing the file directly and pushing its mtime forward so the change is
//! visible regardless of filesystem timestamp granularity.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tempfile::TempDir;

use docsync_core::errors::{EditorError, FileSystemError};
use docsync_core::{DocumentState, Editor, LocalFileSystem, Note};

// ===========================================================================
// Helpers
// ===========================================================================

const CONFLICTED: &str = r#"{
<<<<<<< HEAD
  "contents" : "1"
=======
  "contents" : "tests"
>>>>>>> main
}
"#;

fn setup() -> (TempDir, Editor) {
    let tmp = TempDir::new().unwrap();
    let fs = LocalFileSystem::new(tmp.path(), "json");
    (tmp, Editor::new(Arc::new(fs)))
}

/// Overwrite `name` behind the editor's back.
fn write_external(dir: &Path, name: &str, text: &str, bump_secs: u64) {
    let path = dir.join(name);
    std::fs::write(&path, text).unwrap();
    let file = std::fs::File::options().write(true).open(&path).unwrap();
    file.set_modified(SystemTime::now() + Duration::from_secs(bump_secs))
        .unwrap();
}

async fn created_and_read(editor: &Editor, name: &str) -> Note {
    let note: Note = editor.create(name).await.unwrap();
    note.read().await.unwrap();
    note
}

// ===========================================================================
// Scenario
// ===========================================================================

#[tokio::test]
async fn test_full_lifecycle() {
    let (tmp, editor) = setup();
    let path = tmp.path().join("a.json");

    let note: Note = editor.create("a.json").await.unwrap();
    note.read().await.unwrap();
    assert_eq!(note.contents().await.as_deref(), Some(""));
    assert_eq!(note.state().await, DocumentState::Read);

    note.set_contents("hi").await.unwrap();
    assert_eq!(note.state().await, DocumentState::Modified);

    note.save().await.unwrap();
    assert_eq!(note.state().await, DocumentState::Saved);
    let on_disk: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(on_disk["contents"], "hi");

    note.close().await.unwrap();
    assert_eq!(note.state().await, DocumentState::Closed);

    note.open().await.unwrap();
    assert_eq!(note.state().await, DocumentState::Opened);

    note.read().await.unwrap();
    assert_eq!(note.contents().await.as_deref(), Some("hi"));
    assert_eq!(note.state().await, DocumentState::Read);

    note.delete().await.unwrap();
    assert_eq!(note.state().await, DocumentState::Deleted);
    assert!(!path.exists());
}

// ===========================================================================
// Properties
// ===========================================================================

#[tokio::test]
async fn test_create_then_read_yields_defaults() {
    let (_tmp, editor) = setup();
    for name in ["one.json", "nested/two.json"] {
        let note = created_and_read(&editor, name).await;
        assert_eq!(note.state().await, DocumentState::Read);
        assert_eq!(note.contents().await.as_deref(), Some(""));
    }
    assert_eq!(
        editor.all_file_names().unwrap(),
        vec!["nested/two.json", "one.json"]
    );
}

#[tokio::test]
async fn test_create_refuses_existing_path() {
    let (tmp, editor) = setup();
    std::fs::write(tmp.path().join("a.json"), "{\"contents\": \"keep\"}").unwrap();
    assert!(matches!(
        editor.create::<Note>("a.json").await,
        Err(EditorError::FileSystem(FileSystemError::AlreadyExists(_)))
    ));
    assert_eq!(
        std::fs::read_to_string(tmp.path().join("a.json")).unwrap(),
        "{\"contents\": \"keep\"}"
    );
}

#[tokio::test]
async fn test_writes_outside_mutable_states_are_dropped() {
    let (_tmp, editor) = setup();

    let opened: Note = editor.create("opened.json").await.unwrap();
    opened.set_contents("x").await.unwrap();
    assert_eq!(opened.state().await, DocumentState::Opened);
    assert_eq!(opened.contents().await, None);

    let closed = created_and_read(&editor, "closed.json").await;
    closed.close().await.unwrap();
    closed.set_contents("x").await.unwrap();
    assert_eq!(closed.state().await, DocumentState::Closed);
    assert_eq!(closed.contents().await, None);

    let deleted = created_and_read(&editor, "deleted.json").await;
    deleted.delete().await.unwrap();
    assert!(deleted.set_contents("x").await.is_ok());
    assert_eq!(deleted.state().await, DocumentState::Deleted);

    let saved = created_and_read(&editor, "saved.json").await;
    saved.set_contents("v1").await.unwrap();
    saved.save().await.unwrap();
    saved.set_contents("v2").await.unwrap();
    assert_eq!(saved.state().await, DocumentState::Modified);
}

#[tokio::test]
async fn test_close_never_discards_edits() {
    let (_tmp, editor) = setup();
    let note = created_and_read(&editor, "a.json").await;
    note.set_contents("unsaved").await.unwrap();

    assert!(matches!(note.close().await, Err(EditorError::NotSaved(_))));
    assert_eq!(note.state().await, DocumentState::Modified);
    assert_eq!(note.contents().await.as_deref(), Some("unsaved"));
}

#[tokio::test]
async fn test_read_after_save_is_idempotent() {
    let (_tmp, editor) = setup();
    let note = created_and_read(&editor, "a.json").await;
    note.set_contents("stable").await.unwrap();
    note.save().await.unwrap();

    let mut events = editor.subscribe();
    note.read().await.unwrap();
    assert_eq!(note.state().await, DocumentState::Saved);
    assert_eq!(note.contents().await.as_deref(), Some("stable"));
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn test_external_json_while_modified_is_one_way_conflict() {
    let (tmp, editor) = setup();
    let note = created_and_read(&editor, "a.json").await;
    note.set_contents("mine").await.unwrap();

    write_external(tmp.path(), "a.json", "{\"contents\": \"theirs\"}", 5);
    note.read().await.unwrap();

    assert_eq!(note.state().await, DocumentState::Conflict);
    assert_eq!(note.contents().await.as_deref(), Some("mine"));
    assert_eq!(note.incoming_contents().await.as_deref(), Some("theirs"));
    assert!(matches!(note.read().await, Err(EditorError::InConflict(_))));
}

#[tokio::test]
async fn test_conflict_markers_while_unmodified() {
    let (tmp, editor) = setup();
    let note = created_and_read(&editor, "a.json").await;

    write_external(tmp.path(), "a.json", CONFLICTED, 5);
    note.read().await.unwrap();

    assert_eq!(note.state().await, DocumentState::Conflict);
    assert_eq!(note.contents().await.as_deref(), Some("1"));
    assert_eq!(note.incoming_contents().await.as_deref(), Some("tests"));
}

#[tokio::test]
async fn test_conflict_markers_while_modified() {
    let (tmp, editor) = setup();
    let note = created_and_read(&editor, "a.json").await;
    note.set_contents("New Content").await.unwrap();

    write_external(tmp.path(), "a.json", CONFLICTED, 5);
    note.read().await.unwrap();

    assert_eq!(note.state().await, DocumentState::TwoWayConflict);
    assert_eq!(note.contents().await.as_deref(), Some("New Content"));
    assert_eq!(note.contents_on_disk().await.as_deref(), Some("1"));
    assert_eq!(note.incoming_contents().await.as_deref(), Some("tests"));
}

#[tokio::test]
async fn test_resolve_save_delete() {
    let (tmp, editor) = setup();
    let note = created_and_read(&editor, "a.json").await;
    write_external(tmp.path(), "a.json", CONFLICTED, 5);
    note.read().await.unwrap();

    note.resolve_with_incoming().await.unwrap();
    assert_eq!(note.state().await, DocumentState::Modified);
    note.save().await.unwrap();
    let saved = std::fs::read_to_string(tmp.path().join("a.json")).unwrap();
    assert!(!saved.contains("<<<<<<<"));
    assert!(saved.contains("tests"));

    note.delete().await.unwrap();
    assert_eq!(note.state().await, DocumentState::Deleted);
    assert!(!tmp.path().join("a.json").exists());
}

#[tokio::test]
async fn test_resolve_with_current_on_disk_then_save() {
    let (tmp, editor) = setup();
    let note = created_and_read(&editor, "a.json").await;
    note.set_contents("New Content").await.unwrap();
    write_external(tmp.path(), "a.json", CONFLICTED, 5);
    note.read().await.unwrap();

    note.resolve_with_current_on_disk().await.unwrap();
    note.save().await.unwrap();
    assert_eq!(note.state().await, DocumentState::Saved);
    assert_eq!(note.contents().await.as_deref(), Some("1"));

    // A later external edit is picked up normally.
    write_external(tmp.path(), "a.json", "{\"contents\": \"later\"}", 10);
    note.read().await.unwrap();
    assert_eq!(note.state().await, DocumentState::Read);
    assert_eq!(note.contents().await.as_deref(), Some("later"));
}

#[tokio::test]
async fn test_two_editors_over_one_directory() {
    let (tmp, editor) = setup();
    let other = Editor::new(Arc::new(LocalFileSystem::new(tmp.path(), "json")));

    let mine = created_and_read(&editor, "shared.json").await;
    let theirs: Note = other.open("shared.json").await.unwrap();
    theirs.read().await.unwrap();
    theirs.set_contents("from other").await.unwrap();
    theirs.save().await.unwrap();

    // Push the mtime forward in case both writes share a timestamp.
    let file = std::fs::File::options()
        .write(true)
        .open(tmp.path().join("shared.json"))
        .unwrap();
    file.set_modified(SystemTime::now() + Duration::from_secs(5))
        .unwrap();

    mine.read().await.unwrap();
    assert_eq!(mine.contents().await.as_deref(), Some("from other"));
}
