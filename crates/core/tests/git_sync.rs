//! End-to-end sync tests over real git repositories.
//!
//! Each test builds a bare "origin" plus working clones with `git2`. No
//! network I/O: remotes are local paths.

use std::path::Path;
use std::sync::Arc;

use git2::{Repository, RepositoryInitOptions, Signature};
use tempfile::TempDir;

use docsync_core::codec::DocumentCodec;
use docsync_core::errors::SyncError;
use docsync_core::git::{GitSettings, MergeOutcome};
use docsync_core::{
    DocumentKind, DocumentState, Editor, GitClient, GitSync, LocalFileSystem, Note,
    StorageCoordinator, SyncProvider,
};

// ===========================================================================
// Helpers
// ===========================================================================

struct Fixture {
    _tmp: TempDir,
    remote_url: String,
    root: std::path::PathBuf,
}

fn sig() -> Signature<'static> {
    Signature::now("Seed", "seed@test.com").unwrap()
}

fn note_bytes(contents: &str) -> Vec<u8> {
    let mut store = docsync_core::FieldStore::new();
    store.set("contents", contents.into());
    Note::codec().serialize(&store)
}

/// Bare origin on `main` seeded with one commit holding `a.json`.
fn fixture() -> Fixture {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let remote_dir = root.join("origin.git");
    let mut opts = RepositoryInitOptions::new();
    opts.bare(true).initial_head("main");
    Repository::init_opts(&remote_dir, &opts).unwrap();
    let remote_url = remote_dir.to_str().unwrap().to_string();

    let seed_dir = root.join("seed");
    let mut opts = RepositoryInitOptions::new();
    opts.initial_head("main");
    let seed = Repository::init_opts(&seed_dir, &opts).unwrap();
    seed.remote("origin", &remote_url).unwrap();
    std::fs::write(seed_dir.join("a.json"), note_bytes("")).unwrap();

    let client = GitClient::new(&seed_dir).unwrap();
    client.commit("seed", &sig()).unwrap();
    client.push("origin", "main", None).unwrap();

    Fixture {
        _tmp: tmp,
        remote_url,
        root,
    }
}

fn settings(name: &str) -> GitSettings {
    GitSettings {
        author_name: name.to_string(),
        author_email: format!("{}@test.com", name),
        ..GitSettings::default()
    }
}

struct Replica {
    dir: std::path::PathBuf,
    editor: Editor,
    coordinator: StorageCoordinator,
}

fn replica(fx: &Fixture, name: &str) -> Replica {
    let dir = fx.root.join(name);
    let client = GitClient::clone_repo(&fx.remote_url, &dir, None).unwrap();
    let provider = Arc::new(GitSync::new(client, settings(name)));
    let editor = Editor::new(Arc::new(LocalFileSystem::new(&dir, "json")));
    let coordinator = StorageCoordinator::new(editor.clone(), provider);
    Replica {
        dir,
        editor,
        coordinator,
    }
}

fn read_file(dir: &Path, name: &str) -> String {
    std::fs::read_to_string(dir.join(name)).unwrap()
}

// ===========================================================================
// Tests
// ===========================================================================

#[tokio::test]
async fn test_fast_forward_brings_remote_edits() {
    let fx = fixture();
    let alice = replica(&fx, "alice");
    let bob = replica(&fx, "bob");

    let note: Note = bob.editor.open("a.json").await.unwrap();
    note.read().await.unwrap();

    let alice_note: Note = alice.editor.open("a.json").await.unwrap();
    alice_note.read().await.unwrap();
    alice_note.set_contents("from alice").await.unwrap();
    alice_note.save().await.unwrap();
    alice.coordinator.commit("alice edit").await.unwrap();
    alice.coordinator.sync().await.unwrap();

    let report = bob.coordinator.sync().await.unwrap();
    assert_eq!(report.reread, vec!["a.json"]);
    assert!(report.conflicts.is_empty());
    assert_eq!(note.state().await, DocumentState::Read);
    assert_eq!(note.contents().await.as_deref(), Some("from alice"));
}

#[tokio::test]
async fn test_concurrent_edits_surface_as_conflict() {
    let fx = fixture();
    let alice = replica(&fx, "alice");
    let bob = replica(&fx, "bob");

    // Alice publishes first.
    std::fs::write(alice.dir.join("a.json"), note_bytes("tests")).unwrap();
    alice.coordinator.commit("alice edit").await.unwrap();
    alice.coordinator.sync().await.unwrap();

    // Bob edits the same field locally and commits before syncing.
    let note: Note = bob.editor.open("a.json").await.unwrap();
    note.read().await.unwrap();
    note.set_contents("1").await.unwrap();
    note.save().await.unwrap();
    bob.coordinator.commit("bob edit").await.unwrap();

    let report = bob.coordinator.sync().await.unwrap();
    assert_eq!(report.conflicts, vec!["a.json"]);
    assert!(read_file(&bob.dir, "a.json").contains("<<<<<<<"));

    assert_eq!(note.state().await, DocumentState::Conflict);
    assert_eq!(note.contents().await.as_deref(), Some("1"));
    assert_eq!(note.incoming_contents().await.as_deref(), Some("tests"));
    assert_eq!(bob.coordinator.conflicts().await, vec!["a.json"]);

    // Resolving and publishing clears the markers for everyone.
    note.resolve_with_incoming().await.unwrap();
    note.save().await.unwrap();
    bob.coordinator.commit("resolve").await.unwrap();
    bob.coordinator.sync().await.unwrap();
    assert!(!read_file(&bob.dir, "a.json").contains("<<<<<<<"));

    alice.coordinator.sync().await.unwrap();
    let alice_note: Note = alice.editor.open("a.json").await.unwrap();
    alice_note.read().await.unwrap();
    assert_eq!(alice_note.state().await, DocumentState::Read);
    assert_eq!(alice_note.contents().await.as_deref(), Some("tests"));
}

#[tokio::test]
async fn test_non_overlapping_edits_merge_cleanly() {
    let fx = fixture();
    let alice = replica(&fx, "alice");
    let bob = replica(&fx, "bob");

    std::fs::write(alice.dir.join("alice.json"), note_bytes("a")).unwrap();
    alice.coordinator.commit("alice adds").await.unwrap();
    alice.coordinator.sync().await.unwrap();

    let created: Note = bob.editor.create("bob.json").await.unwrap();
    created.read().await.unwrap();
    bob.coordinator.commit("bob adds").await.unwrap();
    bob.coordinator.sync().await.unwrap();

    let names = bob.editor.all_file_names().unwrap();
    assert_eq!(names, vec!["a.json", "alice.json", "bob.json"]);
    assert_eq!(created.state().await, DocumentState::Read);

    let head = GitClient::new(&bob.dir).unwrap();
    let commit = head.repo().head().unwrap().peel_to_commit().unwrap();
    assert_eq!(commit.parent_count(), 2);
}

#[tokio::test]
async fn test_merge_outcomes_from_client() {
    let fx = fixture();
    let alice = replica(&fx, "alice");
    let bob_dir = fx.root.join("bob");
    let bob = GitClient::clone_repo(&fx.remote_url, &bob_dir, None).unwrap();

    bob.fetch("origin", None).unwrap();
    assert_eq!(
        bob.merge_remote("origin", "main", &sig()).unwrap(),
        MergeOutcome::UpToDate
    );

    std::fs::write(alice.dir.join("a.json"), note_bytes("x")).unwrap();
    alice.coordinator.commit("edit").await.unwrap();
    alice.coordinator.sync().await.unwrap();

    bob.fetch("origin", None).unwrap();
    assert_eq!(
        bob.merge_remote("origin", "main", &sig()).unwrap(),
        MergeOutcome::FastForward
    );
    assert_eq!(read_file(&bob_dir, "a.json"), String::from_utf8(note_bytes("x")).unwrap());
}

#[tokio::test]
async fn test_commit_without_changes_returns_head() {
    let fx = fixture();
    let alice = replica(&fx, "alice");
    let head = GitClient::new(&alice.dir).unwrap().get_head_sha().unwrap();
    assert_eq!(alice.coordinator.commit("nothing").await.unwrap(), head);
}

#[test]
fn test_sync_against_missing_remote_fails() {
    let fx = fixture();
    let dir = fx.root.join("carol");
    let client = GitClient::clone_repo(&fx.remote_url, &dir, None).unwrap();
    client.repo().remote_set_url("origin", "/nonexistent/remote.git").unwrap();
    let provider = GitSync::new(client, settings("carol"));
    assert!(matches!(provider.sync_data(), Err(SyncError::Git(_))));
}
