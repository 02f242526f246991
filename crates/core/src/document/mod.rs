//! Document entity and its state machine.
//!
//! A [`Document`] is the in-memory copy of one backing file. It owns the
//! canonical [`FieldStore`], plus a current-on-disk and an incoming store
//! while it is in conflict. All I/O happens in the
//! [`Editor`](crate::editor::Editor); this module only decides what each
//! operation is allowed to do in each state and applies the result.
//!
//! ```text
//! none -> opened -> read <-> modified -> saved -> read | unloaded | closed
//!                    read/saved/modified --read--> conflict | two_way_conflict
//!                    conflict --resolve--> modified
//! ```

pub mod handle;
pub mod note;

use std::sync::{Arc, Weak};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::codec::DocumentCodec;
use crate::conflict::Resolution;
use crate::errors::EditorError;
use crate::field::{FieldStore, FieldValue};

pub use handle::{DocumentHandle, DocumentKind};
pub use note::Note;

/// Codec registered for the kind tag `kind`.
pub fn codec_for_kind(kind: &str) -> Result<&'static dyn DocumentCodec, EditorError> {
    match kind {
        k if k == Note::kind() => Ok(Note::codec()),
        other => Err(EditorError::UnknownKind(other.to_string())),
    }
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Lifecycle state of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentState {
    None,
    Opened,
    Read,
    Modified,
    Saved,
    Unloaded,
    Closed,
    Deleted,
    /// Edited in memory (or split from markers) against one disk version.
    Conflict,
    /// In-memory edit against both sides of a conflicted file.
    TwoWayConflict,
}

impl DocumentState {
    pub fn is_conflict(self) -> bool {
        matches!(self, Self::Conflict | Self::TwoWayConflict)
    }

    /// States in which field writes are accepted.
    pub fn is_mutable(self) -> bool {
        matches!(self, Self::Read | Self::Saved | Self::Modified)
    }

    /// States in which the editor keeps the document registered.
    pub fn is_live(self) -> bool {
        matches!(
            self,
            Self::Opened
                | Self::Read
                | Self::Modified
                | Self::Saved
                | Self::Conflict
                | Self::TwoWayConflict
        )
    }
}

impl std::fmt::Display for DocumentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Opened => write!(f, "opened"),
            Self::Read => write!(f, "read"),
            Self::Modified => write!(f, "modified"),
            Self::Saved => write!(f, "saved"),
            Self::Unloaded => write!(f, "unloaded"),
            Self::Closed => write!(f, "closed"),
            Self::Deleted => write!(f, "deleted"),
            Self::Conflict => write!(f, "conflict"),
            Self::TwoWayConflict => write!(f, "two_way_conflict"),
        }
    }
}

// ---------------------------------------------------------------------------
// Observation
// ---------------------------------------------------------------------------

/// Point-in-time copy of a document, handed to observers and callers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentSnapshot {
    pub name: String,
    pub kind: String,
    pub state: DocumentState,
    pub modified_at: Option<DateTime<Utc>>,
    pub fields: FieldStore,
    pub current_on_disk: Option<FieldStore>,
    pub incoming: Option<FieldStore>,
}

/// Receives document notifications synchronously, on the editor's worker.
///
/// Implementations must not block; both callbacks default to no-ops.
pub trait DocumentObserver: Send + Sync {
    fn on_state_changed(&self, _document: &DocumentSnapshot) {}

    fn on_changed_on_disk(&self, _document: &DocumentSnapshot) {}
}

/// Editor-wide notifications, delivered over a broadcast channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DocumentEvent {
    StateChanged {
        name: String,
        from: DocumentState,
        to: DocumentState,
    },
    ChangedOnDisk {
        name: String,
    },
}

// ---------------------------------------------------------------------------
// Entity
// ---------------------------------------------------------------------------

/// What `read` found on disk.
#[derive(Debug)]
pub(crate) enum DiskContent {
    Clean(FieldStore),
    Conflicted {
        current: FieldStore,
        incoming: FieldStore,
    },
}

pub(crate) struct Document {
    id: u64,
    name: String,
    codec: &'static dyn DocumentCodec,
    state: DocumentState,
    modified_at: Option<DateTime<Utc>>,
    fields: FieldStore,
    current_on_disk: Option<FieldStore>,
    incoming: Option<FieldStore>,
    observer: Option<Weak<dyn DocumentObserver>>,
    events: broadcast::Sender<DocumentEvent>,
}

impl Document {
    pub(crate) fn new(
        id: u64,
        name: impl Into<String>,
        codec: &'static dyn DocumentCodec,
        events: broadcast::Sender<DocumentEvent>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            codec,
            state: DocumentState::None,
            modified_at: None,
            fields: FieldStore::new(),
            current_on_disk: None,
            incoming: None,
            observer: None,
            events,
        }
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn kind(&self) -> &'static str {
        self.codec.kind()
    }

    pub(crate) fn codec(&self) -> &'static dyn DocumentCodec {
        self.codec
    }

    pub(crate) fn state(&self) -> DocumentState {
        self.state
    }

    pub(crate) fn modified_at(&self) -> Option<DateTime<Utc>> {
        self.modified_at
    }

    pub(crate) fn fields(&self) -> &FieldStore {
        &self.fields
    }

    pub(crate) fn field(&self, key: &str) -> Option<FieldValue> {
        self.fields.get(key).cloned()
    }

    pub(crate) fn set_observer(&mut self, observer: &Arc<dyn DocumentObserver>) {
        self.observer = Some(Arc::downgrade(observer));
    }

    pub(crate) fn snapshot(&self) -> DocumentSnapshot {
        DocumentSnapshot {
            name: self.name.clone(),
            kind: self.kind().to_string(),
            state: self.state,
            modified_at: self.modified_at,
            fields: self.fields.clone(),
            current_on_disk: self.current_on_disk.clone(),
            incoming: self.incoming.clone(),
        }
    }

    fn observer(&self) -> Option<Arc<dyn DocumentObserver>> {
        self.observer.as_ref().and_then(Weak::upgrade)
    }

    fn set_state(&mut self, to: DocumentState) {
        let from = self.state;
        self.state = to;
        if from != to {
            info!(name = %self.name, %from, %to, "document state changed");
        }
        if let Some(observer) = self.observer() {
            observer.on_state_changed(&self.snapshot());
        }
        let _ = self.events.send(DocumentEvent::StateChanged {
            name: self.name.clone(),
            from,
            to,
        });
    }

    pub(crate) fn notify_changed_on_disk(&self) {
        debug!(name = %self.name, "backing file changed on disk");
        if let Some(observer) = self.observer() {
            observer.on_changed_on_disk(&self.snapshot());
        }
        let _ = self.events.send(DocumentEvent::ChangedOnDisk {
            name: self.name.clone(),
        });
    }

    fn conflict_guard(&self) -> Result<(), EditorError> {
        if self.state.is_conflict() {
            return Err(EditorError::InConflict(self.name.clone()));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Transitions
    // -----------------------------------------------------------------------

    pub(crate) fn open(&mut self) -> Result<(), EditorError> {
        match self.state {
            DocumentState::Modified => return Err(EditorError::NotSaved(self.name.clone())),
            DocumentState::Deleted => return Err(EditorError::IsDeleted(self.name.clone())),
            _ => self.conflict_guard()?,
        }
        self.fields.clear();
        self.modified_at = None;
        self.set_state(DocumentState::Opened);
        Ok(())
    }

    pub(crate) fn check_read(&self) -> Result<(), EditorError> {
        match self.state {
            DocumentState::Closed => Err(EditorError::IsClosed(self.name.clone())),
            DocumentState::Deleted => Err(EditorError::IsDeleted(self.name.clone())),
            DocumentState::None => Err(EditorError::NotOpened(self.name.clone())),
            _ => self.conflict_guard(),
        }
    }

    /// Apply freshly read disk content stamped with `mtime`.
    pub(crate) fn apply_read(&mut self, content: DiskContent, mtime: DateTime<Utc>) {
        let was_modified = self.state == DocumentState::Modified;
        self.modified_at = Some(mtime);
        match (content, was_modified) {
            (DiskContent::Clean(fields), false) => {
                self.fields = fields;
                self.current_on_disk = None;
                self.incoming = None;
                self.set_state(DocumentState::Read);
            }
            (DiskContent::Clean(fields), true) => {
                warn!(name = %self.name, "file changed on disk while modified in memory");
                self.incoming = Some(fields);
                self.set_state(DocumentState::Conflict);
            }
            (DiskContent::Conflicted { current, incoming }, false) => {
                warn!(name = %self.name, "file on disk holds conflict markers");
                self.fields = current;
                self.incoming = Some(incoming);
                self.set_state(DocumentState::Conflict);
            }
            (DiskContent::Conflicted { current, incoming }, true) => {
                warn!(name = %self.name, "conflict markers on disk while modified in memory");
                self.current_on_disk = Some(current);
                self.incoming = Some(incoming);
                self.set_state(DocumentState::TwoWayConflict);
            }
        }
    }

    /// Write one field. Returns `false` when the write was dropped.
    pub(crate) fn set_field(&mut self, key: &str, value: FieldValue) -> bool {
        if !self.state.is_mutable() {
            debug!(name = %self.name, key, state = %self.state, "dropping field write");
            return false;
        }
        if !self.codec.accepts(key, &value) {
            debug!(name = %self.name, key, kind = value.kind_name(), "dropping write to undeclared field or wrong kind");
            return false;
        }
        self.fields.set(key, value);
        self.set_state(DocumentState::Modified);
        true
    }

    /// Whether `save` has anything to write.
    pub(crate) fn check_save(&self) -> Result<bool, EditorError> {
        match self.state {
            DocumentState::Closed => Err(EditorError::IsClosed(self.name.clone())),
            DocumentState::Deleted => Err(EditorError::IsDeleted(self.name.clone())),
            state => {
                self.conflict_guard()?;
                Ok(state == DocumentState::Modified)
            }
        }
    }

    pub(crate) fn mark_saved(&mut self, mtime: DateTime<Utc>) {
        self.modified_at = Some(mtime);
        self.set_state(DocumentState::Saved);
    }

    pub(crate) fn unload(&mut self) -> Result<(), EditorError> {
        match self.state {
            DocumentState::Unloaded => Ok(()),
            DocumentState::Modified => Err(EditorError::NotSaved(self.name.clone())),
            DocumentState::Deleted => Err(EditorError::IsDeleted(self.name.clone())),
            DocumentState::Conflict | DocumentState::TwoWayConflict => {
                Err(EditorError::InConflict(self.name.clone()))
            }
            DocumentState::None
            | DocumentState::Opened
            | DocumentState::Read
            | DocumentState::Saved
            | DocumentState::Closed => {
                self.fields.clear();
                self.modified_at = None;
                self.set_state(DocumentState::Unloaded);
                Ok(())
            }
        }
    }

    pub(crate) fn close(&mut self) -> Result<(), EditorError> {
        self.unload()?;
        self.set_state(DocumentState::Closed);
        Ok(())
    }

    pub(crate) fn mark_deleted(&mut self) {
        self.set_state(DocumentState::Deleted);
    }

    pub(crate) fn resolve(&mut self, resolution: Resolution) -> Result<(), EditorError> {
        if !self.state.is_conflict() {
            return Err(EditorError::NotInConflict(self.name.clone()));
        }
        match resolution {
            Resolution::Incoming => {
                if let Some(incoming) = self.incoming.take() {
                    self.fields = incoming;
                }
            }
            Resolution::Current => {}
            Resolution::CurrentOnDisk => {
                let Some(on_disk) = self.current_on_disk.take() else {
                    return Err(EditorError::NoCurrentOnDisk(self.name.clone()));
                };
                self.fields = on_disk;
            }
        }
        info!(name = %self.name, %resolution, "conflict resolved");
        self.incoming = None;
        self.current_on_disk = None;
        self.set_state(DocumentState::Modified);
        Ok(())
    }
}
