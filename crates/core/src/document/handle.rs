//! Caller-side references to documents owned by an [`Editor`].
//!
//! A handle never owns document data. It names one document instance and
//! routes every operation through the editor that created it, so all
//! mutations are serialized in one place.

use std::sync::{Arc, Weak};

use crate::codec::DocumentCodec;
use crate::conflict::Resolution;
use crate::editor::{Editor, EditorInner};
use crate::errors::EditorError;
use crate::field::FieldValue;

use super::{DocumentObserver, DocumentSnapshot, DocumentState};

/// Reference to one document instance.
///
/// Each instance carries a generation id. Once the document is deleted and
/// the name is reused, older handles keep reporting [`DocumentState::Deleted`].
#[derive(Clone)]
pub struct DocumentHandle {
    name: String,
    id: u64,
    kind: &'static str,
    editor: Weak<EditorInner>,
}

impl std::fmt::Debug for DocumentHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentHandle")
            .field("name", &self.name)
            .field("id", &self.id)
            .field("kind", &self.kind)
            .finish()
    }
}

impl PartialEq for DocumentHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.name == other.name && Weak::ptr_eq(&self.editor, &other.editor)
    }
}

impl Eq for DocumentHandle {}

impl DocumentHandle {
    pub(crate) fn new(name: &str, id: u64, kind: &'static str, editor: &Arc<EditorInner>) -> Self {
        Self {
            name: name.to_string(),
            id,
            kind,
            editor: Arc::downgrade(editor),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &'static str {
        self.kind
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    fn editor(&self) -> Result<Editor, EditorError> {
        self.editor
            .upgrade()
            .map(Editor::from_inner)
            .ok_or_else(|| EditorError::EditorDropped(self.name.clone()))
    }

    /// Current state. A handle whose editor is gone reports `None`.
    pub async fn state(&self) -> DocumentState {
        match self.editor() {
            Ok(editor) => editor.state(self).await,
            Err(_) => DocumentState::None,
        }
    }

    pub async fn snapshot(&self) -> Option<DocumentSnapshot> {
        self.editor().ok()?.snapshot(self).await
    }

    pub async fn field(&self, key: &str) -> Option<FieldValue> {
        self.editor().ok()?.field(self, key).await
    }

    pub async fn set_field(&self, key: &str, value: impl Into<FieldValue>) -> Result<(), EditorError> {
        self.editor()?.set_field(self, key, value.into()).await
    }

    pub async fn set_observer(&self, observer: &Arc<dyn DocumentObserver>) -> Result<(), EditorError> {
        self.editor()?.set_observer(self, observer).await
    }

    pub async fn open(&self) -> Result<(), EditorError> {
        self.editor()?.reopen(self).await
    }

    pub async fn read(&self) -> Result<(), EditorError> {
        self.editor()?.read(self).await
    }

    pub async fn save(&self) -> Result<(), EditorError> {
        self.editor()?.save(self).await
    }

    pub async fn unload(&self) -> Result<(), EditorError> {
        self.editor()?.unload(self).await
    }

    pub async fn close(&self) -> Result<(), EditorError> {
        self.editor()?.close(self).await
    }

    pub async fn delete(&self) -> Result<(), EditorError> {
        self.editor()?.delete(self).await
    }

    pub async fn resolve(&self, resolution: Resolution) -> Result<(), EditorError> {
        self.editor()?.resolve(self, resolution).await
    }

    pub async fn resolve_with_incoming(&self) -> Result<(), EditorError> {
        self.resolve(Resolution::Incoming).await
    }

    pub async fn resolve_with_current(&self) -> Result<(), EditorError> {
        self.resolve(Resolution::Current).await
    }

    pub async fn resolve_with_current_on_disk(&self) -> Result<(), EditorError> {
        self.resolve(Resolution::CurrentOnDisk).await
    }
}

/// A typed document kind.
///
/// Implementors wrap a [`DocumentHandle`] and expose typed accessors for
/// their schema fields. The kind's codec supplies the tag, schema and wire
/// format.
pub trait DocumentKind: Sized + Send + Sync {
    fn codec() -> &'static dyn DocumentCodec;

    fn from_handle(handle: DocumentHandle) -> Self;

    fn handle(&self) -> &DocumentHandle;

    fn kind() -> &'static str {
        Self::codec().kind()
    }
}
