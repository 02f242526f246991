//! The editor: single owner of every document's in-memory state.
//!
//! All document operations go through one [`Editor`]. Each operation takes
//! the registry lock for its whole duration, including the filesystem call,
//! so operations never interleave and are applied in submission order
//! (tokio's mutex is fair). Filesystem calls run on the blocking pool, so a
//! slow disk stalls queued operations but never a runtime worker.
//!
//! The registry keys documents by name. A name maps to a live document
//! while its state is one of opened, read, modified, saved or a conflict.
//! Unloaded, closed and deleted documents are parked so that existing
//! handles keep seeing their state; opening the name again revives the
//! parked instance unless it was deleted.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, instrument};

use crate::codec::DocumentCodec;
use crate::conflict::{has_conflict_markers, Resolution};
use crate::document::{
    codec_for_kind, DiskContent, Document, DocumentEvent, DocumentHandle, DocumentKind,
    DocumentObserver, DocumentSnapshot, DocumentState,
};
use crate::errors::{EditorError, FileSystemError};
use crate::field::FieldValue;
use crate::fs::FileSystem;

const EVENT_CAPACITY: usize = 256;

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Registry {
    live: HashMap<String, Document>,
    parked: HashMap<String, Document>,
    next_id: u64,
}

impl Registry {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn get(&self, handle: &DocumentHandle) -> Option<&Document> {
        self.live
            .get(handle.name())
            .or_else(|| self.parked.get(handle.name()))
            .filter(|doc| doc.id() == handle.id())
    }

    fn get_mut(&mut self, handle: &DocumentHandle) -> Result<&mut Document, EditorError> {
        let name = handle.name();
        let doc = if self.live.contains_key(name) {
            self.live.get_mut(name)
        } else {
            self.parked.get_mut(name)
        };
        doc.filter(|doc| doc.id() == handle.id())
            .ok_or_else(|| EditorError::IsDeleted(name.to_string()))
    }

    /// Move `name` between the live and parked maps to match its state.
    fn settle(&mut self, name: &str) {
        if self.live.get(name).is_some_and(|d| !d.state().is_live()) {
            if let Some(doc) = self.live.remove(name) {
                debug!(name, state = %doc.state(), "parking document");
                self.parked.insert(name.to_string(), doc);
            }
        } else if self.parked.get(name).is_some_and(|d| d.state().is_live()) {
            if let Some(doc) = self.parked.remove(name) {
                self.live.insert(name.to_string(), doc);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Editor
// ---------------------------------------------------------------------------

pub(crate) struct EditorInner {
    fs: Arc<dyn FileSystem>,
    registry: Mutex<Registry>,
    events: broadcast::Sender<DocumentEvent>,
}

/// Owner of all open documents over one [`FileSystem`].
///
/// Cloning is cheap; clones share the same registry.
#[derive(Clone)]
pub struct Editor {
    inner: Arc<EditorInner>,
}

impl Editor {
    pub fn new(fs: Arc<dyn FileSystem>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(EditorInner {
                fs,
                registry: Mutex::new(Registry::default()),
                events,
            }),
        }
    }

    pub(crate) fn from_inner(inner: Arc<EditorInner>) -> Self {
        Self { inner }
    }

    pub fn file_system(&self) -> Arc<dyn FileSystem> {
        Arc::clone(&self.inner.fs)
    }

    /// Receive every state change and on-disk change across all documents.
    pub fn subscribe(&self) -> broadcast::Receiver<DocumentEvent> {
        self.inner.events.subscribe()
    }

    fn handle_for(&self, doc: &Document) -> DocumentHandle {
        DocumentHandle::new(doc.name(), doc.id(), doc.kind(), &self.inner)
    }

    /// Run one filesystem call on the blocking pool.
    async fn with_fs<T, F>(&self, call: F) -> Result<T, EditorError>
    where
        T: Send + 'static,
        F: FnOnce(&dyn FileSystem) -> Result<T, FileSystemError> + Send + 'static,
    {
        let fs = Arc::clone(&self.inner.fs);
        let result = tokio::task::spawn_blocking(move || call(fs.as_ref()))
            .await
            .map_err(|e| EditorError::TaskFailed(e.to_string()))?;
        Ok(result?)
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Every document name the filesystem holds.
    pub fn all_file_names(&self) -> Result<Vec<String>, EditorError> {
        Ok(self.inner.fs.list_names()?)
    }

    /// Handles to every live document currently in `state`, by name.
    /// Unloaded, closed and deleted instances are not live; see
    /// [`parked`](Self::parked).
    pub async fn files(&self, state: DocumentState) -> Vec<DocumentHandle> {
        let registry = self.inner.registry.lock().await;
        self.sorted_handles(registry.live.values(), state)
    }

    /// Handles to parked (unloaded, closed or deleted) instances in `state`.
    pub async fn parked(&self, state: DocumentState) -> Vec<DocumentHandle> {
        let registry = self.inner.registry.lock().await;
        self.sorted_handles(registry.parked.values(), state)
    }

    fn sorted_handles<'a>(
        &self,
        docs: impl Iterator<Item = &'a Document>,
        state: DocumentState,
    ) -> Vec<DocumentHandle> {
        let mut handles: Vec<_> = docs
            .filter(|doc| doc.state() == state)
            .map(|doc| self.handle_for(doc))
            .collect();
        handles.sort_by(|a, b| a.name().cmp(b.name()));
        handles
    }

    /// State of the instance behind `handle`; superseded instances report
    /// `Deleted`.
    pub async fn state(&self, handle: &DocumentHandle) -> DocumentState {
        let registry = self.inner.registry.lock().await;
        registry
            .get(handle)
            .map(Document::state)
            .unwrap_or(DocumentState::Deleted)
    }

    pub async fn snapshot(&self, handle: &DocumentHandle) -> Option<DocumentSnapshot> {
        let registry = self.inner.registry.lock().await;
        registry.get(handle).map(Document::snapshot)
    }

    pub async fn field(&self, handle: &DocumentHandle, key: &str) -> Option<FieldValue> {
        let registry = self.inner.registry.lock().await;
        registry.get(handle).and_then(|doc| doc.field(key))
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Open `name` as kind `K`, returning the existing instance if one is
    /// registered.
    pub async fn open<K: DocumentKind>(&self, name: &str) -> Result<K, EditorError> {
        let handle = self.open_named(name, K::codec(), None).await?;
        Ok(K::from_handle(handle))
    }

    /// Like [`open`](Self::open), registering `observer` before the
    /// document transitions so it sees the `opened` change.
    pub async fn open_observed<K: DocumentKind>(
        &self,
        name: &str,
        observer: &Arc<dyn DocumentObserver>,
    ) -> Result<K, EditorError> {
        let handle = self.open_named(name, K::codec(), Some(observer)).await?;
        Ok(K::from_handle(handle))
    }

    #[instrument(skip(self, codec, observer))]
    async fn open_named(
        &self,
        name: &str,
        codec: &'static dyn DocumentCodec,
        observer: Option<&Arc<dyn DocumentObserver>>,
    ) -> Result<DocumentHandle, EditorError> {
        let mut registry = self.inner.registry.lock().await;

        let existing = registry.live.get(name).or_else(|| {
            registry
                .parked
                .get(name)
                .filter(|doc| doc.state() != DocumentState::Deleted)
        });
        if let Some(doc) = existing {
            if doc.kind() != codec.kind() {
                return Err(EditorError::TypeMismatch {
                    name: name.to_string(),
                    expected: codec.kind().to_string(),
                    found: doc.kind().to_string(),
                });
            }
        }

        if let Some(doc) = registry.live.get_mut(name) {
            if let Some(observer) = observer {
                doc.set_observer(observer);
            }
            doc.open()?;
            return Ok(self.handle_for(doc));
        }

        let mut doc = match registry.parked.remove(name) {
            Some(doc) if doc.state() != DocumentState::Deleted => doc,
            _ => {
                let path = name.to_string();
                if !self.with_fs(move |fs| Ok(fs.exists(&path))).await? {
                    return Err(FileSystemError::NotFound(name.to_string()).into());
                }
                let id = registry.next_id();
                Document::new(id, name, codec, self.inner.events.clone())
            }
        };
        if let Some(observer) = observer {
            doc.set_observer(observer);
        }
        if let Err(e) = doc.open() {
            registry.parked.insert(name.to_string(), doc);
            return Err(e);
        }
        let handle = self.handle_for(&doc);
        registry.live.insert(name.to_string(), doc);
        Ok(handle)
    }

    /// Re-open the instance behind `handle`.
    pub async fn reopen(&self, handle: &DocumentHandle) -> Result<(), EditorError> {
        let mut registry = self.inner.registry.lock().await;
        let result = registry.get_mut(handle)?.open();
        registry.settle(handle.name());
        result
    }

    /// Open `name` as the kind registered under the tag `kind`.
    pub async fn open_kind(&self, name: &str, kind: &str) -> Result<DocumentHandle, EditorError> {
        self.open_named(name, codec_for_kind(kind)?, None).await
    }

    /// Create a new file holding the schema defaults and open it.
    pub async fn create<K: DocumentKind>(&self, name: &str) -> Result<K, EditorError> {
        let handle = self.create_named(name, K::codec()).await?;
        Ok(K::from_handle(handle))
    }

    /// Untyped [`create`](Self::create) for the kind tag `kind`.
    pub async fn create_kind(&self, name: &str, kind: &str) -> Result<DocumentHandle, EditorError> {
        self.create_named(name, codec_for_kind(kind)?).await
    }

    #[instrument(skip(self, codec), fields(kind = codec.kind()))]
    async fn create_named(
        &self,
        name: &str,
        codec: &'static dyn DocumentCodec,
    ) -> Result<DocumentHandle, EditorError> {
        let mut registry = self.inner.registry.lock().await;
        if registry.live.contains_key(name) {
            return Err(FileSystemError::AlreadyExists(name.to_string()).into());
        }

        let id = registry.next_id();
        let mut doc = Document::new(id, name, codec, self.inner.events.clone());
        let bytes = codec.serialize(doc.fields());
        let path = name.to_string();
        self.with_fs(move |fs| fs.create_bytes(&path, &bytes)).await?;
        info!(name, "created document");

        doc.open()?;
        let handle = self.handle_for(&doc);
        registry.parked.remove(name);
        registry.live.insert(name.to_string(), doc);
        Ok(handle)
    }

    /// Load the file into the document, detecting external changes and
    /// conflicts. A no-op when the file's mtime matches the last one seen.
    pub async fn read(&self, handle: &DocumentHandle) -> Result<(), EditorError> {
        let mut registry = self.inner.registry.lock().await;
        let result = self.read_document(registry.get_mut(handle)?).await;
        registry.settle(handle.name());
        result
    }

    async fn read_document(&self, doc: &mut Document) -> Result<(), EditorError> {
        doc.check_read()?;
        let name = doc.name().to_string();
        let known = doc.modified_at();
        let path = name.clone();
        let (mtime, bytes) = self
            .with_fs(move |fs| {
                let mtime = fs.modified_time(&path)?;
                if known == Some(mtime) {
                    return Ok((mtime, None));
                }
                Ok((mtime, Some(fs.read_bytes(&path)?)))
            })
            .await?;
        let Some(bytes) = bytes else {
            debug!(name = %name, "file unchanged since last read");
            return Ok(());
        };
        if known.is_some() {
            doc.notify_changed_on_disk();
        }

        let content = decode(doc.codec(), &name, &bytes)?;
        doc.apply_read(content, mtime);
        Ok(())
    }

    /// Write the document if it has unsaved edits.
    pub async fn save(&self, handle: &DocumentHandle) -> Result<(), EditorError> {
        let mut registry = self.inner.registry.lock().await;
        let doc = registry.get_mut(handle)?;
        if !doc.check_save()? {
            debug!(name = %handle.name(), state = %doc.state(), "nothing to save");
            return Ok(());
        }

        let bytes = doc.codec().serialize(doc.fields());
        let path = handle.name().to_string();
        let mtime = self
            .with_fs(move |fs| {
                fs.write_bytes(&path, &bytes)?;
                fs.modified_time(&path)
            })
            .await?;
        doc.mark_saved(mtime);
        Ok(())
    }

    pub async fn unload(&self, handle: &DocumentHandle) -> Result<(), EditorError> {
        let mut registry = self.inner.registry.lock().await;
        let result = registry.get_mut(handle)?.unload();
        registry.settle(handle.name());
        result
    }

    pub async fn close(&self, handle: &DocumentHandle) -> Result<(), EditorError> {
        let mut registry = self.inner.registry.lock().await;
        let result = registry.get_mut(handle)?.close();
        registry.settle(handle.name());
        result
    }

    /// Close the document and remove its file. If the file is already gone
    /// the document is left closed and `NotFound` is returned.
    #[instrument(skip(self, handle), fields(name = %handle.name()))]
    pub async fn delete(&self, handle: &DocumentHandle) -> Result<(), EditorError> {
        let mut registry = self.inner.registry.lock().await;
        let result = self.delete_document(registry.get_mut(handle)?).await;
        registry.settle(handle.name());
        result
    }

    async fn delete_document(&self, doc: &mut Document) -> Result<(), EditorError> {
        doc.close()?;
        let path = doc.name().to_string();
        self.with_fs(move |fs| fs.delete_bytes(&path)).await?;
        doc.mark_deleted();
        Ok(())
    }

    pub async fn resolve(
        &self,
        handle: &DocumentHandle,
        resolution: Resolution,
    ) -> Result<(), EditorError> {
        let mut registry = self.inner.registry.lock().await;
        registry.get_mut(handle)?.resolve(resolution)
    }

    /// Write one field. Writes outside read/saved/modified, or to keys the
    /// kind does not declare, are dropped.
    pub async fn set_field(
        &self,
        handle: &DocumentHandle,
        key: &str,
        value: FieldValue,
    ) -> Result<(), EditorError> {
        let mut registry = self.inner.registry.lock().await;
        registry.get_mut(handle)?.set_field(key, value);
        Ok(())
    }

    pub async fn set_observer(
        &self,
        handle: &DocumentHandle,
        observer: &Arc<dyn DocumentObserver>,
    ) -> Result<(), EditorError> {
        let mut registry = self.inner.registry.lock().await;
        registry.get_mut(handle)?.set_observer(observer);
        Ok(())
    }
}

fn decode(
    codec: &dyn DocumentCodec,
    name: &str,
    bytes: &[u8],
) -> Result<DiskContent, EditorError> {
    match codec.deserialize(bytes) {
        Ok(fields) => Ok(DiskContent::Clean(fields)),
        Err(err) if !has_conflict_markers(bytes) => Err(EditorError::Codec {
            name: name.to_string(),
            source: err,
        }),
        Err(_) => {
            let (current, incoming) =
                codec
                    .parse_conflict(bytes)
                    .map_err(|source| EditorError::Codec {
                        name: name.to_string(),
                        source,
                    })?;
            Ok(DiskContent::Conflicted { current, incoming })
        }
    }
}
