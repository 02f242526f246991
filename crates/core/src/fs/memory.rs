//! In-memory [`FileSystem`].

use std::collections::BTreeMap;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};

use super::FileSystem;
use crate::errors::FileSystemError;

struct Entry {
    bytes: Vec<u8>,
    modified: DateTime<Utc>,
}

#[derive(Default)]
struct Inner {
    files: BTreeMap<String, Entry>,
    ticks: i64,
}

/// Files held in a map.
///
/// Modification times come from a logical clock that advances on every
/// write, so two writes never share an mtime.
pub struct MemoryFileSystem {
    epoch: DateTime<Utc>,
    inner: Mutex<Inner>,
}

impl Default for MemoryFileSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryFileSystem {
    pub fn new() -> Self {
        Self {
            epoch: Utc::now(),
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Builder-style seeding.
    pub fn with_file(self, name: &str, bytes: impl AsRef<[u8]>) -> Self {
        self.store(name, bytes.as_ref().to_vec());
        self
    }

    /// Advance the mtime of `name` without changing its bytes.
    pub fn touch(&self, name: &str) -> Result<(), FileSystemError> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let modified = self.tick(&mut inner);
        let entry = inner
            .files
            .get_mut(name)
            .ok_or_else(|| FileSystemError::NotFound(name.to_string()))?;
        entry.modified = modified;
        Ok(())
    }

    fn tick(&self, inner: &mut Inner) -> DateTime<Utc> {
        inner.ticks += 1;
        self.epoch + Duration::milliseconds(inner.ticks)
    }

    fn store(&self, name: &str, bytes: Vec<u8>) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let modified = self.tick(&mut inner);
        inner.files.insert(name.to_string(), Entry { bytes, modified });
    }
}

impl FileSystem for MemoryFileSystem {
    fn list_names(&self) -> Result<Vec<String>, FileSystemError> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        Ok(inner.files.keys().cloned().collect())
    }

    fn read_bytes(&self, name: &str) -> Result<Vec<u8>, FileSystemError> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner
            .files
            .get(name)
            .map(|e| e.bytes.clone())
            .ok_or_else(|| FileSystemError::NotFound(name.to_string()))
    }

    fn write_bytes(&self, name: &str, bytes: &[u8]) -> Result<(), FileSystemError> {
        self.store(name, bytes.to_vec());
        Ok(())
    }

    fn create_bytes(&self, name: &str, bytes: &[u8]) -> Result<(), FileSystemError> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if inner.files.contains_key(name) {
            return Err(FileSystemError::AlreadyExists(name.to_string()));
        }
        let modified = self.tick(&mut inner);
        inner.files.insert(
            name.to_string(),
            Entry {
                bytes: bytes.to_vec(),
                modified,
            },
        );
        Ok(())
    }

    fn delete_bytes(&self, name: &str) -> Result<(), FileSystemError> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner
            .files
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| FileSystemError::NotFound(name.to_string()))
    }

    fn exists(&self, name: &str) -> bool {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.files.contains_key(name)
    }

    fn modified_time(&self, name: &str) -> Result<DateTime<Utc>, FileSystemError> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner
            .files
            .get(name)
            .map(|e| e.modified)
            .ok_or_else(|| FileSystemError::NotFound(name.to_string()))
    }
}
