//! [`FileSystem`] over a directory on disk.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Component, Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::{debug, instrument};

use super::FileSystem;
use crate::errors::FileSystemError;

/// Documents stored as files under `root`, listed by extension.
///
/// Hidden directories (`.git` among them) are skipped when listing.
#[derive(Debug, Clone)]
pub struct LocalFileSystem {
    root: PathBuf,
    extension: String,
}

impl LocalFileSystem {
    pub fn new(root: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        let extension = extension.into();
        Self {
            root: root.into(),
            extension: extension.trim_start_matches('.').to_string(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    fn path(&self, name: &str) -> Result<PathBuf, FileSystemError> {
        let relative = Path::new(name);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if name.is_empty() || escapes {
            return Err(FileSystemError::Io {
                name: name.to_string(),
                source: std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    "document names must be relative paths inside the data directory",
                ),
            });
        }
        Ok(self.root.join(relative))
    }

    fn ensure_parent(&self, name: &str, path: &Path) -> Result<(), FileSystemError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| FileSystemError::from_io(name, e))?;
        }
        Ok(())
    }

    fn matches_extension(&self, path: &Path) -> bool {
        path.extension().and_then(|e| e.to_str()) == Some(self.extension.as_str())
    }
}

impl FileSystem for LocalFileSystem {
    #[instrument(skip(self), fields(root = %self.root.display()))]
    fn list_names(&self) -> Result<Vec<String>, FileSystemError> {
        let root_name = self.root.display().to_string();
        if !self.root.exists() {
            return Ok(Vec::new());
        }

        let mut names = Vec::new();
        let mut pending = vec![self.root.clone()];
        while let Some(dir) = pending.pop() {
            let entries = fs::read_dir(&dir).map_err(|e| FileSystemError::from_io(&root_name, e))?;
            for entry in entries {
                let entry = entry.map_err(|e| FileSystemError::from_io(&root_name, e))?;
                let path = entry.path();
                let hidden = entry.file_name().to_string_lossy().starts_with('.');
                let file_type = entry
                    .file_type()
                    .map_err(|e| FileSystemError::from_io(&root_name, e))?;
                if file_type.is_dir() {
                    if !hidden {
                        pending.push(path);
                    }
                } else if file_type.is_file() && self.matches_extension(&path) {
                    if let Ok(relative) = path.strip_prefix(&self.root) {
                        let name = relative
                            .components()
                            .map(|c| c.as_os_str().to_string_lossy())
                            .collect::<Vec<_>>()
                            .join("/");
                        names.push(name);
                    }
                }
            }
        }
        names.sort();
        debug!(count = names.len(), "listed documents");
        Ok(names)
    }

    fn read_bytes(&self, name: &str) -> Result<Vec<u8>, FileSystemError> {
        let path = self.path(name)?;
        fs::read(&path).map_err(|e| FileSystemError::from_io(name, e))
    }

    fn write_bytes(&self, name: &str, bytes: &[u8]) -> Result<(), FileSystemError> {
        let path = self.path(name)?;
        self.ensure_parent(name, &path)?;
        fs::write(&path, bytes).map_err(|e| FileSystemError::from_io(name, e))
    }

    fn create_bytes(&self, name: &str, bytes: &[u8]) -> Result<(), FileSystemError> {
        let path = self.path(name)?;
        self.ensure_parent(name, &path)?;
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| FileSystemError::from_io(name, e))?;
        file.write_all(bytes)
            .map_err(|e| FileSystemError::from_io(name, e))
    }

    fn delete_bytes(&self, name: &str) -> Result<(), FileSystemError> {
        let path = self.path(name)?;
        fs::remove_file(&path).map_err(|e| FileSystemError::from_io(name, e))
    }

    fn exists(&self, name: &str) -> bool {
        self.path(name).map(|p| p.is_file()).unwrap_or(false)
    }

    fn modified_time(&self, name: &str) -> Result<DateTime<Utc>, FileSystemError> {
        let path = self.path(name)?;
        let modified = fs::metadata(&path)
            .and_then(|m| m.modified())
            .map_err(|e| FileSystemError::from_io(name, e))?;
        Ok(DateTime::<Utc>::from(modified))
    }
}
