//! Filesystem blob store for uploaded documents.
//!
//! Documents' raw bytes live under a configured root directory, addressed by
//! the opaque `file_path` key recorded on the document row
//! (`<uploader-id>/<uuid>.<ext>`). Keys are validated so a stored key can
//! never escape the root.

use anyhow::{bail, Context, Result};
use std::path::{Component, Path, PathBuf};

#[derive(Debug, Clone)]
pub struct BlobStore {
    root: PathBuf,
}

impl BlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, key: &str) -> Result<PathBuf> {
        if key.is_empty() {
            bail!("blob key must not be empty");
        }
        let rel = Path::new(key);
        if rel.is_absolute()
            || rel
                .components()
                .any(|c| !matches!(c, Component::Normal(_)))
        {
            bail!("invalid blob key: {}", key);
        }
        Ok(self.root.join(rel))
    }

    pub fn put(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let path = self.resolve(key)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create blob directory for {}", key))?;
        }
        std::fs::write(&path, bytes).with_context(|| format!("Failed to write blob {}", key))
    }

    pub fn get(&self, key: &str) -> Result<Vec<u8>> {
        let path = self.resolve(key)?;
        std::fs::read(&path).with_context(|| format!("Failed to read blob {}", key))
    }

    /// Removes a blob. A key that is already gone is not an error — the
    /// replace-duplicate sequence may be retried after a partial failure.
    pub fn delete(&self, key: &str) -> Result<()> {
        let path = self.resolve(key)?;
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("Failed to delete blob {}", key)),
        }
    }

    pub fn exists(&self, key: &str) -> bool {
        self.resolve(key).map(|p| p.exists()).unwrap_or(false)
    }
}
