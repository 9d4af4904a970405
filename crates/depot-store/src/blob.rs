use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::fs;

use crate::error::{StoreError, StoreResult};
use crate::locks::LockRegistry;

/// On-disk blob store: raw bytes under `root/name`, flat namespace.
///
/// Names are assumed to have passed protocol-level filename validation, so
/// joining them onto the root cannot escape it. Every operation takes the
/// appropriate per-key lock for its own duration only; the lock is never
/// held across calls into other components.
pub struct BlobStore {
    root: PathBuf,
    locks: Arc<LockRegistry>,
}

impl BlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            locks: Arc::new(LockRegistry::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Write `bytes` under `name`, creating parent directories as needed.
    /// Overwrites silently; the orchestrator's existence check is what
    /// makes PUT non-idempotent, not the store.
    pub async fn save(&self, name: &str, bytes: &[u8]) -> StoreResult<()> {
        let _guard = self.locks.exclusive(name).await;
        let path = self.path_for(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| self.io_err(parent, e))?;
        }
        fs::write(&path, bytes)
            .await
            .map_err(|e| self.io_err(&path, e))?;
        tracing::debug!(name, bytes = bytes.len(), "blob saved");
        Ok(())
    }

    /// Read the blob under `name`. `None` if no such blob exists.
    pub async fn read(&self, name: &str) -> StoreResult<Option<Vec<u8>>> {
        let _guard = self.locks.shared(name).await;
        let path = self.path_for(name);
        match fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(self.io_err(&path, e)),
        }
    }

    /// Delete the blob under `name`, returning its prior content so the
    /// caller can restore it if a later step fails. `None` if no such
    /// blob existed.
    pub async fn delete(&self, name: &str) -> StoreResult<Option<Vec<u8>>> {
        let _guard = self.locks.exclusive(name).await;
        let path = self.path_for(name);
        let prior = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.io_err(&path, e)),
        };
        match fs::remove_file(&path).await {
            Ok(()) => {
                tracing::debug!(name, "blob deleted");
                Ok(Some(prior))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(self.io_err(&path, e)),
        }
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    fn io_err(&self, path: &Path, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

impl std::fmt::Debug for BlobStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlobStore").field("root", &self.root).finish()
    }
}
