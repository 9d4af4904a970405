use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::error::{IndexError, IndexResult};
use crate::traits::{FileIndex, FileRecord};

/// In-memory, `HashMap`-based index.
///
/// Intended for tests and embedding. State is held behind a `RwLock`;
/// nothing survives the process.
pub struct MemoryFileIndex {
    inner: RwLock<Inner>,
}

struct Inner {
    by_id: HashMap<u64, String>,
    by_name: HashMap<String, u64>,
    next_id: u64,
}

impl MemoryFileIndex {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                by_id: HashMap::new(),
                by_name: HashMap::new(),
                next_id: 1,
            }),
        }
    }

    /// Number of live records.
    pub fn len(&self) -> usize {
        self.inner.read().expect("lock poisoned").by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryFileIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FileIndex for MemoryFileIndex {
    async fn insert(&self, name: &str) -> IndexResult<u64> {
        let mut inner = self.inner.write().expect("lock poisoned");
        if inner.by_name.contains_key(name) {
            return Err(IndexError::Duplicate(name.to_string()));
        }
        let id = inner.next_id;
        inner.next_id += 1;
        inner.by_id.insert(id, name.to_string());
        inner.by_name.insert(name.to_string(), id);
        Ok(id)
    }

    async fn remove_by_id(&self, id: u64) -> IndexResult<Option<FileRecord>> {
        let mut inner = self.inner.write().expect("lock poisoned");
        match inner.by_id.remove(&id) {
            Some(name) => {
                inner.by_name.remove(&name);
                Ok(Some(FileRecord { id, name }))
            }
            None => Ok(None),
        }
    }

    async fn name_by_id(&self, id: u64) -> IndexResult<Option<String>> {
        let inner = self.inner.read().expect("lock poisoned");
        Ok(inner.by_id.get(&id).cloned())
    }

    async fn id_by_name(&self, name: &str) -> IndexResult<Option<u64>> {
        let inner = self.inner.read().expect("lock poisoned");
        Ok(inner.by_name.get(name).copied())
    }
}

impl std::fmt::Debug for MemoryFileIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryFileIndex")
            .field("records", &self.len())
            .finish()
    }
}
