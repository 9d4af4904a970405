use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::sync::RwLock;

use crate::error::{IndexError, IndexResult};
use crate::traits::{FileIndex, FileRecord};

/// File-backed index: a bincode snapshot written through on every
/// mutation.
///
/// The snapshot is written to a sibling temp file and renamed into place,
/// so a crash mid-write leaves the previous snapshot intact. The `next_id`
/// counter is persisted too, so ids stay unique across restarts.
///
/// Mutations hold the state write lock across the snapshot write, which
/// serializes them. Write throughput is traded for simplicity, which fits
/// a single-server metadata directory.
pub struct PersistentFileIndex {
    path: PathBuf,
    state: RwLock<State>,
}

#[derive(Serialize, Deserialize)]
struct State {
    next_id: u64,
    by_id: HashMap<u64, String>,
    #[serde(skip)]
    by_name: HashMap<String, u64>,
}

impl State {
    fn empty() -> Self {
        State {
            next_id: 1,
            by_id: HashMap::new(),
            by_name: HashMap::new(),
        }
    }

    fn rebuild_name_map(&mut self) {
        self.by_name = self
            .by_id
            .iter()
            .map(|(id, name)| (name.clone(), *id))
            .collect();
    }
}

impl PersistentFileIndex {
    /// Open the index at `path`, loading an existing snapshot if present.
    pub async fn open(path: impl Into<PathBuf>) -> IndexResult<Self> {
        let path = path.into();
        let state = match fs::read(&path).await {
            Ok(bytes) => {
                let mut state: State = bincode::deserialize(&bytes)
                    .map_err(|e| IndexError::Corrupt(e.to_string()))?;
                state.rebuild_name_map();
                tracing::info!(
                    path = %path.display(),
                    records = state.by_id.len(),
                    "index snapshot loaded"
                );
                state
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => State::empty(),
            Err(e) => return Err(IndexError::Io(e)),
        };
        Ok(Self {
            path,
            state: RwLock::new(state),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, state: &State) -> IndexResult<()> {
        let bytes =
            bincode::serialize(state).map_err(|e| IndexError::Serialization(e.to_string()))?;
        let tmp = self.path.with_extension("tmp");
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&tmp, &bytes).await?;
        fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl FileIndex for PersistentFileIndex {
    async fn insert(&self, name: &str) -> IndexResult<u64> {
        let mut state = self.state.write().await;
        if state.by_name.contains_key(name) {
            return Err(IndexError::Duplicate(name.to_string()));
        }
        let id = state.next_id;
        state.next_id += 1;
        state.by_id.insert(id, name.to_string());
        state.by_name.insert(name.to_string(), id);
        // A mutation that fails to reach disk must not stay live in
        // memory, or a retry would be refused as a duplicate.
        if let Err(e) = self.persist(&state).await {
            state.by_id.remove(&id);
            state.by_name.remove(name);
            state.next_id = id;
            return Err(e);
        }
        Ok(id)
    }

    async fn remove_by_id(&self, id: u64) -> IndexResult<Option<FileRecord>> {
        let mut state = self.state.write().await;
        let Some(name) = state.by_id.remove(&id) else {
            return Ok(None);
        };
        state.by_name.remove(&name);
        if let Err(e) = self.persist(&state).await {
            state.by_id.insert(id, name.clone());
            state.by_name.insert(name, id);
            return Err(e);
        }
        Ok(Some(FileRecord { id, name }))
    }

    async fn name_by_id(&self, id: u64) -> IndexResult<Option<String>> {
        let state = self.state.read().await;
        Ok(state.by_id.get(&id).cloned())
    }

    async fn id_by_name(&self, name: &str) -> IndexResult<Option<u64>> {
        let state = self.state.read().await;
        Ok(state.by_name.get(name).copied())
    }

    async fn close(&self) -> IndexResult<()> {
        let state = self.state.read().await;
        self.persist(&state).await?;
        tracing::info!(path = %self.path.display(), "index closed");
        Ok(())
    }
}

impl std::fmt::Debug for PersistentFileIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistentFileIndex")
            .field("path", &self.path)
            .finish()
    }
}
