use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::IndexResult;

/// One id↔name mapping in the index.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: u64,
    pub name: String,
}

/// The id↔name directory for stored blobs.
///
/// Every operation may fail with an [`crate::IndexError`]; the
/// orchestrator maps such failures to `SERVER_ERROR` responses. Lookups
/// of absent records are `Ok(None)` / `Ok(false)`, never errors.
#[async_trait]
pub trait FileIndex: Send + Sync {
    /// Insert a record for `name` and return the generated id.
    ///
    /// Ids start at 1 and are assigned densely. Inserting a name that
    /// already has a live record fails with `Duplicate`.
    async fn insert(&self, name: &str) -> IndexResult<u64>;

    /// Remove the record with `id`, returning it if it existed.
    async fn remove_by_id(&self, id: u64) -> IndexResult<Option<FileRecord>>;

    /// The name mapped to `id`, if any.
    async fn name_by_id(&self, id: u64) -> IndexResult<Option<String>>;

    /// The id mapped to `name`, if any.
    async fn id_by_name(&self, name: &str) -> IndexResult<Option<u64>>;

    /// Whether a record with `id` exists.
    async fn exists_by_id(&self, id: u64) -> IndexResult<bool> {
        Ok(self.name_by_id(id).await?.is_some())
    }

    /// Whether a record with `name` exists.
    async fn exists_by_name(&self, name: &str) -> IndexResult<bool> {
        Ok(self.id_by_name(name).await?.is_some())
    }

    /// Release backend resources. Called once, at server shutdown.
    async fn close(&self) -> IndexResult<()> {
        Ok(())
    }
}
