use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};

/// Guard for shared (read) access to a resource key.
pub type SharedGuard = OwnedRwLockReadGuard<()>;

/// Guard for exclusive (write) access to a resource key.
pub type ExclusiveGuard = OwnedRwLockWriteGuard<()>;

/// Per-resource lock registry shared by all connections.
///
/// Maps a resource key (a filename) to one read/write lock. Locks are
/// created lazily on first access and never removed: two concurrent first
/// accesses to the same new key observe the same lock instance because
/// installation happens under the registry mutex. Distinct keys never
/// contend.
///
/// Guards are RAII, so release on every exit path is structural rather
/// than a caller obligation.
pub struct LockRegistry {
    locks: Mutex<HashMap<String, Arc<RwLock<()>>>>,
}

impl LockRegistry {
    pub fn new() -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Acquire shared access to `key`. Many holders may coexist.
    pub async fn shared(&self, key: &str) -> SharedGuard {
        self.lock_for(key).read_owned().await
    }

    /// Acquire exclusive access to `key`, excluding all shared and other
    /// exclusive holders of the same key.
    pub async fn exclusive(&self, key: &str) -> ExclusiveGuard {
        self.lock_for(key).write_owned().await
    }

    /// Number of distinct keys ever locked.
    pub fn key_count(&self) -> usize {
        self.locks.lock().expect("lock poisoned").len()
    }

    fn lock_for(&self, key: &str) -> Arc<RwLock<()>> {
        let mut map = self.locks.lock().expect("lock poisoned");
        map.entry(key.to_string())
            .or_insert_with(|| Arc::new(RwLock::new(())))
            .clone()
    }
}

impl Default for LockRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for LockRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockRegistry")
            .field("key_count", &self.key_count())
            .finish()
    }
}
