//! Blob storage for the depot file store.
//!
//! Two pieces: a [`LockRegistry`] handing out one read/write lock per
//! resource key, and a [`BlobStore`] that performs filesystem save, read,
//! and delete under those locks.
//!
//! # Design Rules
//!
//! 1. One lock per distinct key, created lazily, never removed. The
//!    keyspace is validated filenames, so its cardinality is bounded.
//! 2. Locks are held for the duration of a single filesystem operation,
//!    never across calls into other components. Callers hold at most one
//!    key's lock at a time, so no deadlock is possible.
//! 3. Reads of a missing blob are `None`, not an error; only real I/O
//!    failures propagate.

pub mod blob;
pub mod error;
pub mod locks;

pub use blob::BlobStore;
pub use error::{StoreError, StoreResult};
pub use locks::LockRegistry;
