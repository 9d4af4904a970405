//! Metadata index for the depot file store.
//!
//! The index is the authoritative id↔name directory for stored blobs. The
//! rest of the system reaches it only through the [`FileIndex`] trait, so
//! the backing engine is swappable.
//!
//! Backends:
//!
//! - [`MemoryFileIndex`] -- `HashMap`-based, for tests and embedding
//! - [`PersistentFileIndex`] -- bincode snapshot on disk, written through
//!   on every mutation
//!
//! Invariants all backends must hold:
//!
//! 1. Ids are assigned by the index on insert, start at 1, and are dense.
//! 2. A name is unique among live records; inserting a duplicate fails.
//! 3. Records are created and destroyed, never mutated in place.

pub mod error;
pub mod memory;
pub mod persist;
pub mod traits;

pub use error::{IndexError, IndexResult};
pub use memory::MemoryFileIndex;
pub use persist::PersistentFileIndex;
pub use traits::{FileIndex, FileRecord};
