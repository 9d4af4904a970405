//! TCP server for the depot file store.
//!
//! Accepts persistent connections, bounds session concurrency with a
//! worker-pool-sized semaphore, and runs one session loop per connection:
//! read a framed request, hand it to the [`FileService`] orchestrator,
//! write the framed response, repeat until the peer hangs up or framing
//! is lost.
//!
//! The orchestrator coordinates the blob store and the metadata index
//! with compensating rollback, so a failure in either store never leaves
//! a blob without a record (or a record without a blob) visible to
//! clients.

pub mod config;
pub mod error;
pub mod server;
pub mod service;
pub mod session;

pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use server::FileServer;
pub use service::FileService;
