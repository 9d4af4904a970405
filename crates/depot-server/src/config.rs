use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use depot_protocol::Limits;

use crate::error::{ServerError, ServerResult};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    /// Directory holding blob files, flat, one per stored name.
    pub storage_root: PathBuf,
    /// Index snapshot path. `None` keeps the index in memory only.
    pub index_path: Option<PathBuf>,
    /// Configured session-worker cap; the effective cap is
    /// `min(worker_threads, available_parallelism)`.
    pub worker_threads: usize,
    pub max_file_size: u64,
    pub max_file_name_len: usize,
    /// How long `stop()` waits for in-flight sessions before aborting them.
    pub shutdown_grace_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:5995".parse().unwrap(),
            storage_root: PathBuf::from("storage"),
            index_path: None,
            worker_threads: 16,
            max_file_size: 16 * 1024 * 1024,
            max_file_name_len: 255,
            shutdown_grace_secs: 30,
        }
    }
}

impl ServerConfig {
    /// Load configuration from a TOML file. Missing keys fall back to
    /// defaults.
    pub fn from_toml_file(path: impl AsRef<Path>) -> ServerResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            ServerError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        toml::from_str(&raw)
            .map_err(|e| ServerError::Config(format!("cannot parse {}: {e}", path.display())))
    }

    /// Validation limits handed to the protocol layer.
    pub fn limits(&self) -> Limits {
        Limits {
            max_file_size: self.max_file_size.min(depot_protocol::MAX_BODY_SIZE),
            max_file_name_len: self.max_file_name_len,
        }
    }

    /// Session-worker cap actually applied.
    pub fn effective_workers(&self) -> usize {
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        self.worker_threads.min(cores).max(1)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}
