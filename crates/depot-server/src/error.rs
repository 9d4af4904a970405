use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    /// Request or response failed protocol validation.
    #[error("protocol error: {0}")]
    Protocol(#[from] depot_protocol::ProtocolError),

    /// The resource selector did not resolve to a live record.
    #[error("not found: {0}")]
    NotFound(String),

    /// Filesystem failure in the blob store.
    #[error("store error: {0}")]
    Store(#[from] depot_store::StoreError),

    /// Metadata index failure.
    #[error("index error: {0}")]
    Index(#[from] depot_index::IndexError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type ServerResult<T> = Result<T, ServerError>;
