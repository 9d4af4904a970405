use thiserror::Error;

/// Errors from metadata index operations.
#[derive(Debug, Error)]
pub enum IndexError {
    /// A live record already exists for this name.
    #[error("name already indexed: {0}")]
    Duplicate(String),

    /// The persisted snapshot cannot be decoded.
    #[error("corrupt index snapshot: {0}")]
    Corrupt(String),

    /// Snapshot encoding failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// I/O failure in the backing storage.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type IndexResult<T> = Result<T, IndexError>;
