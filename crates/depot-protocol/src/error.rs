use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Malformed byte stream. Connection-fatal: no response is possible
    /// because the frame boundary is lost.
    #[error("framing error: {0}")]
    Framing(String),

    /// Well-framed but semantically invalid message. The reason is sent
    /// back to the peer in a `BAD_REQUEST` response.
    #[error("invalid message: {0}")]
    Validation(String),

    /// Declared body length exceeds the hard protocol cap. Treated like a
    /// framing error: the frame cannot be safely consumed.
    #[error("message body too large: {size} bytes (max {max})")]
    BodyTooLarge { size: u64, max: u64 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProtocolError {
    /// Whether this error must tear down the connection. Validation
    /// failures keep the connection open; everything else loses framing.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, ProtocolError::Validation(_))
    }
}

pub type ProtocolResult<T> = Result<T, ProtocolError>;
