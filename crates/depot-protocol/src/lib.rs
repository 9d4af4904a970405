//! Wire protocol for the depot file store.
//!
//! Defines the framed binary message format exchanged between depot clients
//! and servers, the codec that reads and writes it, and the semantic
//! validation applied to requests and responses.
//!
//! Framing and validation are deliberately separate layers: a malformed
//! byte stream (bad magic, truncated frame) is connection-fatal and yields
//! no response, while a well-framed but semantically invalid request is
//! answered with a `BAD_REQUEST` response on a connection that stays open.

pub mod codec;
pub mod error;
pub mod message;
pub mod validate;

pub use codec::DepotCodec;
pub use error::{ProtocolError, ProtocolResult};
pub use message::{
    header, Message, MessageKind, OpCode, ResultCode, MAGIC, MAX_BODY_SIZE,
};
pub use validate::{parse_file_id, validate_file_name, validate_request, validate_response, Limits};
