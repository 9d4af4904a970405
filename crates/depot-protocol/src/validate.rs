use crate::error::{ProtocolError, ProtocolResult};
use crate::message::{header, Message, OpCode, ResultCode};

/// Configured validation limits, supplied by the server from its config.
#[derive(Clone, Copy, Debug)]
pub struct Limits {
    /// Maximum PUT body size in bytes. Never above
    /// [`crate::message::MAX_BODY_SIZE`].
    pub max_file_size: u64,
    /// Maximum filename length in characters.
    pub max_file_name_len: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_file_size: 16 * 1024 * 1024,
            max_file_name_len: 255,
        }
    }
}

/// Validate a filename: non-empty, no path separators or `..`, only
/// `[A-Za-z0-9._-]`, at most `max_len` characters.
///
/// Together with the flat storage layout this rules out path traversal by
/// construction.
pub fn validate_file_name(name: &str, max_len: usize) -> ProtocolResult<()> {
    if name.is_empty() {
        return Err(ProtocolError::Validation("filename is empty".into()));
    }
    if name.contains('/') || name.contains('\\') || name.contains("..") {
        return Err(ProtocolError::Validation(format!(
            "filename cannot contain path separators or '..': {name}"
        )));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
    {
        return Err(ProtocolError::Validation(format!(
            "filename contains invalid characters: {name}"
        )));
    }
    if name.len() > max_len {
        return Err(ProtocolError::Validation(format!(
            "filename is too long: {} characters (max {max_len})",
            name.len()
        )));
    }
    Ok(())
}

/// Parse a file id header value: a positive integer.
pub fn parse_file_id(raw: &str) -> ProtocolResult<u64> {
    let id: u64 = raw
        .parse()
        .map_err(|_| ProtocolError::Validation(format!("file id must be an integer: {raw}")))?;
    if id == 0 {
        return Err(ProtocolError::Validation(
            "file id must be a positive integer".into(),
        ));
    }
    Ok(id)
}

/// Validate a decoded request against the per-operation shape.
///
/// Failures here are answered with `BAD_REQUEST`; the connection stays
/// open. When both `File-Name` and `ID` are present, both must be
/// individually valid; resolution later prefers `File-Name`.
pub fn validate_request(msg: &Message, limits: &Limits) -> ProtocolResult<()> {
    if !msg.is_request() {
        return Err(ProtocolError::Validation(
            "expected a request message".into(),
        ));
    }
    let op = msg
        .op_code()
        .ok_or_else(|| ProtocolError::Validation(format!("unknown operation code: {}", msg.code)))?;

    let name = msg.file_name();
    let id = msg.id_header();
    if name.is_none() && id.is_none() {
        return Err(ProtocolError::Validation(
            "either File-Name or ID header must be present".into(),
        ));
    }
    if let Some(name) = name {
        validate_file_name(name, limits.max_file_name_len)?;
    }
    if let Some(id) = id {
        parse_file_id(id)?;
    }

    if op == OpCode::Put && msg.body.len() as u64 > limits.max_file_size {
        return Err(ProtocolError::Validation(format!(
            "file size exceeds maximum limit: {} bytes (max {})",
            msg.body.len(),
            limits.max_file_size
        )));
    }
    Ok(())
}

/// Validate a response against the per-result shape before transmit.
pub fn validate_response(msg: &Message) -> ProtocolResult<()> {
    if !msg.is_response() {
        return Err(ProtocolError::Validation(
            "expected a response message".into(),
        ));
    }
    let rc = msg
        .result_code()
        .ok_or_else(|| ProtocolError::Validation(format!("unknown result code: {}", msg.code)))?;

    match rc {
        ResultCode::Success => {
            let id = msg
                .id_header()
                .ok_or_else(|| ProtocolError::Validation("success response missing ID".into()))?;
            parse_file_id(id)?;
            let name = msg.file_name().ok_or_else(|| {
                ProtocolError::Validation("success response missing File-Name".into())
            })?;
            if name.is_empty() {
                return Err(ProtocolError::Validation(
                    "success response File-Name is empty".into(),
                ));
            }
            Ok(())
        }
        _ => match msg.header(header::MESSAGE) {
            Some(reason) if !reason.is_empty() => Ok(()),
            _ => Err(ProtocolError::Validation(
                "error response missing Message header".into(),
            )),
        },
    }
}
