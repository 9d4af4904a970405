use std::collections::HashMap;

use bytes::{Buf, BufMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{ProtocolError, ProtocolResult};
use crate::message::{Message, MessageKind, MAGIC, MAX_BODY_SIZE};
use crate::validate::validate_response;

/// Upper bound on headers per message. Real messages carry at most three.
const MAX_HEADER_COUNT: u32 = 64;

/// Upper bound on a single header key or value, in bytes.
const MAX_HEADER_LEN: u32 = 64 * 1024;

/// Codec for the depot wire format.
///
/// Frame layout, all integers big-endian, strings length-prefixed UTF-8:
///
/// ```text
/// magic:u32 | kind:u8 | code:u32 | headerCount:u32
///   | { keyLen:u32, key, valLen:u32, val }*
///   | bodyLen:i64 | body
/// ```
///
/// The frame is self-delimiting (no outer length prefix), so decoding is a
/// sequence of fixed reads. Any inconsistency at this layer loses the frame
/// boundary and is fatal to the connection.
pub struct DepotCodec;

impl DepotCodec {
    /// Encode a message into a single frame.
    ///
    /// Responses are shape-checked here, so a non-conforming response (a
    /// success without `ID` and `File-Name`, an error without a reason)
    /// never reaches the wire. Requests carry no such check: the server
    /// validates them on receipt against its configured limits.
    pub fn encode(msg: &Message) -> ProtocolResult<Vec<u8>> {
        if msg.kind == MessageKind::Response {
            validate_response(msg)?;
        }
        if msg.body.len() as u64 > MAX_BODY_SIZE {
            return Err(ProtocolError::BodyTooLarge {
                size: msg.body.len() as u64,
                max: MAX_BODY_SIZE,
            });
        }

        let mut buf = Vec::with_capacity(32 + msg.body.len());
        buf.put_u32(MAGIC);
        buf.put_u8(msg.kind.wire_tag());
        buf.put_u32(msg.code);
        buf.put_u32(msg.headers.len() as u32);
        for (key, value) in &msg.headers {
            buf.put_u32(key.len() as u32);
            buf.put_slice(key.as_bytes());
            buf.put_u32(value.len() as u32);
            buf.put_slice(value.as_bytes());
        }
        buf.put_i64(msg.body.len() as i64);
        buf.put_slice(&msg.body);
        Ok(buf)
    }

    /// Decode one frame from a buffer. Returns `(message, bytes_consumed)`.
    pub fn decode(data: &[u8]) -> ProtocolResult<(Message, usize)> {
        let mut cur = data;

        let magic = read_u32(&mut cur, "magic")?;
        if magic != MAGIC {
            return Err(ProtocolError::Framing(format!(
                "invalid magic number: {magic:#010x}"
            )));
        }

        let tag = read_u8(&mut cur, "kind")?;
        let kind = MessageKind::from_wire(tag)
            .ok_or_else(|| ProtocolError::Framing(format!("unknown message kind: {tag}")))?;
        let code = read_u32(&mut cur, "code")?;

        let header_count = read_u32(&mut cur, "header count")?;
        if header_count > MAX_HEADER_COUNT {
            return Err(ProtocolError::Framing(format!(
                "header count {header_count} exceeds cap {MAX_HEADER_COUNT}"
            )));
        }
        let mut headers = HashMap::with_capacity(header_count as usize);
        for _ in 0..header_count {
            let key = read_string(&mut cur, "header key")?;
            let value = read_string(&mut cur, "header value")?;
            headers.insert(key, value);
        }

        let body_len = read_i64(&mut cur, "body length")?;
        if body_len < 0 {
            return Err(ProtocolError::Framing(format!(
                "negative body length: {body_len}"
            )));
        }
        if body_len as u64 > MAX_BODY_SIZE {
            return Err(ProtocolError::BodyTooLarge {
                size: body_len as u64,
                max: MAX_BODY_SIZE,
            });
        }
        let body_len = body_len as usize;
        if cur.remaining() < body_len {
            return Err(ProtocolError::Framing(format!(
                "incomplete body: have {}, need {}",
                cur.remaining(),
                body_len
            )));
        }
        let mut body = vec![0u8; body_len];
        cur.copy_to_slice(&mut body);

        let consumed = data.len() - cur.remaining();
        Ok((
            Message {
                kind,
                code,
                headers,
                body,
            },
            consumed,
        ))
    }

    /// Read one frame from an async stream.
    ///
    /// A clean EOF before the first byte surfaces as
    /// `ProtocolError::Io(UnexpectedEof)`; callers treat that as the peer
    /// hanging up between requests.
    pub async fn read_message<R>(reader: &mut R) -> ProtocolResult<Message>
    where
        R: AsyncRead + Unpin,
    {
        let magic = reader.read_u32().await?;
        if magic != MAGIC {
            return Err(ProtocolError::Framing(format!(
                "invalid magic number: {magic:#010x}"
            )));
        }

        let tag = reader.read_u8().await?;
        let kind = MessageKind::from_wire(tag)
            .ok_or_else(|| ProtocolError::Framing(format!("unknown message kind: {tag}")))?;
        let code = reader.read_u32().await?;

        let header_count = reader.read_u32().await?;
        if header_count > MAX_HEADER_COUNT {
            return Err(ProtocolError::Framing(format!(
                "header count {header_count} exceeds cap {MAX_HEADER_COUNT}"
            )));
        }
        let mut headers = HashMap::with_capacity(header_count as usize);
        for _ in 0..header_count {
            let key = read_string_async(reader, "header key").await?;
            let value = read_string_async(reader, "header value").await?;
            headers.insert(key, value);
        }

        let body_len = reader.read_i64().await?;
        if body_len < 0 {
            return Err(ProtocolError::Framing(format!(
                "negative body length: {body_len}"
            )));
        }
        if body_len as u64 > MAX_BODY_SIZE {
            return Err(ProtocolError::BodyTooLarge {
                size: body_len as u64,
                max: MAX_BODY_SIZE,
            });
        }
        let mut body = vec![0u8; body_len as usize];
        reader.read_exact(&mut body).await?;

        Ok(Message {
            kind,
            code,
            headers,
            body,
        })
    }

    /// Write one frame to an async stream and flush it.
    pub async fn write_message<W>(writer: &mut W, msg: &Message) -> ProtocolResult<()>
    where
        W: AsyncWrite + Unpin,
    {
        let frame = Self::encode(msg)?;
        writer.write_all(&frame).await?;
        writer.flush().await?;
        Ok(())
    }
}

fn read_u8(cur: &mut &[u8], what: &str) -> ProtocolResult<u8> {
    if cur.remaining() < 1 {
        return Err(truncated(what));
    }
    Ok(cur.get_u8())
}

fn read_u32(cur: &mut &[u8], what: &str) -> ProtocolResult<u32> {
    if cur.remaining() < 4 {
        return Err(truncated(what));
    }
    Ok(cur.get_u32())
}

fn read_i64(cur: &mut &[u8], what: &str) -> ProtocolResult<i64> {
    if cur.remaining() < 8 {
        return Err(truncated(what));
    }
    Ok(cur.get_i64())
}

fn read_string(cur: &mut &[u8], what: &str) -> ProtocolResult<String> {
    let len = read_u32(cur, what)?;
    if len > MAX_HEADER_LEN {
        return Err(ProtocolError::Framing(format!(
            "{what} length {len} exceeds cap {MAX_HEADER_LEN}"
        )));
    }
    let len = len as usize;
    if cur.remaining() < len {
        return Err(truncated(what));
    }
    let mut raw = vec![0u8; len];
    cur.copy_to_slice(&mut raw);
    String::from_utf8(raw).map_err(|_| ProtocolError::Framing(format!("{what} is not valid UTF-8")))
}

async fn read_string_async<R>(reader: &mut R, what: &str) -> ProtocolResult<String>
where
    R: AsyncRead + Unpin,
{
    let len = reader.read_u32().await?;
    if len > MAX_HEADER_LEN {
        return Err(ProtocolError::Framing(format!(
            "{what} length {len} exceeds cap {MAX_HEADER_LEN}"
        )));
    }
    let mut raw = vec![0u8; len as usize];
    reader.read_exact(&mut raw).await?;
    String::from_utf8(raw).map_err(|_| ProtocolError::Framing(format!("{what} is not valid UTF-8")))
}

fn truncated(what: &str) -> ProtocolError {
    ProtocolError::Framing(format!("truncated frame while reading {what}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{header, ResultCode};

    fn roundtrip(msg: &Message) -> Message {
        let encoded = DepotCodec::encode(msg).unwrap();
        let (decoded, consumed) = DepotCodec::decode(&encoded).unwrap();
        assert_eq!(consumed, encoded.len());
        decoded
    }

    #[test]
    fn put_request_roundtrip() {
        let msg = Message::put_request("report.pdf", vec![0xAB; 1024]);
        let decoded = roundtrip(&msg);
        assert_eq!(decoded, msg);
    }

    #[test]
    fn get_request_roundtrip() {
        let msg = Message::get_request_by_id(42);
        assert_eq!(roundtrip(&msg), msg);
    }

    #[test]
    fn empty_body_roundtrip() {
        let msg = Message::put_request("empty.bin", Vec::new());
        assert_eq!(roundtrip(&msg), msg);
    }

    #[test]
    fn ok_get_response_roundtrip() {
        let msg = Message::ok_get_response(1, "a.txt", b"contents".to_vec());
        assert_eq!(roundtrip(&msg), msg);
    }

    #[test]
    fn error_response_roundtrip() {
        let msg = Message::error_response(ResultCode::NotFound, "file not found: a.txt");
        assert_eq!(roundtrip(&msg), msg);
    }

    #[tokio::test]
    async fn nonconforming_response_is_not_transmittable() {
        let mut msg = Message::ok_response(3, "a.txt");
        msg.headers.remove(header::ID);
        let err = DepotCodec::encode(&msg).unwrap_err();
        assert!(matches!(err, ProtocolError::Validation(_)));

        let msg = Message::error_response(ResultCode::ServerError, "");
        let mut buf = Vec::new();
        let err = DepotCodec::write_message(&mut buf, &msg).await.unwrap_err();
        assert!(matches!(err, ProtocolError::Validation(_)));
        assert!(buf.is_empty(), "nothing may reach the wire");
    }

    #[test]
    fn bad_magic_is_framing_error() {
        let mut encoded = DepotCodec::encode(&Message::get_request("a.txt")).unwrap();
        encoded[0] ^= 0xFF;
        let err = DepotCodec::decode(&encoded).unwrap_err();
        assert!(matches!(err, ProtocolError::Framing(_)));
        assert!(err.is_fatal());
    }

    #[test]
    fn truncated_frame_is_framing_error() {
        let encoded = DepotCodec::encode(&Message::put_request("a.txt", vec![1, 2, 3])).unwrap();
        for cut in [0, 3, 5, 9, 13, encoded.len() - 1] {
            let err = DepotCodec::decode(&encoded[..cut]).unwrap_err();
            assert!(matches!(err, ProtocolError::Framing(_)), "cut at {cut}");
        }
    }

    #[test]
    fn unknown_kind_is_framing_error() {
        let mut encoded = DepotCodec::encode(&Message::get_request("a.txt")).unwrap();
        encoded[4] = 9;
        let err = DepotCodec::decode(&encoded).unwrap_err();
        assert!(matches!(err, ProtocolError::Framing(_)));
    }

    #[test]
    fn negative_body_length_is_framing_error() {
        let msg = Message::get_request_by_id(1);
        let mut encoded = DepotCodec::encode(&msg).unwrap();
        let len = encoded.len();
        // Body length is the trailing i64 (no body follows for a GET).
        encoded[len - 8..].copy_from_slice(&(-1i64).to_be_bytes());
        let err = DepotCodec::decode(&encoded).unwrap_err();
        assert!(matches!(err, ProtocolError::Framing(_)));
    }

    #[test]
    fn oversized_body_declaration_is_rejected_before_allocation() {
        let msg = Message::get_request_by_id(1);
        let mut encoded = DepotCodec::encode(&msg).unwrap();
        let len = encoded.len();
        encoded[len - 8..].copy_from_slice(&(i64::MAX).to_be_bytes());
        let err = DepotCodec::decode(&encoded).unwrap_err();
        assert!(matches!(err, ProtocolError::BodyTooLarge { .. }));
        assert!(err.is_fatal());
    }

    #[test]
    fn unknown_header_keys_survive_the_roundtrip() {
        let mut msg = Message::get_request("a.txt");
        msg.headers.insert("X-Custom".into(), "value".into());
        let decoded = roundtrip(&msg);
        assert_eq!(decoded.header("X-Custom"), Some("value"));
        assert_eq!(decoded.header(header::FILE_NAME), Some("a.txt"));
    }

    #[tokio::test]
    async fn async_read_matches_sync_decode() {
        let msg = Message::put_request("b.bin", vec![7u8; 4096]);
        let encoded = DepotCodec::encode(&msg).unwrap();
        let mut cursor = std::io::Cursor::new(encoded);
        let decoded = DepotCodec::read_message(&mut cursor).await.unwrap();
        assert_eq!(decoded, msg);
    }

    #[tokio::test]
    async fn async_write_then_read_roundtrip() {
        let msg = Message::ok_get_response(9, "x.txt", b"abc".to_vec());
        let mut buf = Vec::new();
        DepotCodec::write_message(&mut buf, &msg).await.unwrap();
        let mut cursor = std::io::Cursor::new(buf);
        let decoded = DepotCodec::read_message(&mut cursor).await.unwrap();
        assert_eq!(decoded, msg);
    }

    #[tokio::test]
    async fn async_eof_mid_frame_is_io_error() {
        let encoded = DepotCodec::encode(&Message::put_request("a.txt", vec![1; 100])).unwrap();
        let mut cursor = std::io::Cursor::new(encoded[..encoded.len() - 10].to_vec());
        let err = DepotCodec::read_message(&mut cursor).await.unwrap_err();
        assert!(matches!(err, ProtocolError::Io(_)));
    }

    #[test]
    fn back_to_back_frames_decode_independently() {
        let first = Message::put_request("a.txt", b"one".to_vec());
        let second = Message::get_request("a.txt");
        let mut stream = DepotCodec::encode(&first).unwrap();
        stream.extend_from_slice(&DepotCodec::encode(&second).unwrap());

        let (m1, used) = DepotCodec::decode(&stream).unwrap();
        assert_eq!(m1, first);
        let (m2, rest) = DepotCodec::decode(&stream[used..]).unwrap();
        assert_eq!(m2, second);
        assert_eq!(used + rest, stream.len());
    }
}
