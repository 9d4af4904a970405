use std::net::SocketAddr;

use tokio::io::{AsyncRead, AsyncWrite, BufReader, BufWriter};

use depot_protocol::{DepotCodec, ProtocolError};

use crate::service::FileService;

/// One connection's request-response loop.
///
/// Reads a framed request, hands it to the session-owned [`FileService`],
/// writes the framed response, and repeats until the peer hangs up, the
/// byte stream loses framing (connection dropped, no response attempted),
/// or a write fails. The service, and with it the session's index handle,
/// is dropped when the loop exits, whatever the exit reason.
pub async fn run_session<S>(stream: S, peer: SocketAddr, service: FileService)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (reader, writer) = tokio::io::split(stream);
    let mut reader = BufReader::new(reader);
    let mut writer = BufWriter::new(writer);

    loop {
        let request = match DepotCodec::read_message(&mut reader).await {
            Ok(msg) => msg,
            Err(ProtocolError::Io(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                tracing::debug!(%peer, "peer disconnected");
                break;
            }
            Err(e) => {
                tracing::warn!(%peer, error = %e, "dropping connection");
                break;
            }
        };
        tracing::debug!(%peer, "request received");

        let response = service.process(request).await;

        if let Err(e) = DepotCodec::write_message(&mut writer, &response).await {
            tracing::warn!(%peer, error = %e, "failed to send response, closing connection");
            break;
        }
        tracing::debug!(%peer, code = response.code, "response sent");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use depot_index::MemoryFileIndex;
    use depot_protocol::{Limits, Message, ResultCode, MAGIC};
    use depot_store::BlobStore;
    use tempfile::tempdir;
    use tokio::io::AsyncWriteExt;

    fn peer() -> SocketAddr {
        "127.0.0.1:9".parse().unwrap()
    }

    fn service(dir: &tempfile::TempDir) -> FileService {
        FileService::new(
            Arc::new(MemoryFileIndex::new()),
            Arc::new(BlobStore::new(dir.path().join("blobs"))),
            Limits::default(),
        )
    }

    #[tokio::test]
    async fn serves_multiple_requests_on_one_connection() {
        let dir = tempdir().unwrap();
        let (mut client, server_side) = tokio::io::duplex(1024 * 1024);
        let session = tokio::spawn(run_session(server_side, peer(), service(&dir)));

        let put = Message::put_request("a.txt", b"hello".to_vec());
        DepotCodec::write_message(&mut client, &put).await.unwrap();
        let response = DepotCodec::read_message(&mut client).await.unwrap();
        assert_eq!(response.result_code(), Some(ResultCode::Success));

        let get = Message::get_request("a.txt");
        DepotCodec::write_message(&mut client, &get).await.unwrap();
        let response = DepotCodec::read_message(&mut client).await.unwrap();
        assert_eq!(response.result_code(), Some(ResultCode::Success));
        assert_eq!(response.body, b"hello");

        drop(client);
        session.await.unwrap();
    }

    #[tokio::test]
    async fn invalid_request_keeps_the_connection_open() {
        let dir = tempdir().unwrap();
        let (mut client, server_side) = tokio::io::duplex(64 * 1024);
        let session = tokio::spawn(run_session(server_side, peer(), service(&dir)));

        let bad = Message::put_request("../escape", b"x".to_vec());
        DepotCodec::write_message(&mut client, &bad).await.unwrap();
        let response = DepotCodec::read_message(&mut client).await.unwrap();
        assert_eq!(response.result_code(), Some(ResultCode::BadRequest));

        // The same connection still serves valid requests.
        let ok = Message::put_request("fine.txt", b"x".to_vec());
        DepotCodec::write_message(&mut client, &ok).await.unwrap();
        let response = DepotCodec::read_message(&mut client).await.unwrap();
        assert_eq!(response.result_code(), Some(ResultCode::Success));

        drop(client);
        session.await.unwrap();
    }

    #[tokio::test]
    async fn framing_error_drops_the_connection_without_a_response() {
        let dir = tempdir().unwrap();
        let (mut client, server_side) = tokio::io::duplex(64 * 1024);
        let session = tokio::spawn(run_session(server_side, peer(), service(&dir)));

        // Wrong magic: the session must drop the connection silently.
        let mut garbage = (MAGIC ^ 0xFFFF_FFFF).to_be_bytes().to_vec();
        garbage.extend_from_slice(&[0u8; 16]);
        client.write_all(&garbage).await.unwrap();
        client.flush().await.unwrap();

        session.await.unwrap();
        let read = DepotCodec::read_message(&mut client).await;
        assert!(read.is_err(), "no response may follow a framing error");
    }
}
