use std::net::SocketAddr;

use anyhow::Context;
use tokio::net::TcpStream;

use depot_protocol::{DepotCodec, Message};

/// A client-side connection to a depot server. Requests and responses
/// alternate strictly on the one connection.
pub struct DepotClient {
    stream: TcpStream,
}

impl DepotClient {
    pub async fn connect(addr: SocketAddr) -> anyhow::Result<Self> {
        let stream = TcpStream::connect(addr)
            .await
            .with_context(|| format!("cannot connect to {addr}"))?;
        Ok(Self { stream })
    }

    /// Send one request and wait for its response.
    pub async fn send(&mut self, request: &Message) -> anyhow::Result<Message> {
        DepotCodec::write_message(&mut self.stream, request)
            .await
            .context("failed to send request")?;
        DepotCodec::read_message(&mut self.stream)
            .await
            .context("failed to read response")
    }
}
