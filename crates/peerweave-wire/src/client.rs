//! Outbound connections to remote peers.

use crate::auth::{self, Credentials, RemotePeer};
use crate::error::WireError;
use crate::message::{read_message_timeout, write_message_timeout, WireMessage, WireMessageKind};
use peerweave_types::config::NodeConfig;
use peerweave_types::connection::{Connection, Event, Response};
use peerweave_types::message::NetworkMessage;
use peerweave_types::variable::Payload;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tracing::debug;

/// Join a host and port into a peer address, bracketing bare IPv6 hosts.
pub fn remote_address(host: &str, port: u16) -> String {
    if host.contains(':') && !host.starts_with('[') {
        format!("[{host}]:{port}")
    } else {
        format!("{host}:{port}")
    }
}

/// Opens one authenticated connection per exchange.
#[derive(Debug, Clone)]
pub struct PeerClient {
    credentials: Credentials,
    io_timeout: Duration,
}

impl PeerClient {
    pub fn new(credentials: Credentials, io_timeout: Duration) -> Self {
        Self {
            credentials,
            io_timeout,
        }
    }

    /// Client speaking for `config.identity`, advertising `address`.
    pub fn from_config(config: &NodeConfig, address: impl Into<String>) -> Self {
        Self::new(
            Credentials {
                identity: config.identity.clone(),
                address: address.into(),
                shared_secret: config.shared_secret.clone(),
            },
            Duration::from_secs(config.io_timeout_secs.max(1)),
        )
    }

    /// The local peer address sent as `initialization_peer`.
    pub fn address(&self) -> &str {
        &self.credentials.address
    }

    async fn open(
        &self,
        remote: &str,
    ) -> Result<(OwnedReadHalf, OwnedWriteHalf, RemotePeer), WireError> {
        let stream = tokio::time::timeout(self.io_timeout, TcpStream::connect(remote))
            .await
            .map_err(|_| WireError::Timeout("connect"))??;
        let (mut reader, mut writer) = stream.into_split();
        let peer = auth::initiate(&mut reader, &mut writer, &self.credentials, self.io_timeout).await?;
        Ok((reader, writer, peer))
    }

    /// Send `connection` to `remote` and wait for its response.
    pub async fn request(&self, remote: &str, connection: Connection) -> Result<Response, WireError> {
        let (mut reader, mut writer, peer) = self.open(remote).await?;
        let msg = WireMessage::new(WireMessageKind::Connection(connection));
        write_message_timeout(&mut writer, &msg, self.io_timeout).await?;

        let reply = read_message_timeout(&mut reader, self.io_timeout).await?;
        let kind = reply.kind_name();
        debug!(remote, peer = %peer.identity, kind, "Reply received");
        match reply.kind {
            WireMessageKind::Response(response) => Ok(response),
            WireMessageKind::Error { code, message } => Err(WireError::Remote { code, message }),
            _ => Err(WireError::UnexpectedFrame(kind.to_string())),
        }
    }

    /// Singular request carrying `data`.
    pub async fn send_data(
        &self,
        remote: &str,
        data: impl Into<Payload>,
    ) -> Result<Response, WireError> {
        let connection = Connection::singular(self.address(), data);
        self.request(remote, connection).await
    }

    /// Batch request. Fails locally if `events` is empty.
    pub async fn send_events(&self, remote: &str, events: Vec<Event>) -> Result<Response, WireError> {
        let connection = Connection::stack(self.address(), events)?;
        self.request(remote, connection).await
    }

    /// Deliver a network message without waiting for a reply.
    pub async fn notify(&self, remote: &str, message: &NetworkMessage) -> Result<(), WireError> {
        let (_reader, mut writer, _peer) = self.open(remote).await?;
        let msg = WireMessage::new(WireMessageKind::NetworkMessage(message.clone()));
        write_message_timeout(&mut writer, &msg, self.io_timeout).await?;
        writer.shutdown().await?;
        Ok(())
    }
}
