//! Wire frames and their codec.
//!
//! Each frame is a 4-byte big-endian length followed by a JSON body.

use crate::error::WireError;
use peerweave_types::connection::{Connection, ErrorBody, Response};
use peerweave_types::message::NetworkMessage;
use peerweave_types::variable::Payload;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Current protocol version.
pub const PROTOCOL_VERSION: u32 = 1;

/// Maximum single message size (16 MB).
pub const MAX_MESSAGE_SIZE: u32 = 16 * 1024 * 1024;

/// A wire protocol frame (envelope).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireMessage {
    /// Unique message ID; replies echo the request's ID.
    pub id: String,
    #[serde(flatten)]
    pub kind: WireMessageKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WireMessageKind {
    /// Opening frame from the connecting side.
    Handshake {
        identity: String,
        address: String,
        protocol_version: u32,
        nonce: String,
        /// HMAC-SHA256(shared_secret, nonce + identity).
        auth_hmac: String,
    },
    /// Reply to a valid handshake.
    HandshakeAck {
        identity: String,
        address: String,
        protocol_version: u32,
        nonce: String,
        /// HMAC-SHA256(shared_secret, nonce + request nonce + identity).
        auth_hmac: String,
    },
    /// Fire-and-forget broadcast. Never answered.
    NetworkMessage(NetworkMessage),
    /// Reserved for a separate typed transport; the engine ignores it.
    Typed { transport: String, body: Payload },
    /// A singular or batch request.
    Connection(Connection),
    /// Reply to a `Connection`.
    Response(Response),
    /// Failure reply.
    Error { code: u16, message: String },
}

impl WireMessage {
    /// A frame with a fresh random ID.
    pub fn new(kind: WireMessageKind) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind,
        }
    }

    /// A frame with an explicit ID.
    pub fn with_id(id: impl Into<String>, kind: WireMessageKind) -> Self {
        Self { id: id.into(), kind }
    }

    /// A reply to `self` carrying `kind`.
    pub fn reply(&self, kind: WireMessageKind) -> Self {
        Self::with_id(self.id.clone(), kind)
    }

    /// An error reply to `self`.
    pub fn error_reply(&self, code: u16, message: impl Into<String>) -> Self {
        self.reply(WireMessageKind::Error {
            code,
            message: message.into(),
        })
    }

    /// Frame kind name, for logs.
    pub fn kind_name(&self) -> &'static str {
        match self.kind {
            WireMessageKind::Handshake { .. } => "handshake",
            WireMessageKind::HandshakeAck { .. } => "handshake_ack",
            WireMessageKind::NetworkMessage(_) => "network_message",
            WireMessageKind::Typed { .. } => "typed",
            WireMessageKind::Connection(_) => "connection",
            WireMessageKind::Response(_) => "response",
            WireMessageKind::Error { .. } => "error",
        }
    }
}

impl From<ErrorBody> for WireMessageKind {
    fn from(body: ErrorBody) -> Self {
        WireMessageKind::Error {
            code: body.code,
            message: body.message,
        }
    }
}

/// Encode a wire message to bytes (4-byte big-endian length + JSON).
pub fn encode_message(msg: &WireMessage) -> Result<Vec<u8>, WireError> {
    let json = serde_json::to_vec(msg)?;
    let len = u32::try_from(json.len()).unwrap_or(u32::MAX);
    if len > MAX_MESSAGE_SIZE {
        return Err(WireError::MessageTooLarge {
            size: len,
            max: MAX_MESSAGE_SIZE,
        });
    }
    let mut bytes = Vec::with_capacity(4 + json.len());
    bytes.extend_from_slice(&len.to_be_bytes());
    bytes.extend_from_slice(&json);
    Ok(bytes)
}

/// Decode the length prefix from a 4-byte header.
pub fn decode_length(header: &[u8; 4]) -> u32 {
    u32::from_be_bytes(*header)
}

/// Parse a JSON body into a WireMessage.
pub fn decode_message(body: &[u8]) -> Result<WireMessage, serde_json::Error> {
    serde_json::from_slice(body)
}

/// Write a framed message and flush.
pub async fn write_message<W>(writer: &mut W, msg: &WireMessage) -> Result<(), WireError>
where
    W: AsyncWrite + Unpin,
{
    let bytes = encode_message(msg)?;
    writer.write_all(&bytes).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one framed message.
pub async fn read_message<R>(reader: &mut R) -> Result<WireMessage, WireError>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; 4];
    match reader.read_exact(&mut header).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            return Err(WireError::ConnectionClosed);
        }
        Err(e) => return Err(WireError::Io(e)),
    }

    let len = decode_length(&header);
    if len > MAX_MESSAGE_SIZE {
        return Err(WireError::MessageTooLarge {
            size: len,
            max: MAX_MESSAGE_SIZE,
        });
    }

    let mut body = vec![0u8; len as usize];
    reader.read_exact(&mut body).await?;

    let msg = decode_message(&body)?;
    Ok(msg)
}

/// [`read_message`] bounded by `deadline`.
pub async fn read_message_timeout<R>(
    reader: &mut R,
    deadline: Duration,
) -> Result<WireMessage, WireError>
where
    R: AsyncRead + Unpin,
{
    tokio::time::timeout(deadline, read_message(reader))
        .await
        .map_err(|_| WireError::Timeout("read"))?
}

/// [`write_message`] bounded by `deadline`.
pub async fn write_message_timeout<W>(
    writer: &mut W,
    msg: &WireMessage,
    deadline: Duration,
) -> Result<(), WireError>
where
    W: AsyncWrite + Unpin,
{
    tokio::time::timeout(deadline, write_message(writer, msg))
        .await
        .map_err(|_| WireError::Timeout("write"))?
}
