//! HMAC-SHA256 handshake over a pre-shared secret.
//!
//! The connecting side signs `nonce + identity`. The accepting side checks
//! that in constant time, then answers with its own nonce signed together
//! with the request nonce so an old ack can't be replayed.

use crate::error::WireError;
use crate::message::{
    read_message_timeout, write_message_timeout, WireMessage, WireMessageKind, PROTOCOL_VERSION,
};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, warn};

type HmacSha256 = Hmac<Sha256>;

/// Generate HMAC-SHA256 signature for message authentication.
pub fn hmac_sign(secret: &str, data: &[u8]) -> Result<String, WireError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| WireError::HandshakeFailed(e.to_string()))?;
    mac.update(data);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Verify HMAC-SHA256 signature using constant-time comparison.
pub fn hmac_verify(secret: &str, data: &[u8], signature: &str) -> Result<bool, WireError> {
    let expected = hmac_sign(secret, data)?;
    Ok(subtle::ConstantTimeEq::ct_eq(expected.as_bytes(), signature.as_bytes()).into())
}

/// Who we are on the wire.
#[derive(Clone)]
pub struct Credentials {
    /// Local identity key.
    pub identity: String,
    /// Local peer address (`host:port`).
    pub address: String,
    pub shared_secret: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("identity", &self.identity)
            .field("address", &self.address)
            .field("shared_secret", &"<redacted>")
            .finish()
    }
}

/// The authenticated remote side of a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemotePeer {
    pub identity: String,
    pub address: String,
}

/// Run the connecting side of the handshake.
pub async fn initiate<R, W>(
    reader: &mut R,
    writer: &mut W,
    credentials: &Credentials,
    deadline: Duration,
) -> Result<RemotePeer, WireError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let nonce = uuid::Uuid::new_v4().to_string();
    let auth_data = format!("{}{}", nonce, credentials.identity);
    let auth_hmac = hmac_sign(&credentials.shared_secret, auth_data.as_bytes())?;

    let handshake = WireMessage::new(WireMessageKind::Handshake {
        identity: credentials.identity.clone(),
        address: credentials.address.clone(),
        protocol_version: PROTOCOL_VERSION,
        nonce: nonce.clone(),
        auth_hmac,
    });
    write_message_timeout(writer, &handshake, deadline).await?;

    let ack = read_message_timeout(reader, deadline).await?;
    match ack.kind {
        WireMessageKind::HandshakeAck {
            identity,
            address,
            protocol_version,
            nonce: ack_nonce,
            auth_hmac: ack_hmac,
        } => {
            if protocol_version != PROTOCOL_VERSION {
                return Err(WireError::VersionMismatch {
                    local: PROTOCOL_VERSION,
                    remote: protocol_version,
                });
            }
            let expected_data = format!("{}{}{}", ack_nonce, nonce, identity);
            if !hmac_verify(&credentials.shared_secret, expected_data.as_bytes(), &ack_hmac)? {
                return Err(WireError::HandshakeFailed(
                    "HMAC verification failed on HandshakeAck".into(),
                ));
            }
            debug!(remote = %identity, address = %address, "Handshake complete");
            Ok(RemotePeer { identity, address })
        }
        WireMessageKind::Error { code, message } => Err(WireError::HandshakeFailed(format!(
            "Remote error {code}: {message}"
        ))),
        _ => Err(WireError::HandshakeFailed(
            "Unexpected response to handshake".to_string(),
        )),
    }
}

/// Run the accepting side of the handshake.
///
/// Any rejection is reported to the remote as an error frame before the
/// error is returned.
pub async fn accept<R, W>(
    reader: &mut R,
    writer: &mut W,
    credentials: &Credentials,
    deadline: Duration,
) -> Result<RemotePeer, WireError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let msg = read_message_timeout(reader, deadline).await?;
    let WireMessageKind::Handshake {
        identity,
        address,
        protocol_version,
        nonce,
        auth_hmac,
    } = &msg.kind
    else {
        warn!(kind = msg.kind_name(), "Rejected unauthenticated frame, handshake required");
        let reply = msg.error_reply(401, "Authentication required: complete HMAC handshake first");
        write_message_timeout(writer, &reply, deadline).await?;
        return Err(WireError::HandshakeFailed(
            "Rejected unauthenticated request, handshake required".into(),
        ));
    };

    if *protocol_version != PROTOCOL_VERSION {
        let reply = msg.error_reply(
            400,
            format!("Protocol version mismatch: expected {PROTOCOL_VERSION}, got {protocol_version}"),
        );
        write_message_timeout(writer, &reply, deadline).await?;
        return Err(WireError::VersionMismatch {
            local: PROTOCOL_VERSION,
            remote: *protocol_version,
        });
    }

    let expected_data = format!("{}{}", nonce, identity);
    if !hmac_verify(&credentials.shared_secret, expected_data.as_bytes(), auth_hmac)? {
        let reply = msg.error_reply(403, "HMAC authentication failed");
        write_message_timeout(writer, &reply, deadline).await?;
        return Err(WireError::HandshakeFailed(
            "HMAC verification failed on incoming Handshake".into(),
        ));
    }

    let ack_nonce = uuid::Uuid::new_v4().to_string();
    let ack_data = format!("{}{}{}", ack_nonce, nonce, credentials.identity);
    let ack_hmac = hmac_sign(&credentials.shared_secret, ack_data.as_bytes())?;
    let ack = msg.reply(WireMessageKind::HandshakeAck {
        identity: credentials.identity.clone(),
        address: credentials.address.clone(),
        protocol_version: PROTOCOL_VERSION,
        nonce: ack_nonce,
        auth_hmac: ack_hmac,
    });
    write_message_timeout(writer, &ack, deadline).await?;

    Ok(RemotePeer {
        identity: identity.clone(),
        address: address.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{read_message, write_message};

    const DEADLINE: Duration = Duration::from_secs(5);

    fn credentials(identity: &str, secret: &str) -> Credentials {
        Credentials {
            identity: identity.to_string(),
            address: format!("{identity}.local:9000"),
            shared_secret: secret.to_string(),
        }
    }

    #[test]
    fn test_hmac_sign_verify() {
        let sig = hmac_sign("secret", b"data").unwrap();
        assert_eq!(sig.len(), 64);
        assert!(hmac_verify("secret", b"data", &sig).unwrap());
        assert!(!hmac_verify("other", b"data", &sig).unwrap());
        assert!(!hmac_verify("secret", b"datb", &sig).unwrap());
    }

    #[tokio::test]
    async fn test_handshake_success() {
        let (client, server) = tokio::io::duplex(4096);
        let (mut cr, mut cw) = tokio::io::split(client);
        let (mut sr, mut sw) = tokio::io::split(server);

        let server_task = tokio::spawn(async move {
            accept(&mut sr, &mut sw, &credentials("server", "s3cret"), DEADLINE).await
        });
        let remote = initiate(&mut cr, &mut cw, &credentials("client", "s3cret"), DEADLINE)
            .await
            .unwrap();
        assert_eq!(remote.identity, "server");

        let seen = server_task.await.unwrap().unwrap();
        assert_eq!(seen.identity, "client");
        assert_eq!(seen.address, "client.local:9000");
    }

    #[tokio::test]
    async fn test_wrong_secret_rejected() {
        let (client, server) = tokio::io::duplex(4096);
        let (mut cr, mut cw) = tokio::io::split(client);
        let (mut sr, mut sw) = tokio::io::split(server);

        let server_task = tokio::spawn(async move {
            accept(&mut sr, &mut sw, &credentials("server", "right"), DEADLINE).await
        });
        let err = initiate(&mut cr, &mut cw, &credentials("client", "wrong"), DEADLINE)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("403"), "got {err}");
        assert!(server_task.await.unwrap().is_err());
    }

    #[tokio::test]
    async fn test_non_handshake_first_frame_rejected() {
        let (client, server) = tokio::io::duplex(4096);
        let (mut cr, mut cw) = tokio::io::split(client);
        let (mut sr, mut sw) = tokio::io::split(server);

        let server_task = tokio::spawn(async move {
            accept(&mut sr, &mut sw, &credentials("server", "s3cret"), DEADLINE).await
        });
        let stray = WireMessage::new(WireMessageKind::Typed {
            transport: "grpc".into(),
            body: Default::default(),
        });
        write_message(&mut cw, &stray).await.unwrap();
        let reply = read_message(&mut cr).await.unwrap();
        assert_eq!(reply.id, stray.id);
        match reply.kind {
            WireMessageKind::Error { code, .. } => assert_eq!(code, 401),
            other => panic!("Expected Error(401), got {other:?}"),
        }
        assert!(server_task.await.unwrap().is_err());
    }
}
