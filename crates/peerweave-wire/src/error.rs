//! Errors from the wire protocol layer.

use peerweave_types::error::PeerweaveError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WireError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Handshake failed: {0}")]
    HandshakeFailed(String),
    #[error("Connection closed")]
    ConnectionClosed,
    #[error("Message too large: {size} bytes (max {max})")]
    MessageTooLarge { size: u32, max: u32 },
    #[error("Protocol version mismatch: local={local}, remote={remote}")]
    VersionMismatch { local: u32, remote: u32 },
    #[error("Timed out during {0}")]
    Timeout(&'static str),
    #[error("Remote error {code}: {message}")]
    Remote { code: u16, message: String },
    #[error("Unexpected frame: {0}")]
    UnexpectedFrame(String),
    #[error(transparent)]
    Peerweave(#[from] PeerweaveError),
}

impl From<WireError> for PeerweaveError {
    fn from(e: WireError) -> Self {
        match e {
            WireError::Peerweave(inner) => inner,
            WireError::Json(e) => PeerweaveError::Decode(e.to_string()),
            other => PeerweaveError::Transport(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_into_peerweave_error() {
        let err: PeerweaveError = WireError::Peerweave(PeerweaveError::NilVariable).into();
        assert!(matches!(err, PeerweaveError::NilVariable));

        let err: PeerweaveError = WireError::ConnectionClosed.into();
        assert_eq!(err.code(), 502);

        let json = serde_json::from_slice::<u8>(b"nope").unwrap_err();
        let err: PeerweaveError = WireError::Json(json).into();
        assert!(matches!(err, PeerweaveError::Decode(_)));
    }
}
