//! Shared error types for peerweave.

use thiserror::Error;

/// Top-level error type for peerweave.
#[derive(Error, Debug)]
pub enum PeerweaveError {
    /// A peer address is empty or not a valid `host:port`.
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// A variable could not be constructed (empty type, bad identifier).
    #[error("Invalid variable: {0}")]
    InvalidVariable(String),

    /// A network name is empty or does not match.
    #[error("Invalid network: {0}")]
    InvalidNetwork(String),

    /// A shard repartition target is out of range.
    #[error("Invalid exponent: {0}")]
    InvalidExponent(u32),

    /// `AddVariable` was issued without a variable.
    #[error("Nil variable")]
    NilVariable,

    /// An operation name that is not part of the command set.
    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    /// A connection stack with no events was constructed.
    #[error("Connection stack is empty")]
    EmptyStack,

    /// An entry with the same key is already present.
    #[error("{kind} already exists: {key}")]
    AlreadyExists {
        /// What kind of entry (peer, shard, variable).
        kind: &'static str,
        /// The conflicting key.
        key: String,
    },

    /// No entry matched the lookup.
    #[error("{kind} not found: {key}")]
    NotFound {
        /// What kind of entry (peer, shard, variable, directory).
        kind: &'static str,
        /// The key that was looked up.
        key: String,
    },

    /// A batch produced no responses.
    #[error("Empty response")]
    EmptyResponse,

    /// A wire payload or persisted snapshot could not be decoded.
    #[error("Decode error: {0}")]
    Decode(String),

    /// A remote peer could not be reached or the stream broke.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The storage backend failed to read or write.
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// An I/O error occurred.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// An internal error occurred.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PeerweaveError {
    /// Shorthand for a `NotFound` error.
    pub fn not_found(kind: &'static str, key: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            key: key.into(),
        }
    }

    /// Shorthand for an `AlreadyExists` error.
    pub fn already_exists(kind: &'static str, key: impl Into<String>) -> Self {
        Self::AlreadyExists {
            kind,
            key: key.into(),
        }
    }

    /// Numeric code used when the error is sent back over the wire.
    pub fn code(&self) -> u16 {
        match self {
            Self::InvalidAddress(_)
            | Self::InvalidVariable(_)
            | Self::InvalidNetwork(_)
            | Self::InvalidExponent(_)
            | Self::NilVariable
            | Self::InvalidCommand(_)
            | Self::EmptyStack
            | Self::EmptyResponse => 400,
            Self::NotFound { .. } => 404,
            Self::AlreadyExists { .. } => 409,
            Self::Decode(_) => 422,
            Self::Transport(_) => 502,
            Self::Persistence(_) | Self::Io(_) | Self::Internal(_) => 500,
        }
    }

    /// True for errors that are the caller's fault rather than ours.
    pub fn is_validation(&self) -> bool {
        self.code() == 400
    }
}

impl From<serde_json::Error> for PeerweaveError {
    fn from(e: serde_json::Error) -> Self {
        Self::Decode(e.to_string())
    }
}

/// Alias for Result with PeerweaveError.
pub type PeerweaveResult<T> = Result<T, PeerweaveError>;
