//! Priority-tagged network broadcast notices.

use crate::error::PeerweaveResult;
use serde::{Deserialize, Serialize};

/// How loudly a receiving peer reports a [`NetworkMessage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Priority {
    Normal,
    Critical,
    Warning,
    Info,
}

impl Priority {
    /// Map a wire priority code. Unknown codes fall back to `Normal`.
    pub fn from_code(code: u8) -> Self {
        match code {
            1 => Self::Critical,
            2 => Self::Warning,
            3 => Self::Info,
            _ => Self::Normal,
        }
    }

    /// Wire code for this priority.
    pub fn code(self) -> u8 {
        match self {
            Self::Normal => 0,
            Self::Critical => 1,
            Self::Warning => 2,
            Self::Info => 3,
        }
    }

    /// Log channel name.
    pub fn channel(self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Critical => "critical",
            Self::Warning => "warning",
            Self::Info => "info",
        }
    }
}

/// A broadcast notice sent to the peers of a network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkMessage {
    /// Free-form category (e.g. `"update"`, `"alert"`).
    pub message_type: String,
    /// Network the message concerns.
    pub network: String,
    /// Message text.
    pub message: String,
    /// Raw priority code; see [`Priority::from_code`].
    pub priority: u8,
}

impl NetworkMessage {
    pub fn new(
        message_type: impl Into<String>,
        network: impl Into<String>,
        message: impl Into<String>,
        priority: Priority,
    ) -> Self {
        Self {
            message_type: message_type.into(),
            network: network.into(),
            message: message.into(),
            priority: priority.code(),
        }
    }

    pub fn priority(&self) -> Priority {
        Priority::from_code(self.priority)
    }

    /// Variable type under which a receiving peer stores this message.
    pub fn variable_type(&self) -> String {
        format!("{}NetworkMessage", self.network)
    }

    pub fn to_bytes(&self) -> PeerweaveResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> PeerweaveResult<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_mapping() {
        assert_eq!(Priority::from_code(0), Priority::Normal);
        assert_eq!(Priority::from_code(1), Priority::Critical);
        assert_eq!(Priority::from_code(2), Priority::Warning);
        assert_eq!(Priority::from_code(3), Priority::Info);
        assert_eq!(Priority::from_code(42), Priority::Normal);
        assert_eq!(Priority::Critical.channel(), "critical");
    }

    #[test]
    fn test_variable_type() {
        let msg = NetworkMessage::new("update", "testnet", "hi", Priority::Info);
        assert_eq!(msg.variable_type(), "testnetNetworkMessage");
        assert_eq!(msg.priority, 3);
    }

    #[test]
    fn test_plain_text_is_not_a_message() {
        assert!(NetworkMessage::from_bytes(b"hello").is_err());
    }
}
