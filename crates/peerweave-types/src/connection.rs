//! Wire payloads: a [`Connection`] carries either one opaque payload or a
//! stack of [`Event`]s, and is answered with a [`Response`].

use crate::error::{PeerweaveError, PeerweaveResult};
use crate::variable::{Payload, Variable};
use serde::{Deserialize, Serialize};

/// The closed set of operations a remote peer may run against an environment.
///
/// Unknown names fail when the connection is decoded, not when it is
/// dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    /// Build a variable from the modifiers and return it without storing.
    NewVariable,
    /// Return the latest variable whose payload equals `modifiers.value`.
    QueryValue,
    /// Return the latest variable of type `modifiers.variable_type`.
    QueryType,
    /// Store `modifiers.variable`.
    AddVariable,
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl std::str::FromStr for Command {
    type Err = PeerweaveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NewVariable" => Ok(Self::NewVariable),
            "QueryValue" => Ok(Self::QueryValue),
            "QueryType" => Ok(Self::QueryType),
            "AddVariable" => Ok(Self::AddVariable),
            other => Err(PeerweaveError::InvalidCommand(other.to_string())),
        }
    }
}

/// Operands for a [`Command`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModifierSet {
    /// Operand type tag.
    #[serde(rename = "type", default)]
    pub variable_type: String,
    /// Operand value.
    #[serde(default)]
    pub value: Payload,
    /// Caller-supplied variable, used by `AddVariable`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variable: Option<Variable>,
}

/// One unit of work in a connection stack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub command: Command,
    #[serde(default)]
    pub modifiers: ModifierSet,
}

impl Event {
    pub fn new_variable(variable_type: impl Into<String>, value: impl Into<Payload>) -> Self {
        Self {
            command: Command::NewVariable,
            modifiers: ModifierSet {
                variable_type: variable_type.into(),
                value: value.into(),
                variable: None,
            },
        }
    }

    pub fn query_value(value: impl Into<Payload>) -> Self {
        Self {
            command: Command::QueryValue,
            modifiers: ModifierSet {
                value: value.into(),
                ..Default::default()
            },
        }
    }

    pub fn query_type(variable_type: impl Into<String>) -> Self {
        Self {
            command: Command::QueryType,
            modifiers: ModifierSet {
                variable_type: variable_type.into(),
                ..Default::default()
            },
        }
    }

    pub fn add_variable(variable: Variable) -> Self {
        Self {
            command: Command::AddVariable,
            modifiers: ModifierSet {
                variable: Some(variable),
                ..Default::default()
            },
        }
    }
}

/// Exactly one of a single payload or a non-empty event stack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionBody {
    /// Singular mode.
    Data(Payload),
    /// Batch mode.
    Stack(Vec<Event>),
}

/// One framed exchange between two peers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connection {
    /// Address of the peer that opened the exchange.
    pub initialization_peer: String,
    pub body: ConnectionBody,
}

impl Connection {
    /// A singular connection carrying `data`.
    pub fn singular(initialization_peer: impl Into<String>, data: impl Into<Payload>) -> Self {
        Self {
            initialization_peer: initialization_peer.into(),
            body: ConnectionBody::Data(data.into()),
        }
    }

    /// A batch connection. Fails if `events` is empty.
    pub fn stack(
        initialization_peer: impl Into<String>,
        events: Vec<Event>,
    ) -> PeerweaveResult<Self> {
        if events.is_empty() {
            return Err(PeerweaveError::EmptyStack);
        }
        Ok(Self {
            initialization_peer: initialization_peer.into(),
            body: ConnectionBody::Stack(events),
        })
    }

    pub fn to_bytes(&self) -> PeerweaveResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> PeerweaveResult<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Error carried in place of a value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: u16,
    pub message: String,
}

impl From<&PeerweaveError> for ErrorBody {
    fn from(e: &PeerweaveError) -> Self {
        Self {
            code: e.code(),
            message: e.to_string(),
        }
    }
}

/// Result of one event, or of a singular connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseEntry {
    Value(Payload),
    Error(ErrorBody),
}

impl ResponseEntry {
    /// The value bytes, or the carried error converted back.
    pub fn into_result(self) -> Result<Vec<u8>, ErrorBody> {
        match self {
            Self::Value(p) => Ok(p.into_bytes()),
            Self::Error(e) => Err(e),
        }
    }
}

/// Reply to a connection: one entry for singular mode, one per event for
/// batch mode, in event order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub val: Vec<ResponseEntry>,
}

impl Response {
    /// A single-value response.
    pub fn single(bytes: Vec<u8>) -> Self {
        Self {
            val: vec![ResponseEntry::Value(Payload(bytes))],
        }
    }

    /// Value bytes at `index`, if that entry succeeded.
    pub fn value(&self, index: usize) -> Option<&[u8]> {
        match self.val.get(index)? {
            ResponseEntry::Value(p) => Some(p.as_bytes()),
            ResponseEntry::Error(_) => None,
        }
    }

    pub fn len(&self) -> usize {
        self.val.len()
    }

    pub fn is_empty(&self) -> bool {
        self.val.is_empty()
    }
}
