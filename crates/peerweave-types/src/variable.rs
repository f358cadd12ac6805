//! Variables and the per-peer environment that stores them.
//!
//! A [`Variable`] is a typed, content-addressed blob. Its identifier is the
//! SHA-256 of the type tag and payload, so identical pairs always hash to the
//! same identifier. The [`Environment`] keeps variables in insertion order;
//! "latest" queries scan from the back.

use crate::error::{PeerweaveError, PeerweaveResult};
use base64::Engine;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};

/// Opaque bytes carried by variables and wire payloads.
///
/// Serialized as standard base64 so JSON frames stay compact.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Payload(pub Vec<u8>);

impl Payload {
    /// Borrow the raw bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Consume and return the raw bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    /// Number of bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True if the payload has no bytes.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl From<&[u8]> for Payload {
    fn from(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }
}

impl From<&str> for Payload {
    fn from(s: &str) -> Self {
        Self(s.as_bytes().to_vec())
    }
}

impl Serialize for Payload {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&base64::engine::general_purpose::STANDARD.encode(&self.0))
    }
}

impl<'de> Deserialize<'de> for Payload {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        base64::engine::general_purpose::STANDARD
            .decode(encoded.as_bytes())
            .map(Payload)
            .map_err(serde::de::Error::custom)
    }
}

/// One stored value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variable {
    /// Type tag (e.g. `"Connection"`, `"testnetNetworkMessage"`).
    #[serde(rename = "type")]
    pub variable_type: String,
    /// Hex SHA-256 of the type tag and payload.
    pub identifier: String,
    /// The stored bytes.
    pub payload: Payload,
}

impl Variable {
    /// Create a variable, computing its identifier.
    pub fn new(
        variable_type: impl Into<String>,
        payload: impl Into<Payload>,
    ) -> PeerweaveResult<Self> {
        let variable_type = variable_type.into();
        if variable_type.is_empty() {
            return Err(PeerweaveError::InvalidVariable(
                "variable type must not be empty".into(),
            ));
        }
        let payload = payload.into();
        let identifier = Self::compute_identifier(&variable_type, payload.as_bytes());
        Ok(Self {
            variable_type,
            identifier,
            payload,
        })
    }

    /// Content identifier for a `(type, payload)` pair.
    ///
    /// The type tag is length-prefixed so `("ab", "c")` and `("a", "bc")`
    /// never collide structurally.
    pub fn compute_identifier(variable_type: &str, payload: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update((variable_type.len() as u64).to_be_bytes());
        hasher.update(variable_type.as_bytes());
        hasher.update(payload);
        hex::encode(hasher.finalize())
    }

    /// True if the stored identifier matches the content.
    pub fn has_valid_identifier(&self) -> bool {
        self.identifier == Self::compute_identifier(&self.variable_type, self.payload.as_bytes())
    }

    /// Deterministic encoding used in wire responses.
    pub fn to_bytes(&self) -> PeerweaveResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decode a variable produced by [`Variable::to_bytes`].
    pub fn from_bytes(bytes: &[u8]) -> PeerweaveResult<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// A peer's ordered variable store.
///
/// Owned by exactly one [`Peer`](crate::peer::Peer) and persisted with it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Environment {
    /// Variables in insertion order.
    #[serde(default)]
    pub variables: Vec<Variable>,
}

impl Environment {
    /// Create an empty environment.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a variable. No deduplication is performed.
    pub fn add_variable(&mut self, variable: Variable) {
        self.variables.push(variable);
    }

    /// Latest variable with the given type.
    pub fn query_type(&self, variable_type: &str) -> PeerweaveResult<&Variable> {
        self.variables
            .iter()
            .rev()
            .find(|v| v.variable_type == variable_type)
            .ok_or_else(|| PeerweaveError::not_found("variable", variable_type))
    }

    /// Latest variable whose payload equals `value`.
    pub fn query_value(&self, value: &[u8]) -> PeerweaveResult<&Variable> {
        self.variables
            .iter()
            .rev()
            .find(|v| v.payload.as_bytes() == value)
            .ok_or_else(|| {
                PeerweaveError::not_found("variable", String::from_utf8_lossy(value).into_owned())
            })
    }

    /// Variable with the given content identifier.
    pub fn query_identifier(&self, identifier: &str) -> PeerweaveResult<&Variable> {
        self.variables
            .iter()
            .find(|v| v.identifier == identifier)
            .ok_or_else(|| PeerweaveError::not_found("variable", identifier))
    }

    /// Remove every variable of a type, returning how many were dropped.
    pub fn remove_type(&mut self, variable_type: &str) -> usize {
        let before = self.variables.len();
        self.variables.retain(|v| v.variable_type != variable_type);
        before - self.variables.len()
    }

    /// Drop all variables of `variable.variable_type` and append `variable`.
    pub fn replace_type(&mut self, variable: Variable) {
        self.remove_type(&variable.variable_type);
        self.variables.push(variable);
    }

    /// Number of stored variables.
    pub fn len(&self) -> usize {
        self.variables.len()
    }

    /// True if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    /// Iterate in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Variable> {
        self.variables.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifier_is_content_derived() {
        let a = Variable::new("block", "payload-1").unwrap();
        let b = Variable::new("block", "payload-1").unwrap();
        assert_eq!(a.identifier, b.identifier);
        assert_eq!(a.identifier.len(), 64);

        let c = Variable::new("block", "payload-2").unwrap();
        assert_ne!(a.identifier, c.identifier);
        let d = Variable::new("blocks", "payload-1").unwrap();
        assert_ne!(a.identifier, d.identifier);
    }

    #[test]
    fn test_type_boundary_does_not_collide() {
        let a = Variable::compute_identifier("ab", b"c");
        let b = Variable::compute_identifier("a", b"bc");
        assert_ne!(a, b);
    }

    #[test]
    fn test_empty_type_rejected() {
        let err = Variable::new("", "x").unwrap_err();
        assert!(matches!(err, PeerweaveError::InvalidVariable(_)));
    }

    #[test]
    fn test_tampered_identifier_detected() {
        let mut v = Variable::new("X", "data").unwrap();
        assert!(v.has_valid_identifier());
        v.payload = Payload::from("other");
        assert!(!v.has_valid_identifier());
    }

    #[test]
    fn test_payload_serializes_as_base64() {
        let v = Variable::new("Connection", "hello").unwrap();
        let json = String::from_utf8(v.to_bytes().unwrap()).unwrap();
        assert!(json.contains("\"aGVsbG8=\""), "got {json}");
        assert_eq!(Variable::from_bytes(json.as_bytes()).unwrap(), v);
    }

    #[test]
    fn test_query_type_returns_latest() {
        let mut env = Environment::new();
        env.add_variable(Variable::new("X", "first").unwrap());
        env.add_variable(Variable::new("Y", "other").unwrap());
        env.add_variable(Variable::new("X", "second").unwrap());

        let found = env.query_type("X").unwrap();
        assert_eq!(found.payload.as_bytes(), b"second");
        assert!(matches!(
            env.query_type("Z"),
            Err(PeerweaveError::NotFound { kind: "variable", .. })
        ));
    }

    #[test]
    fn test_query_value_returns_latest() {
        let mut env = Environment::new();
        env.add_variable(Variable::new("A", "same").unwrap());
        env.add_variable(Variable::new("B", "same").unwrap());

        let found = env.query_value(b"same").unwrap();
        assert_eq!(found.variable_type, "B");
        assert!(env.query_value(b"missing").is_err());
    }

    #[test]
    fn test_no_dedup_on_insert() {
        let mut env = Environment::new();
        let v = Variable::new("X", "dup").unwrap();
        env.add_variable(v.clone());
        env.add_variable(v.clone());
        assert_eq!(env.len(), 2);
        assert_eq!(env.query_identifier(&v.identifier).unwrap(), &v);
    }

    #[test]
    fn test_replace_type() {
        let mut env = Environment::new();
        env.add_variable(Variable::new("dir", "v1").unwrap());
        env.add_variable(Variable::new("dir", "v2").unwrap());
        env.add_variable(Variable::new("keep", "k").unwrap());

        env.replace_type(Variable::new("dir", "v3").unwrap());
        assert_eq!(env.len(), 2);
        assert_eq!(env.query_type("dir").unwrap().payload.as_bytes(), b"v3");
        assert!(env.query_type("keep").is_ok());
    }
}
