//! Peer identity and liveness metadata.

use crate::error::{PeerweaveError, PeerweaveResult};
use crate::variable::Environment;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

/// Reputation granted to a peer when it is first seen alive.
pub const PEER_AVAILABLE_REPUTATION: u64 = 10;

/// One network participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Peer {
    /// Peer identifier, `host:port`.
    pub address: String,
    /// Monotonic trust counter.
    pub reputation: u64,
    /// Last time the peer completed a protocol exchange.
    pub last_ping_time: DateTime<Utc>,
    /// Whether this peer bootstrapped a network.
    pub is_bootstrap: bool,
    /// Variables owned by this peer.
    #[serde(default)]
    pub environment: Environment,
}

impl Peer {
    /// Create a peer with a validated address and an empty environment.
    pub fn new(address: impl Into<String>, is_bootstrap: bool) -> PeerweaveResult<Self> {
        let address = address.into();
        validate_address(&address)?;
        Ok(Self {
            address,
            reputation: PEER_AVAILABLE_REPUTATION,
            last_ping_time: Utc::now(),
            is_bootstrap,
            environment: Environment::new(),
        })
    }

    /// Record a successful exchange: refresh liveness and bump reputation.
    pub fn touch(&mut self) {
        self.last_ping_time = Utc::now();
        self.reputation = self.reputation.saturating_add(1);
    }

    /// Copy of this peer without its variables.
    ///
    /// Directory entries carry identity and liveness only; the environment
    /// stays with the owning node.
    pub fn detached(&self) -> Self {
        Self {
            address: self.address.clone(),
            reputation: self.reputation,
            last_ping_time: self.last_ping_time,
            is_bootstrap: self.is_bootstrap,
            environment: Environment::new(),
        }
    }

    /// Seconds since the last successful exchange, relative to `now`.
    pub fn idle_secs(&self, now: DateTime<Utc>) -> i64 {
        (now - self.last_ping_time).num_seconds()
    }
}

/// Check that `address` is a non-empty `host:port` with a usable port.
///
/// IPv6 hosts must be bracketed (`[::1]:9000`).
pub fn validate_address(address: &str) -> PeerweaveResult<()> {
    let invalid = |why: &str| PeerweaveError::InvalidAddress(format!("{address:?}: {why}"));

    if address.is_empty() {
        return Err(invalid("empty"));
    }
    let (host, port) = address
        .rsplit_once(':')
        .ok_or_else(|| invalid("missing port"))?;

    match port.parse::<u16>() {
        Ok(0) | Err(_) => return Err(invalid("bad port")),
        Ok(_) => {}
    }

    if let Some(inner) = host.strip_prefix('[').and_then(|h| h.strip_suffix(']')) {
        return match inner.parse::<IpAddr>() {
            Ok(IpAddr::V6(_)) => Ok(()),
            _ => Err(invalid("bad IPv6 host")),
        };
    }
    if host.is_empty() {
        return Err(invalid("empty host"));
    }
    if host.parse::<IpAddr>().is_ok() {
        return Ok(());
    }
    let hostname_ok = host
        .split('.')
        .all(|label| {
            !label.is_empty()
                && !label.starts_with('-')
                && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
        });
    if hostname_ok {
        Ok(())
    } else {
        Err(invalid("bad hostname"))
    }
}
