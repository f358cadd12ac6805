//! The per-network peer registry.

use crate::shard::Shard;
use chrono::{DateTime, Utc};
use peerweave_types::error::{PeerweaveError, PeerweaveResult};
use peerweave_types::peer::{validate_address, Peer};
use peerweave_types::variable::{Environment, Variable};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

/// Variable type prefix under which directories are persisted.
pub const DIRECTORY_VARIABLE_PREFIX: &str = "PeerDirectory:";

/// Membership registry of one named network.
///
/// `peers[0]` is the creator. Entries are stored without environments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerDirectory {
    pub network_name: String,
    /// Short stable id derived from the network name.
    pub network_id: String,
    /// Seconds without contact after which a peer counts as stale.
    pub acceptable_timeout: u32,
    pub peers: Vec<Peer>,
    #[serde(default)]
    pub shards: Vec<Shard>,
}

impl PeerDirectory {
    /// Bootstrap a directory for `network_name` with `bootstrap` as its first peer.
    pub fn create(
        network_name: impl Into<String>,
        bootstrap: &Peer,
        acceptable_timeout: u32,
    ) -> PeerweaveResult<Self> {
        let network_name = network_name.into();
        if network_name.is_empty() {
            return Err(PeerweaveError::InvalidNetwork("empty network name".into()));
        }
        validate_address(&bootstrap.address)?;

        let mut entry = bootstrap.detached();
        entry.is_bootstrap = true;
        Ok(Self {
            network_id: network_id_for(&network_name),
            network_name,
            acceptable_timeout,
            peers: vec![entry],
            shards: Vec::new(),
        })
    }

    /// Creator of the network, if it has not been removed.
    pub fn bootstrap(&self) -> Option<&Peer> {
        self.peers.first()
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Append `peer` unless its address is already listed.
    pub fn add_peer(&mut self, peer: &Peer) -> PeerweaveResult<()> {
        validate_address(&peer.address)?;
        if self.peers.iter().any(|p| p.address == peer.address) {
            return Err(PeerweaveError::already_exists("peer", &peer.address));
        }
        self.peers.push(peer.detached());
        debug!(network = %self.network_name, address = %peer.address, "Peer added");
        Ok(())
    }

    /// Remove and return the entry for `address`. The last remaining peer
    /// cannot be removed.
    pub fn remove_peer(&mut self, address: &str) -> PeerweaveResult<Peer> {
        let index = self.query_by_address(address)?;
        if self.peers.len() == 1 {
            return Err(PeerweaveError::InvalidNetwork(format!(
                "cannot remove the last peer of {}",
                self.network_name
            )));
        }
        debug!(network = %self.network_name, address, "Peer removed");
        Ok(self.peers.remove(index))
    }

    /// Index of the entry for `address`.
    pub fn query_by_address(&self, address: &str) -> PeerweaveResult<usize> {
        self.peers
            .iter()
            .position(|p| p.address == address)
            .ok_or_else(|| PeerweaveError::not_found("peer", address))
    }

    pub fn get(&self, address: &str) -> Option<&Peer> {
        self.peers.iter().find(|p| p.address == address)
    }

    /// Record a successful exchange with `address`.
    pub fn touch_peer(&mut self, address: &str) -> PeerweaveResult<()> {
        let index = self.query_by_address(address)?;
        self.peers[index].touch();
        Ok(())
    }

    /// Peers idle longer than `acceptable_timeout` as of `now`.
    pub fn stale_peers(&self, now: DateTime<Utc>) -> Vec<&Peer> {
        let limit = i64::from(self.acceptable_timeout);
        self.peers.iter().filter(|p| p.idle_secs(now) > limit).collect()
    }

    /// Drop stale peers, keeping the bootstrap entry. Returns what was dropped.
    pub fn prune_stale(&mut self, now: DateTime<Utc>) -> Vec<Peer> {
        let limit = i64::from(self.acceptable_timeout);
        let mut kept = Vec::with_capacity(self.peers.len());
        let mut pruned = Vec::new();
        for (i, peer) in self.peers.drain(..).enumerate() {
            if i > 0 && peer.idle_secs(now) > limit {
                pruned.push(peer);
            } else {
                kept.push(peer);
            }
        }
        self.peers = kept;
        if !pruned.is_empty() {
            debug!(network = %self.network_name, count = pruned.len(), "Pruned stale peers");
        }
        pruned
    }

    /// Register a shard of this network.
    pub fn add_shard(&mut self, shard: Shard) -> PeerweaveResult<()> {
        if shard.network_name != self.network_name {
            return Err(PeerweaveError::InvalidNetwork(format!(
                "shard belongs to {:?}, not {:?}",
                shard.network_name, self.network_name
            )));
        }
        if self.shards.iter().any(|s| s.address == shard.address) {
            return Err(PeerweaveError::already_exists("shard", &shard.address));
        }
        self.shards.push(shard);
        Ok(())
    }

    pub fn remove_shard(&mut self, address: &str) -> PeerweaveResult<Shard> {
        let index = self.query_shard(address)?;
        Ok(self.shards.remove(index))
    }

    /// Index of the shard with `address`.
    pub fn query_shard(&self, address: &str) -> PeerweaveResult<usize> {
        self.shards
            .iter()
            .position(|s| s.address == address)
            .ok_or_else(|| PeerweaveError::not_found("shard", address))
    }

    pub fn shard(&self, address: &str) -> PeerweaveResult<&Shard> {
        let index = self.query_shard(address)?;
        Ok(&self.shards[index])
    }

    /// Repartition the shard at `address`, returning its pruned members.
    pub fn repartition_shard(&mut self, address: &str, exponent: u32) -> PeerweaveResult<Vec<Peer>> {
        let index = self.query_shard(address)?;
        self.shards[index].repartition(exponent)
    }

    pub fn to_bytes(&self) -> PeerweaveResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decode a directory snapshot. Rejects snapshots with no network name
    /// or no peers.
    pub fn from_bytes(bytes: &[u8]) -> PeerweaveResult<Self> {
        let directory: Self = serde_json::from_slice(bytes)?;
        if directory.network_name.is_empty() {
            return Err(PeerweaveError::Decode("directory without network name".into()));
        }
        if directory.peers.is_empty() {
            return Err(PeerweaveError::Decode(format!(
                "directory {} has no peers",
                directory.network_name
            )));
        }
        Ok(directory)
    }

    /// Variable type a directory for `network_name` is stored under.
    pub fn variable_type(network_name: &str) -> String {
        format!("{DIRECTORY_VARIABLE_PREFIX}{network_name}")
    }

    /// Write this directory into `env`, replacing any previous snapshot.
    pub fn persist(&self, env: &mut Environment) -> PeerweaveResult<()> {
        let variable = Variable::new(Self::variable_type(&self.network_name), self.to_bytes()?)?;
        env.replace_type(variable);
        Ok(())
    }

    /// Read the directory for `network_name` from `env`.
    pub fn load(env: &Environment, network_name: &str) -> PeerweaveResult<Self> {
        let variable = env
            .query_type(&Self::variable_type(network_name))
            .map_err(|_| PeerweaveError::not_found("directory", network_name))?;
        Self::from_bytes(variable.payload.as_bytes())
    }

    /// Names of every network with a directory in `env`.
    pub fn networks(env: &Environment) -> Vec<String> {
        let mut names: Vec<String> = env
            .iter()
            .filter_map(|v| v.variable_type.strip_prefix(DIRECTORY_VARIABLE_PREFIX))
            .map(str::to_string)
            .collect();
        names.sort();
        names.dedup();
        names
    }
}

/// First 16 hex digits of the SHA-256 of `network_name`.
pub fn network_id_for(network_name: &str) -> String {
    let digest = Sha256::digest(network_name.as_bytes());
    hex::encode(&digest[..8])
}
