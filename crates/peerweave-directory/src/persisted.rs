//! Directory operations against a peer's persisted snapshot.
//!
//! Each call runs under the identity's write gate in [`PeerStateStore`], so
//! a directory mutation can't interleave with a connection handler or a
//! replication overwrite for the same peer.

use crate::directory::PeerDirectory;
use crate::shard::Shard;
use chrono::Utc;
use peerweave_memory::PeerStateStore;
use peerweave_types::error::{PeerweaveError, PeerweaveResult};
use peerweave_types::peer::Peer;
use tracing::info;

/// The directories owned by one local identity.
#[derive(Clone)]
pub struct Directories {
    state: PeerStateStore,
    identity: String,
}

impl Directories {
    pub fn new(state: PeerStateStore, identity: impl Into<String>) -> Self {
        Self {
            state,
            identity: identity.into(),
        }
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn state(&self) -> &PeerStateStore {
        &self.state
    }

    /// Bootstrap `network_name` with the local peer as its creator.
    pub async fn create(
        &self,
        network_name: &str,
        acceptable_timeout: u32,
    ) -> PeerweaveResult<PeerDirectory> {
        let directory = self
            .state
            .update(&self.identity, |local| {
                if PeerDirectory::load(&local.environment, network_name).is_ok() {
                    return Err(PeerweaveError::already_exists("directory", network_name));
                }
                local.is_bootstrap = true;
                let directory = PeerDirectory::create(network_name, local, acceptable_timeout)?;
                directory.persist(&mut local.environment)?;
                Ok(directory)
            })
            .await?;
        info!(
            network = %directory.network_name,
            network_id = %directory.network_id,
            "Network created"
        );
        Ok(directory)
    }

    pub async fn load(&self, network_name: &str) -> PeerweaveResult<PeerDirectory> {
        self.state
            .read(&self.identity, |local| {
                PeerDirectory::load(&local.environment, network_name)
            })
            .await
    }

    /// Names of every network this identity holds a directory for.
    pub async fn networks(&self) -> PeerweaveResult<Vec<String>> {
        self.state
            .read(&self.identity, |local| {
                Ok(PeerDirectory::networks(&local.environment))
            })
            .await
    }

    /// Load, mutate and persist one directory as a single gated step.
    pub async fn modify<T>(
        &self,
        network_name: &str,
        f: impl FnOnce(&mut PeerDirectory) -> PeerweaveResult<T>,
    ) -> PeerweaveResult<T> {
        self.state
            .update(&self.identity, |local| {
                let mut directory = PeerDirectory::load(&local.environment, network_name)?;
                let out = f(&mut directory)?;
                directory.persist(&mut local.environment)?;
                Ok(out)
            })
            .await
    }

    pub async fn add_peer(&self, network_name: &str, peer: &Peer) -> PeerweaveResult<()> {
        self.modify(network_name, |dir| dir.add_peer(peer)).await
    }

    pub async fn remove_peer(&self, network_name: &str, address: &str) -> PeerweaveResult<Peer> {
        self.modify(network_name, |dir| dir.remove_peer(address)).await
    }

    /// Replace the local snapshot of `directory.network_name` wholesale.
    ///
    /// Last writer wins: nothing from the previous snapshot is merged.
    pub async fn overwrite(&self, directory: &PeerDirectory) -> PeerweaveResult<()> {
        self.state
            .update(&self.identity, |local| directory.persist(&mut local.environment))
            .await?;
        info!(
            network = %directory.network_name,
            peers = directory.peers.len(),
            "Directory overwritten"
        );
        Ok(())
    }

    /// Create a single-member shard from the local peer and register it.
    pub async fn create_shard(&self, network_name: &str) -> PeerweaveResult<Shard> {
        self.state
            .update(&self.identity, |local| {
                let mut directory = PeerDirectory::load(&local.environment, network_name)?;
                let shard = Shard::new(network_name, local)?;
                directory.add_shard(shard.clone())?;
                directory.persist(&mut local.environment)?;
                Ok(shard)
            })
            .await
    }

    /// Create a shard over the given directory members plus the local peer.
    pub async fn create_shard_with_peers(
        &self,
        network_name: &str,
        addresses: &[String],
    ) -> PeerweaveResult<Shard> {
        self.state
            .update(&self.identity, |local| {
                let mut directory = PeerDirectory::load(&local.environment, network_name)?;
                let mut members = Vec::with_capacity(addresses.len());
                for address in addresses {
                    let peer = directory
                        .get(address)
                        .ok_or_else(|| PeerweaveError::not_found("peer", address))?;
                    members.push(peer.clone());
                }
                let shard = Shard::with_peers(network_name, &members, local)?;
                directory.add_shard(shard.clone())?;
                directory.persist(&mut local.environment)?;
                Ok(shard)
            })
            .await
    }

    pub async fn repartition_shard(
        &self,
        network_name: &str,
        shard_address: &str,
        exponent: u32,
    ) -> PeerweaveResult<Vec<Peer>> {
        self.modify(network_name, |dir| dir.repartition_shard(shard_address, exponent))
            .await
    }

    /// Drop peers that have been silent longer than the network's timeout.
    pub async fn prune_stale(&self, network_name: &str) -> PeerweaveResult<Vec<Peer>> {
        self.modify(network_name, |dir| Ok(dir.prune_stale(Utc::now())))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use peerweave_memory::MemoryStore;
    use std::sync::Arc;

    async fn directories() -> Directories {
        let state = PeerStateStore::new(Arc::new(MemoryStore::new()));
        state
            .attach("local", Peer::new("10.0.0.1:9000", false).unwrap())
            .await
            .unwrap();
        Directories::new(state, "local")
    }

    #[tokio::test]
    async fn test_create_and_reload() {
        let dirs = directories().await;
        let created = dirs.create("mesh", 30).await.unwrap();
        assert_eq!(dirs.load("mesh").await.unwrap(), created);
        assert!(dirs.state().load("local").await.unwrap().is_bootstrap);

        let err = dirs.create("mesh", 30).await.unwrap_err();
        assert!(matches!(err, PeerweaveError::AlreadyExists { .. }));
        assert_eq!(dirs.networks().await.unwrap(), vec!["mesh"]);
    }

    #[tokio::test]
    async fn test_membership_is_persisted() {
        let dirs = directories().await;
        dirs.create("mesh", 30).await.unwrap();
        let remote = Peer::new("10.0.0.2:9000", false).unwrap();
        dirs.add_peer("mesh", &remote).await.unwrap();
        assert!(dirs.add_peer("mesh", &remote).await.is_err());
        assert_eq!(dirs.load("mesh").await.unwrap().len(), 2);

        dirs.remove_peer("mesh", "10.0.0.2:9000").await.unwrap();
        assert_eq!(dirs.load("mesh").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_network() {
        let dirs = directories().await;
        let err = dirs
            .add_peer("nope", &Peer::new("10.0.0.2:9000", false).unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, PeerweaveError::NotFound { kind: "directory", .. }));
    }

    #[tokio::test]
    async fn test_overwrite_replaces_snapshot() {
        let dirs = directories().await;
        dirs.create("mesh", 30).await.unwrap();
        dirs.add_peer("mesh", &Peer::new("10.0.0.2:9000", false).unwrap())
            .await
            .unwrap();

        let foreign =
            PeerDirectory::create("mesh", &Peer::new("10.0.0.9:9000", true).unwrap(), 60).unwrap();
        dirs.overwrite(&foreign).await.unwrap();
        let loaded = dirs.load("mesh").await.unwrap();
        assert_eq!(loaded, foreign);
        assert!(loaded.get("10.0.0.2:9000").is_none());
    }

    #[tokio::test]
    async fn test_shards_are_persisted() {
        let dirs = directories().await;
        dirs.create("mesh", 30).await.unwrap();
        for i in 2..=6 {
            let peer = Peer::new(format!("10.0.0.{i}:9000"), false).unwrap();
            dirs.add_peer("mesh", &peer).await.unwrap();
        }
        let addresses: Vec<String> = (2..=6).map(|i| format!("10.0.0.{i}:9000")).collect();
        let shard = dirs.create_shard_with_peers("mesh", &addresses).await.unwrap();
        assert_eq!(shard.len(), 6);
        assert_eq!(shard.exponent, 3);

        let pruned = dirs
            .repartition_shard("mesh", &shard.address, 2)
            .await
            .unwrap();
        assert_eq!(pruned.len(), 2);
        let stored = dirs.load("mesh").await.unwrap();
        assert_eq!(stored.shard(&shard.address).unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_concurrent_adds_are_all_kept() {
        let dirs = directories().await;
        dirs.create("mesh", 30).await.unwrap();
        let mut handles = Vec::new();
        for i in 2..=17 {
            let dirs = dirs.clone();
            handles.push(tokio::spawn(async move {
                let peer = Peer::new(format!("10.0.1.{i}:9000"), false).unwrap();
                dirs.add_peer("mesh", &peer).await
            }));
        }
        for h in handles {
            h.await.unwrap().unwrap();
        }
        assert_eq!(dirs.load("mesh").await.unwrap().len(), 17);
    }
}
