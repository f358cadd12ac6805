//! Command implementations by domain.

pub mod init;
pub mod network;

use anyhow::Context;
use peerweave_directory::Directories;
use peerweave_memory::{PeerStateStore, SqliteStore};
use peerweave_types::config::NodeConfig;
use peerweave_wire::{PeerClient, Replicator};
use std::sync::Arc;

pub(crate) fn runtime() -> anyhow::Result<tokio::runtime::Runtime> {
    tokio::runtime::Runtime::new().context("Failed to create tokio runtime")
}

/// Open the node's SQLite store.
pub(crate) fn open_state(config: &NodeConfig) -> anyhow::Result<PeerStateStore> {
    let path = config.database_path();
    let store = SqliteStore::open(&path)
        .with_context(|| format!("Failed to open database at {}", path.display()))?;
    Ok(PeerStateStore::new(Arc::new(store)))
}

/// Fail early with a hint when `peerweave init` has not been run.
pub(crate) fn require_local_peer(
    config: &NodeConfig,
    state: &PeerStateStore,
) -> anyhow::Result<()> {
    if !state.exists(&config.identity)? {
        anyhow::bail!(
            "No local peer '{}' found. Run `peerweave init --address <host:port>` first",
            config.identity
        );
    }
    Ok(())
}

pub(crate) async fn directories(config: &NodeConfig) -> anyhow::Result<Directories> {
    let state = open_state(config)?;
    require_local_peer(config, &state)?;
    Ok(Directories::new(state, config.identity.clone()))
}

/// Build a replicator that authenticates as the local peer.
pub(crate) async fn replicator(config: &NodeConfig) -> anyhow::Result<Replicator> {
    if config.shared_secret.is_empty() {
        anyhow::bail!("shared_secret is not set. Set it in config.toml or PEERWEAVE_SHARED_SECRET");
    }
    let directories = directories(config).await?;
    let local = directories.state().load(&config.identity).await?;
    let client = PeerClient::from_config(config, local.address);
    Ok(Replicator::new(client, directories))
}
