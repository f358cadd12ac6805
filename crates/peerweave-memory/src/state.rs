//! Identity-scoped peer snapshots with a single writer per identity.
//!
//! Every connection handler, directory mutation and replication overwrite
//! that touches a peer's state goes through [`PeerStateStore::update`],
//! which holds that identity's gate for the whole load-modify-save cycle.
//! Concurrent handlers for the same identity therefore observe each other's
//! writes instead of silently overwriting them. The cycle itself is one
//! [`SnapshotStore::update`], so separate handles on the same database (an
//! engine and a CLI command, say) are serialized as well.

use crate::store::SnapshotStore;
use dashmap::DashMap;
use peerweave_types::error::{PeerweaveError, PeerweaveResult};
use peerweave_types::peer::Peer;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// Store key for an identity's peer snapshot.
pub fn peer_key(identity: &str) -> String {
    format!("peer/{identity}")
}

fn decode_peer(bytes: &[u8]) -> PeerweaveResult<Peer> {
    rmp_serde::from_slice(bytes).map_err(|e| PeerweaveError::Decode(e.to_string()))
}

fn encode_peer(peer: &Peer) -> PeerweaveResult<Vec<u8>> {
    // Named-field encoding keeps old snapshots readable as Peer grows.
    rmp_serde::to_vec_named(peer).map_err(|e| PeerweaveError::Internal(e.to_string()))
}

/// Peer snapshot access over any [`SnapshotStore`].
#[derive(Clone)]
pub struct PeerStateStore {
    store: Arc<dyn SnapshotStore>,
    gates: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl PeerStateStore {
    pub fn new(store: Arc<dyn SnapshotStore>) -> Self {
        Self {
            store,
            gates: Arc::new(DashMap::new()),
        }
    }

    /// The underlying key-value store.
    pub fn store(&self) -> &Arc<dyn SnapshotStore> {
        &self.store
    }

    fn gate(&self, identity: &str) -> Arc<Mutex<()>> {
        self.gates
            .entry(identity.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// True if a snapshot exists for `identity`.
    pub fn exists(&self, identity: &str) -> PeerweaveResult<bool> {
        Ok(self.store.get(&peer_key(identity))?.is_some())
    }

    /// Persist a fresh peer under `identity`. Fails if one is already attached.
    pub async fn attach(&self, identity: &str, peer: Peer) -> PeerweaveResult<()> {
        let gate = self.gate(identity);
        let _guard = gate.lock().await;
        let address = peer.address.clone();
        self.store.update(
            &peer_key(identity),
            Box::new(|current| {
                if current.is_some() {
                    return Err(PeerweaveError::already_exists("peer snapshot", identity));
                }
                encode_peer(&peer).map(Some)
            }),
        )?;
        debug!(identity, address = %address, "Attached peer");
        Ok(())
    }

    /// Reload the snapshot under the gate and read from it.
    pub async fn read<T>(
        &self,
        identity: &str,
        f: impl FnOnce(&Peer) -> PeerweaveResult<T>,
    ) -> PeerweaveResult<T> {
        let gate = self.gate(identity);
        let _guard = gate.lock().await;
        let bytes = self
            .store
            .get(&peer_key(identity))?
            .ok_or_else(|| PeerweaveError::not_found("peer snapshot", identity))?;
        f(&decode_peer(&bytes)?)
    }

    /// Reload, mutate and write back as one atomic store update.
    ///
    /// The in-process gate orders tasks sharing this handle; the store's own
    /// update orders every other handle on the same storage. The snapshot is
    /// saved only if `f` succeeds.
    pub async fn update<T>(
        &self,
        identity: &str,
        f: impl FnOnce(&mut Peer) -> PeerweaveResult<T>,
    ) -> PeerweaveResult<T> {
        let gate = self.gate(identity);
        let _guard = gate.lock().await;
        let mut out = None;
        self.store.update(
            &peer_key(identity),
            Box::new(|current| {
                let bytes = current
                    .ok_or_else(|| PeerweaveError::not_found("peer snapshot", identity))?;
                let mut peer = decode_peer(&bytes)?;
                out = Some(f(&mut peer)?);
                encode_peer(&peer).map(Some)
            }),
        )?;
        out.ok_or_else(|| PeerweaveError::Internal("snapshot update returned no value".into()))
    }

    /// Current snapshot, reloaded under the gate.
    pub async fn load(&self, identity: &str) -> PeerweaveResult<Peer> {
        self.read(identity, |peer| Ok(peer.clone())).await
    }
}
