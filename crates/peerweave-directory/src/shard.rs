//! Shard partitioning.
//!
//! A shard holds at most `exponent²` members. Repartitioning only shrinks:
//! members past the new capacity are pruned newest first, and nothing is
//! backfilled when the shard is under capacity.

use peerweave_types::error::{PeerweaveError, PeerweaveResult};
use peerweave_types::peer::Peer;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Capacity of a shard with exponent `n`.
pub fn calculate_quadratic_exponent(n: u32) -> u64 {
    let n = n as u64;
    n * n
}

/// Smallest exponent whose capacity holds `count` members (at least 1).
fn exponent_for(count: usize) -> u32 {
    let mut e: u32 = 1;
    while calculate_quadratic_exponent(e) < count as u64 {
        e += 1;
    }
    e
}

/// A bounded subset of a network's peers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shard {
    /// Network this shard partitions.
    pub network_name: String,
    /// Content-derived address, fixed at creation.
    pub address: String,
    /// Size parameter; capacity is `exponent²`.
    pub exponent: u32,
    /// Members in insertion order.
    pub peers: Vec<Peer>,
}

impl Shard {
    /// Single-member shard seeded from `peer`.
    pub fn new(network_name: impl Into<String>, peer: &Peer) -> PeerweaveResult<Self> {
        let network_name = network_name.into();
        check_network(&network_name)?;
        let peers = vec![peer.detached()];
        Ok(Self {
            address: derive_address(&network_name, &peers),
            network_name,
            exponent: 1,
            peers,
        })
    }

    /// Shard over `peers`, with `local` appended if it is not already a member.
    ///
    /// The exponent is the smallest one whose capacity fits every member.
    pub fn with_peers(
        network_name: impl Into<String>,
        peers: &[Peer],
        local: &Peer,
    ) -> PeerweaveResult<Self> {
        let network_name = network_name.into();
        check_network(&network_name)?;

        let mut members: Vec<Peer> = Vec::with_capacity(peers.len() + 1);
        for peer in peers.iter().chain(std::iter::once(local)) {
            if members.iter().any(|m| m.address == peer.address) {
                if peer.address == local.address {
                    continue;
                }
                return Err(PeerweaveError::already_exists("shard member", &peer.address));
            }
            members.push(peer.detached());
        }

        Ok(Self {
            address: derive_address(&network_name, &members),
            exponent: exponent_for(members.len()),
            network_name,
            peers: members,
        })
    }

    /// Maximum membership at the current exponent.
    pub fn capacity(&self) -> u64 {
        calculate_quadratic_exponent(self.exponent)
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Index of the member with `address`.
    pub fn query_by_address(&self, address: &str) -> PeerweaveResult<usize> {
        self.peers
            .iter()
            .position(|p| p.address == address)
            .ok_or_else(|| PeerweaveError::not_found("shard member", address))
    }

    /// Append a member. Capacity is enforced only by [`Shard::repartition`].
    pub fn add_peer(&mut self, peer: &Peer) -> PeerweaveResult<()> {
        if self.peers.iter().any(|p| p.address == peer.address) {
            return Err(PeerweaveError::already_exists("shard member", &peer.address));
        }
        self.peers.push(peer.detached());
        Ok(())
    }

    /// Remove and return the member with `address`.
    pub fn remove_peer(&mut self, address: &str) -> PeerweaveResult<Peer> {
        let index = self.query_by_address(address)?;
        Ok(self.peers.remove(index))
    }

    /// Set the exponent and prune members beyond `exponent²`.
    ///
    /// Returns the pruned members, newest last. Exponent 0 is rejected since
    /// it would empty the shard.
    pub fn repartition(&mut self, exponent: u32) -> PeerweaveResult<Vec<Peer>> {
        if exponent == 0 {
            return Err(PeerweaveError::InvalidExponent(exponent));
        }
        let target = calculate_quadratic_exponent(exponent);
        let keep = usize::try_from(target).unwrap_or(usize::MAX);
        let pruned = if self.peers.len() > keep {
            self.peers.split_off(keep)
        } else {
            Vec::new()
        };
        self.exponent = exponent;
        Ok(pruned)
    }
}

fn check_network(network_name: &str) -> PeerweaveResult<()> {
    if network_name.is_empty() {
        return Err(PeerweaveError::InvalidNetwork("empty network name".into()));
    }
    Ok(())
}

fn derive_address(network_name: &str, members: &[Peer]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(network_name.as_bytes());
    for peer in members {
        hasher.update([0u8]);
        hasher.update(peer.address.as_bytes());
    }
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer(address: &str) -> Peer {
        Peer::new(address, false).unwrap()
    }

    #[test]
    fn test_quadratic_exponent() {
        for n in [0u32, 1, 2, 3, 10, 65_535] {
            assert_eq!(calculate_quadratic_exponent(n), (n as u64) * (n as u64));
        }
        assert_eq!(calculate_quadratic_exponent(u32::MAX), (u32::MAX as u64).pow(2));
    }

    #[test]
    fn test_single_member_then_grow_and_cap() {
        let mut shard = Shard::new("mesh", &peer("10.0.0.1:9000")).unwrap();
        assert!(shard.repartition(1).unwrap().is_empty());
        assert_eq!(shard.len(), 1);

        for i in 2..=6 {
            shard.add_peer(&peer(&format!("10.0.0.{i}:9000"))).unwrap();
        }
        assert_eq!(shard.len(), 6);

        let pruned = shard.repartition(2).unwrap();
        assert_eq!(shard.len(), 4);
        assert_eq!(shard.capacity(), 4);
        let pruned: Vec<_> = pruned.iter().map(|p| p.address.as_str()).collect();
        assert_eq!(pruned, vec!["10.0.0.5:9000", "10.0.0.6:9000"]);
        assert_eq!(shard.peers[0].address, "10.0.0.1:9000");
    }

    #[test]
    fn test_repartition_never_exceeds_capacity() {
        for e in 1..5u32 {
            let peers: Vec<Peer> = (1..=20).map(|i| peer(&format!("10.0.1.{i}:9000"))).collect();
            let mut shard = Shard::with_peers("mesh", &peers, &peers[0]).unwrap();
            shard.repartition(e).unwrap();
            assert!(shard.len() as u64 <= calculate_quadratic_exponent(e));
        }
    }

    #[test]
    fn test_repartition_grow_is_noop_on_members() {
        let mut shard = Shard::new("mesh", &peer("10.0.0.1:9000")).unwrap();
        assert!(shard.repartition(3).unwrap().is_empty());
        assert_eq!(shard.len(), 1);
        assert_eq!(shard.exponent, 3);
    }

    #[test]
    fn test_repartition_rejects_zero() {
        let mut shard = Shard::new("mesh", &peer("10.0.0.1:9000")).unwrap();
        assert!(matches!(
            shard.repartition(0),
            Err(PeerweaveError::InvalidExponent(0))
        ));
        assert_eq!(shard.len(), 1);
    }

    #[test]
    fn test_with_peers_appends_local() {
        let remote = [peer("10.0.0.2:9000"), peer("10.0.0.3:9000")];
        let local = peer("10.0.0.1:9000");
        let shard = Shard::with_peers("mesh", &remote, &local).unwrap();
        assert_eq!(shard.len(), 3);
        assert_eq!(shard.query_by_address("10.0.0.1:9000").unwrap(), 2);
        assert_eq!(shard.exponent, 2);

        let again = Shard::with_peers("mesh", &[local.clone()], &local).unwrap();
        assert_eq!(again.len(), 1);
    }

    #[test]
    fn test_with_peers_rejects_duplicates() {
        let a = peer("10.0.0.2:9000");
        let err = Shard::with_peers("mesh", &[a.clone(), a], &peer("10.0.0.1:9000")).unwrap_err();
        assert!(matches!(err, PeerweaveError::AlreadyExists { .. }));
    }

    #[test]
    fn test_address_is_deterministic_and_stable() {
        let a = peer("10.0.0.1:9000");
        let mut first = Shard::new("mesh", &a).unwrap();
        let second = Shard::new("mesh", &a).unwrap();
        assert_eq!(first.address, second.address);
        assert_ne!(first.address, Shard::new("other", &a).unwrap().address);

        let before = first.address.clone();
        first.add_peer(&peer("10.0.0.2:9000")).unwrap();
        assert_eq!(first.address, before);
    }

    #[test]
    fn test_remove_and_query() {
        let mut shard = Shard::new("mesh", &peer("10.0.0.1:9000")).unwrap();
        assert!(shard.add_peer(&peer("10.0.0.1:9000")).is_err());
        shard.remove_peer("10.0.0.1:9000").unwrap();
        assert!(shard.is_empty());
        assert!(matches!(
            shard.query_by_address("10.0.0.1:9000"),
            Err(PeerweaveError::NotFound { .. })
        ));
    }

    #[test]
    fn test_empty_network_rejected() {
        assert!(matches!(
            Shard::new("", &peer("10.0.0.1:9000")),
            Err(PeerweaveError::InvalidNetwork(_))
        ));
    }
}
