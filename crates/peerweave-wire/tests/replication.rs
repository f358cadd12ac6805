//! Directory replication between two live engines.

use peerweave_directory::{Directories, PeerDirectory};
use peerweave_memory::{MemoryStore, PeerStateStore};
use peerweave_types::config::NodeConfig;
use peerweave_types::message::{NetworkMessage, Priority};
use peerweave_types::peer::Peer;
use peerweave_wire::{start_listener, Engine, PeerClient, Replicator, WireError};
use std::sync::Arc;

const SECRET: &str = "test-secret-for-replication";

struct Node {
    address: String,
    port: u16,
    directories: Directories,
    replicator: Replicator,
    _engine: Arc<Engine>,
}

async fn spawn_node(identity: &str) -> Node {
    let listener = start_listener("127.0.0.1:0").await.unwrap();
    let local_addr = listener.local_addr().unwrap();
    let address = local_addr.to_string();
    let state = PeerStateStore::new(Arc::new(MemoryStore::new()));
    state
        .attach(identity, Peer::new(&address, false).unwrap())
        .await
        .unwrap();

    let config = NodeConfig {
        identity: identity.to_string(),
        listen_addr: address.clone(),
        shared_secret: SECRET.to_string(),
        io_timeout_secs: 5,
        ..NodeConfig::default()
    };
    let (engine, _task) = Engine::serve(config.clone(), state.clone(), listener)
        .await
        .unwrap();

    let directories = Directories::new(state, identity);
    let replicator = Replicator::new(
        PeerClient::from_config(&config, address.clone()),
        directories.clone(),
    );
    Node {
        address,
        port: local_addr.port(),
        directories,
        replicator,
        _engine: engine,
    }
}

fn addresses(directory: &PeerDirectory) -> Vec<String> {
    directory.peers.iter().map(|p| p.address.clone()).collect()
}

#[tokio::test]
async fn test_join_adds_joiner_on_both_sides() {
    let a = spawn_node("a").await;
    let b = spawn_node("b").await;
    a.directories.create("mesh", 30).await.unwrap();

    let joined = b.replicator.join("127.0.0.1", a.port, "mesh").await.unwrap();
    assert_eq!(addresses(&joined), vec![a.address.clone(), b.address.clone()]);

    assert_eq!(b.directories.load("mesh").await.unwrap(), joined);
    let on_a = a.directories.load("mesh").await.unwrap();
    assert_eq!(addresses(&on_a), addresses(&joined));
    assert!(on_a.bootstrap().unwrap().is_bootstrap);
}

#[tokio::test]
async fn test_join_twice_is_idempotent() {
    let a = spawn_node("a").await;
    let b = spawn_node("b").await;
    a.directories.create("mesh", 30).await.unwrap();

    b.replicator.join("127.0.0.1", a.port, "mesh").await.unwrap();
    let again = b.replicator.join("127.0.0.1", a.port, "mesh").await.unwrap();
    assert_eq!(again.len(), 2);
}

#[tokio::test]
async fn test_fetch_overwrites_local_copy() {
    let a = spawn_node("a").await;
    let b = spawn_node("b").await;
    a.directories.create("mesh", 30).await.unwrap();
    b.replicator.join("127.0.0.1", a.port, "mesh").await.unwrap();

    let extra = Peer::new("10.0.0.9:9000", false).unwrap();
    a.directories.add_peer("mesh", &extra).await.unwrap();

    let fetched = b.replicator.fetch_remote(&a.address, "mesh").await.unwrap();
    assert_eq!(fetched.len(), 3);
    let on_b = b.directories.load("mesh").await.unwrap();
    assert!(on_b.get("10.0.0.9:9000").is_some());
}

#[tokio::test]
async fn test_push_update_reaches_remote() {
    let a = spawn_node("a").await;
    let b = spawn_node("b").await;
    a.directories.create("mesh", 30).await.unwrap();
    b.replicator.join("127.0.0.1", a.port, "mesh").await.unwrap();

    let extra = Peer::new("10.0.0.7:9000", false).unwrap();
    b.directories.add_peer("mesh", &extra).await.unwrap();
    let echoed = b
        .replicator
        .push_update_to_remote(&a.address, "mesh")
        .await
        .unwrap();
    assert!(echoed.get("10.0.0.7:9000").is_some());

    let on_a = a.directories.load("mesh").await.unwrap();
    assert!(on_a.get("10.0.0.7:9000").is_some());
}

#[tokio::test]
async fn test_failed_fetch_leaves_local_state_alone() {
    let a = spawn_node("a").await;
    let b = spawn_node("b").await;
    a.directories.create("mesh", 30).await.unwrap();
    b.replicator.join("127.0.0.1", a.port, "mesh").await.unwrap();
    let before = b.directories.load("mesh").await.unwrap();

    let err = b
        .replicator
        .fetch_remote(&a.address, "unknown")
        .await
        .unwrap_err();
    assert!(matches!(err, WireError::Remote { code: 404, .. }));

    let dead = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let dead_addr = dead.local_addr().unwrap().to_string();
    drop(dead);
    assert!(b.replicator.fetch_remote(&dead_addr, "mesh").await.is_err());

    assert_eq!(b.directories.load("mesh").await.unwrap(), before);
}

#[tokio::test]
async fn test_broadcast_reports_unreachable_peers() {
    let a = spawn_node("a").await;
    let b = spawn_node("b").await;
    a.directories.create("mesh", 30).await.unwrap();
    b.replicator.join("127.0.0.1", a.port, "mesh").await.unwrap();

    let dead = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let dead_addr = dead.local_addr().unwrap().to_string();
    drop(dead);
    a.directories
        .add_peer("mesh", &Peer::new(&dead_addr, false).unwrap())
        .await
        .unwrap();

    let message = NetworkMessage::new("update", "mesh", "v2 rolled out", Priority::Info);
    let failures = a.replicator.broadcast_network_message(&message).await.unwrap();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].0, dead_addr);
}

#[tokio::test]
async fn test_send_network_message_to_one_peer() {
    let a = spawn_node("a").await;
    let b = spawn_node("b").await;
    let message = NetworkMessage::new("ping", "mesh", "hello", Priority::Normal);
    b.replicator
        .send_network_message(&a.address, &message)
        .await
        .unwrap();
}
