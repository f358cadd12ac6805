//! Persistence substrate for peerweave nodes.
//!
//! Provides the key-value [`SnapshotStore`] abstraction with two backends:
//! - **SQLite** ([`SqliteStore`]): durable, file-backed, versioned rows
//! - **In-memory** ([`MemoryStore`]): for tests and ephemeral nodes
//!
//! On top of either backend, [`PeerStateStore`] loads and saves peer
//! snapshots, serializing every read-modify-write per peer identity.

pub mod migration;
pub mod state;
pub mod store;
pub mod structured;

pub use state::PeerStateStore;
pub use store::{ApplyFn, MemoryStore, SnapshotStore};
pub use structured::SqliteStore;
