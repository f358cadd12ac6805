//! Core types for the peerweave peer-to-peer node framework.
//!
//! This crate defines the data structures shared by the store, the peer
//! directory and the wire protocol engine: peers, their variable stores,
//! the wire payloads exchanged between peers, and the error taxonomy.
//! It holds no I/O.

pub mod config;
pub mod connection;
pub mod error;
pub mod message;
pub mod peer;
pub mod variable;

pub use connection::{
    Command, Connection, ConnectionBody, ErrorBody, Event, ModifierSet, Response, ResponseEntry,
};
pub use error::{PeerweaveError, PeerweaveResult};
pub use message::{NetworkMessage, Priority};
pub use peer::Peer;
pub use variable::{Environment, Payload, Variable};
