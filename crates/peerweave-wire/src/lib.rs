//! Peerweave wire protocol.
//!
//! Peers talk over TCP using length-prefixed JSON frames. Every connection
//! opens with an HMAC-authenticated handshake, then carries exactly one
//! request frame and at most one reply.
//!
//! ## Architecture
//!
//! - **Engine**: accept loop that classifies and dispatches inbound frames
//! - **dispatch**: singular and batch handlers over a peer's persisted state
//! - **PeerClient**: outbound connections (request/reply and fire-and-forget)
//! - **Replicator**: directory join, fetch, push and network broadcasts

pub mod auth;
pub mod client;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod message;
pub mod replication;

pub use client::PeerClient;
pub use engine::{start_listener, Engine};
pub use error::WireError;
pub use message::{WireMessage, WireMessageKind};
pub use replication::Replicator;
