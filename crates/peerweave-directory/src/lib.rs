//! Per-network peer directories for peerweave.
//!
//! A [`PeerDirectory`] is the membership registry of one named network. It
//! lives inside the environment of the peer that owns it and is replicated
//! between peers by whole-snapshot overwrite. [`Shard`]s are bounded subsets
//! of a directory's peers, sized by the square of their exponent.

pub mod directory;
pub mod persisted;
pub mod shard;

pub use directory::PeerDirectory;
pub use persisted::Directories;
pub use shard::{calculate_quadratic_exponent, Shard};
