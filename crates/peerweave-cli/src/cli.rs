//! Clap CLI definitions for peerweave.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// peerweave: peer directories, shards and a small wire protocol.
#[derive(Parser)]
#[command(name = "peerweave", version, about)]
pub struct Cli {
    /// Path to config file.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a default config and create the local peer.
    Init {
        /// Advertised address of this node (`host:port`).
        #[arg(long)]
        address: String,
        /// Overwrite an existing config file.
        #[arg(long)]
        force: bool,
    },
    /// Run the engine until interrupted.
    Start,
    /// Manage network directories [*].
    #[command(subcommand)]
    Network(NetworkCommands),
    /// Manage shards of a network [*].
    #[command(subcommand)]
    Shard(ShardCommands),
    /// Send a network message to one peer, or to every peer in the network.
    SendMessage {
        network: String,
        /// Message category.
        #[arg(long, default_value = "notice")]
        message_type: String,
        /// 0 normal, 1 critical, 2 warning, 3 info.
        #[arg(long, default_value_t = 0)]
        priority: u8,
        /// Deliver to this peer only.
        #[arg(long)]
        to: Option<String>,
        message: String,
    },
}

#[derive(Subcommand)]
pub enum NetworkCommands {
    /// Bootstrap a new network with this node as its creator.
    Create {
        name: String,
        /// Staleness threshold in seconds (defaults to config).
        #[arg(long)]
        timeout: Option<u32>,
    },
    /// List networks with a local directory.
    List,
    /// Print a network's directory as JSON.
    Show { name: String },
    /// Join a network through one of its peers.
    Join { host: String, port: u16, name: String },
    /// Replace the local directory with a remote peer's copy.
    Fetch { remote: String, name: String },
    /// Send the local directory to a remote peer.
    Push { remote: String, name: String },
    /// Drop peers that have been silent past the network timeout.
    Prune { name: String },
}

#[derive(Subcommand)]
pub enum ShardCommands {
    /// Create a shard from this node plus the given directory members.
    Create {
        network: String,
        /// Member addresses to include.
        #[arg(long, value_delimiter = ',')]
        peers: Vec<String>,
    },
    /// Shrink a shard to at most `exponent²` members.
    Repartition {
        network: String,
        shard: String,
        exponent: u32,
    },
}
