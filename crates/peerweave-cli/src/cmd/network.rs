//! Network, shard, and messaging commands.

use crate::cmd::{directories, replicator, runtime};
use anyhow::Context;
use peerweave_types::config::NodeConfig;
use peerweave_types::message::{NetworkMessage, Priority};

pub fn cmd_network_create(
    config: NodeConfig,
    name: &str,
    timeout: Option<u32>,
) -> anyhow::Result<()> {
    let rt = runtime()?;
    rt.block_on(async {
        let directories = directories(&config).await?;
        let timeout = timeout.unwrap_or(config.acceptable_timeout_secs);
        let directory = directories.create(name, timeout).await?;
        println!(
            "Created network '{}' (id {}, timeout {}s)",
            directory.network_name, directory.network_id, directory.acceptable_timeout
        );
        Ok::<(), anyhow::Error>(())
    })
}

pub fn cmd_network_list(config: NodeConfig) -> anyhow::Result<()> {
    let rt = runtime()?;
    rt.block_on(async {
        let directories = directories(&config).await?;
        let networks = directories.networks().await?;
        if networks.is_empty() {
            println!("No networks. Create one with `peerweave network create <name>`");
            return Ok(());
        }
        println!("{:<24} {:<18} {:>6} {:>7}", "NETWORK", "ID", "PEERS", "SHARDS");
        for name in networks {
            let directory = directories.load(&name).await?;
            println!(
                "{:<24} {:<18} {:>6} {:>7}",
                directory.network_name,
                directory.network_id,
                directory.len(),
                directory.shards.len()
            );
        }
        Ok::<(), anyhow::Error>(())
    })
}

pub fn cmd_network_show(config: NodeConfig, name: &str) -> anyhow::Result<()> {
    let rt = runtime()?;
    rt.block_on(async {
        let directory = directories(&config).await?.load(name).await?;
        let rendered =
            serde_json::to_string_pretty(&directory).context("Failed to render directory")?;
        println!("{rendered}");
        Ok::<(), anyhow::Error>(())
    })
}

pub fn cmd_network_join(
    config: NodeConfig,
    host: &str,
    port: u16,
    name: &str,
) -> anyhow::Result<()> {
    let rt = runtime()?;
    rt.block_on(async {
        let replicator = replicator(&config).await?;
        let directory = replicator
            .join(host, port, name)
            .await
            .with_context(|| format!("Failed to join '{name}' through {host}:{port}"))?;
        println!("Joined '{name}' ({} peers)", directory.len());
        Ok::<(), anyhow::Error>(())
    })
}

pub fn cmd_network_fetch(config: NodeConfig, remote: &str, name: &str) -> anyhow::Result<()> {
    let rt = runtime()?;
    rt.block_on(async {
        let replicator = replicator(&config).await?;
        let directory = replicator
            .fetch_remote(remote, name)
            .await
            .with_context(|| format!("Failed to fetch '{name}' from {remote}"))?;
        println!("Fetched '{name}' from {remote} ({} peers)", directory.len());
        Ok::<(), anyhow::Error>(())
    })
}

pub fn cmd_network_push(config: NodeConfig, remote: &str, name: &str) -> anyhow::Result<()> {
    let rt = runtime()?;
    rt.block_on(async {
        let replicator = replicator(&config).await?;
        let directory = replicator
            .push_update_to_remote(remote, name)
            .await
            .with_context(|| format!("Failed to push '{name}' to {remote}"))?;
        println!("Pushed '{name}' to {remote} ({} peers)", directory.len());
        Ok::<(), anyhow::Error>(())
    })
}

pub fn cmd_network_prune(config: NodeConfig, name: &str) -> anyhow::Result<()> {
    let rt = runtime()?;
    rt.block_on(async {
        let pruned = directories(&config).await?.prune_stale(name).await?;
        if pruned.is_empty() {
            println!("No stale peers in '{name}'");
        }
        for peer in pruned {
            println!("Removed {}", peer.address);
        }
        Ok::<(), anyhow::Error>(())
    })
}

pub fn cmd_shard_create(
    config: NodeConfig,
    network: &str,
    peers: &[String],
) -> anyhow::Result<()> {
    let rt = runtime()?;
    rt.block_on(async {
        let directories = directories(&config).await?;
        let shard = if peers.is_empty() {
            directories.create_shard(network).await?
        } else {
            directories.create_shard_with_peers(network, peers).await?
        };
        println!(
            "Created shard {} in '{network}' ({} members, capacity {})",
            shard.address,
            shard.len(),
            shard.capacity()
        );
        Ok::<(), anyhow::Error>(())
    })
}

pub fn cmd_shard_repartition(
    config: NodeConfig,
    network: &str,
    shard: &str,
    exponent: u32,
) -> anyhow::Result<()> {
    let rt = runtime()?;
    rt.block_on(async {
        let pruned = directories(&config)
            .await?
            .repartition_shard(network, shard, exponent)
            .await?;
        println!("Repartitioned shard {shard}: {} members pruned", pruned.len());
        for peer in pruned {
            println!("  {}", peer.address);
        }
        Ok::<(), anyhow::Error>(())
    })
}

pub fn cmd_send_message(
    config: NodeConfig,
    network: &str,
    message_type: &str,
    priority: u8,
    to: Option<&str>,
    text: &str,
) -> anyhow::Result<()> {
    let message = NetworkMessage::new(message_type, network, text, Priority::from_code(priority));
    let rt = runtime()?;
    rt.block_on(async {
        let replicator = replicator(&config).await?;
        match to {
            Some(remote) => {
                replicator
                    .send_network_message(remote, &message)
                    .await
                    .with_context(|| format!("Failed to deliver to {remote}"))?;
                println!("Delivered to {remote}");
            }
            None => {
                let failures = replicator.broadcast_network_message(&message).await?;
                for (peer, e) in &failures {
                    eprintln!("  {peer}: {e}");
                }
                if failures.is_empty() {
                    println!("Broadcast to '{network}' delivered");
                } else {
                    println!("Broadcast to '{network}': {} peers unreachable", failures.len());
                }
            }
        }
        Ok::<(), anyhow::Error>(())
    })
}
