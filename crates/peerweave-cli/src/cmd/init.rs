//! `init` and `start`.

use crate::cmd::{open_state, require_local_peer, runtime};
use crate::config::default_config_path;
use anyhow::Context;
use peerweave_types::config::NodeConfig;
use peerweave_types::peer::Peer;
use peerweave_wire::Engine;
use std::path::Path;
use tracing::{error, info};

/// Generate a fresh pre-shared key.
pub(crate) fn generate_secret() -> String {
    format!(
        "{}{}",
        uuid::Uuid::new_v4().simple(),
        uuid::Uuid::new_v4().simple()
    )
}

/// Write `config` to `path` unless it already exists and `force` is off.
///
/// Returns whether the file was written.
pub(crate) fn write_config(path: &Path, config: &NodeConfig, force: bool) -> anyhow::Result<bool> {
    if path.exists() && !force {
        return Ok(false);
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let contents = toml::to_string_pretty(config).context("Failed to serialize config")?;
    std::fs::write(path, contents)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(true)
}

pub fn cmd_init(
    config_path: Option<&Path>,
    mut config: NodeConfig,
    address: &str,
    force: bool,
) -> anyhow::Result<()> {
    let peer = Peer::new(address, false)?;
    let path = config_path
        .map(Path::to_path_buf)
        .unwrap_or_else(default_config_path);

    if !path.exists() || force {
        config.listen_addr = address.to_string();
        if config.shared_secret.is_empty() {
            config.shared_secret = generate_secret();
        }
    }
    if write_config(&path, &config, force)? {
        println!("Wrote {}", path.display());
    } else {
        println!("Keeping existing {} (use --force to overwrite)", path.display());
    }

    let state = open_state(&config)?;
    let rt = runtime()?;
    rt.block_on(async {
        if state.exists(&config.identity)? && !force {
            println!("Local peer '{}' already initialized", config.identity);
            return Ok(());
        }
        state.attach(&config.identity, peer).await?;
        info!(identity = %config.identity, address, "Local peer initialized");
        println!("Initialized local peer '{}' at {address}", config.identity);
        Ok::<(), anyhow::Error>(())
    })
}

pub fn cmd_start(config: NodeConfig) -> anyhow::Result<()> {
    let state = open_state(&config)?;
    require_local_peer(&config, &state)?;
    let rt = runtime()?;
    rt.block_on(async move {
        let (engine, task) = Engine::start(config, state).await?;
        println!(
            "peerweave '{}' listening on {}",
            engine.identity(),
            engine.local_addr()
        );

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl+C received, shutting down");
            }
            joined = task => {
                if let Err(e) = joined {
                    error!(error = %e, "Accept loop terminated");
                    anyhow::bail!("accept loop terminated: {e}");
                }
            }
        }
        Ok::<(), anyhow::Error>(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_secret_is_hex() {
        let secret = generate_secret();
        assert_eq!(secret.len(), 64);
        assert!(secret.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(secret, generate_secret());
    }

    #[test]
    fn test_write_config_respects_force() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut config = NodeConfig {
            shared_secret: "first".to_string(),
            ..NodeConfig::default()
        };
        assert!(write_config(&path, &config, false).unwrap());

        config.shared_secret = "second".to_string();
        assert!(!write_config(&path, &config, false).unwrap());
        let loaded: NodeConfig = toml::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(loaded.shared_secret, "first");

        assert!(write_config(&path, &config, true).unwrap());
        let loaded: NodeConfig = toml::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(loaded.shared_secret, "second");
    }
}
