//! Node configuration, loaded from `~/.peerweave/config.toml`.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for one peerweave node.
///
/// Every field has a default so partial config files are accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Key under which this node's peer snapshot is persisted.
    pub identity: String,
    /// Directory holding the SQLite store.
    pub data_dir: PathBuf,
    /// Address the engine listens on.
    pub listen_addr: String,
    /// Pre-shared key for HMAC handshake authentication.
    /// The engine refuses to start while this is empty.
    pub shared_secret: String,
    /// Default tracing filter when `RUST_LOG` is unset.
    pub log_level: String,
    /// Maximum connections handled concurrently.
    pub max_connections: usize,
    /// Deadline for each read or write on a connection.
    pub io_timeout_secs: u64,
    /// Staleness threshold for new directories.
    pub acceptable_timeout_secs: u32,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            identity: "local".to_string(),
            data_dir: peerweave_home().join("data"),
            listen_addr: "0.0.0.0:3000".to_string(),
            shared_secret: String::new(),
            log_level: "info".to_string(),
            max_connections: 256,
            io_timeout_secs: 30,
            acceptable_timeout_secs: 30,
        }
    }
}

impl NodeConfig {
    /// Path of the SQLite database file.
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("peerweave.db")
    }
}

/// The peerweave home directory (`~/.peerweave`).
pub fn peerweave_home() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(".peerweave")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = NodeConfig::default();
        assert_eq!(config.identity, "local");
        assert_eq!(config.log_level, "info");
        assert!(config.shared_secret.is_empty());
        assert!(config.database_path().ends_with("peerweave.db"));
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: NodeConfig = toml::from_str(
            r#"
            identity = "node-a"
            max_connections = 8
        "#,
        )
        .unwrap();
        assert_eq!(config.identity, "node-a");
        assert_eq!(config.max_connections, 8);
        assert_eq!(config.io_timeout_secs, 30);
        assert_eq!(config.listen_addr, "0.0.0.0:3000");
    }
}
