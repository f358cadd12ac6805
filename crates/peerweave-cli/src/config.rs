//! Configuration loading from `~/.peerweave/config.toml` with defaults.

use peerweave_types::config::{peerweave_home, NodeConfig};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable that overrides `shared_secret`.
pub const SECRET_ENV: &str = "PEERWEAVE_SHARED_SECRET";
/// Environment variable that overrides `identity`.
pub const IDENTITY_ENV: &str = "PEERWEAVE_IDENTITY";

/// Default config file location.
pub fn default_config_path() -> PathBuf {
    peerweave_home().join("config.toml")
}

/// Load configuration from disk, falling back to defaults.
///
/// A missing or unparseable file is not an error. Environment overrides are
/// applied last.
pub fn load_config(path: Option<&Path>) -> NodeConfig {
    let config_path = path
        .map(|p| p.to_path_buf())
        .unwrap_or_else(default_config_path);

    let config = if config_path.exists() {
        match std::fs::read_to_string(&config_path) {
            Ok(contents) => match toml::from_str::<NodeConfig>(&contents) {
                Ok(config) => {
                    info!(path = %config_path.display(), "Loaded configuration");
                    config
                }
                Err(e) => {
                    warn!(
                        error = %e,
                        path = %config_path.display(),
                        "Failed to parse config, using defaults"
                    );
                    NodeConfig::default()
                }
            },
            Err(e) => {
                warn!(
                    error = %e,
                    path = %config_path.display(),
                    "Failed to read config file, using defaults"
                );
                NodeConfig::default()
            }
        }
    } else {
        info!(
            path = %config_path.display(),
            "Config file not found, using defaults"
        );
        NodeConfig::default()
    };

    apply_overrides(config, |key| std::env::var(key).ok())
}

/// Apply `PEERWEAVE_*` overrides read through `lookup`. Empty values are ignored.
pub fn apply_overrides(
    mut config: NodeConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> NodeConfig {
    if let Some(secret) = lookup(SECRET_ENV).filter(|s| !s.is_empty()) {
        config.shared_secret = secret;
    }
    if let Some(identity) = lookup(IDENTITY_ENV).filter(|s| !s.is_empty()) {
        config.identity = identity;
    }
    config
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = apply_overrides(
            load_config(Some(&dir.path().join("absent.toml"))),
            |_| None,
        );
        assert_eq!(config.identity, NodeConfig::default().identity);
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "listen_addr = \"127.0.0.1:4100\"\nmax_connections = 8\n").unwrap();
        let config = load_config(Some(&path));
        assert_eq!(config.listen_addr, "127.0.0.1:4100");
        assert_eq!(config.max_connections, 8);
        assert_eq!(config.io_timeout_secs, NodeConfig::default().io_timeout_secs);
    }

    #[test]
    fn test_garbage_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "this is = = not toml").unwrap();
        let config = load_config(Some(&path));
        assert_eq!(config.listen_addr, NodeConfig::default().listen_addr);
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = [(SECRET_ENV, "s3cret"), (IDENTITY_ENV, "")].into();
        let config = apply_overrides(NodeConfig::default(), |k| env.get(k).map(|v| v.to_string()));
        assert_eq!(config.shared_secret, "s3cret");
        assert_eq!(config.identity, "local");
    }
}
