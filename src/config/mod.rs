//! Configuration management
//!
//! Handles loading, validation, and merging of configuration from:
//! - TOML files
//! - CLI arguments
//!
//! Every section is optional in the file; missing values take the defaults
//! of [`Config::default_config`].

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::Path;

pub mod types;

use crate::transfer::TransferLimits;

pub use types::{ClipboardConfig, DiscoveryConfig, LoggingConfig, NodeConfig, PeerConfig};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Node identity and listener
    #[serde(default)]
    pub node: NodeConfig,
    /// Transfer limits
    #[serde(default)]
    pub transfer: TransferLimits,
    /// Clipboard configuration
    #[serde(default)]
    pub clipboard: ClipboardConfig,
    /// Local-network discovery
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    /// Statically configured peers
    #[serde(default)]
    pub peers: Vec<PeerConfig>,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content).context("Failed to parse config file")?;

        config.validate()?;
        Ok(config)
    }

    /// Create default configuration
    pub fn default_config() -> Result<Self> {
        let config = Config::default();
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        self.node
            .listen_addr
            .parse::<SocketAddr>()
            .context("Invalid listen address")?;

        if self.node.name.trim().is_empty() {
            anyhow::bail!("Node name cannot be empty");
        }

        let limits = &self.transfer;
        if limits.read_chunk_size == 0 {
            anyhow::bail!("read_chunk_size must be greater than zero");
        }
        if limits.max_representation_size > limits.max_payload_size {
            anyhow::bail!(
                "max_representation_size ({}) cannot exceed max_payload_size ({})",
                limits.max_representation_size,
                limits.max_payload_size
            );
        }

        if self.clipboard.text_type.is_empty() || self.clipboard.file_type.is_empty() {
            anyhow::bail!("Clipboard type tags cannot be empty");
        }

        let discovery = &self.discovery;
        if !discovery.service_type.starts_with('_')
            || !(discovery.service_type.ends_with("._tcp.local.")
                || discovery.service_type.ends_with("._udp.local."))
        {
            anyhow::bail!(
                "Invalid discovery service type: {} (expected e.g. {})",
                discovery.service_type,
                crate::discovery::SERVICE_TYPE
            );
        }
        if discovery.mdns && discovery.browse_window_ms == 0 {
            anyhow::bail!("browse_window_ms must be greater than zero when mdns is enabled");
        }

        let mut names = HashSet::new();
        for peer in &self.peers {
            peer.address
                .parse::<SocketAddr>()
                .with_context(|| format!("Invalid address for peer {}", peer.name))?;
            if !names.insert(peer.name.as_str()) {
                anyhow::bail!("Duplicate peer name: {}", peer.name);
            }
        }

        match self.logging.level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!("Invalid log level: {}", self.logging.level),
        }

        Ok(())
    }

    /// Override config with CLI arguments
    pub fn with_overrides(mut self, listen: Option<String>) -> Self {
        if let Some(listen_addr) = listen {
            self.node.listen_addr = listen_addr;
        }
        self
    }

    /// Look up a configured peer by name
    pub fn peer(&self, name: &str) -> Option<&PeerConfig> {
        self.peers.iter().find(|p| p.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = Config::default_config().unwrap();
        assert_eq!(config.node.listen_addr, "0.0.0.0:52700");
        assert!(!config.node.name.is_empty());
        assert_eq!(config.clipboard.text_type, "public.utf8-plain-text");
        assert_eq!(config.transfer, TransferLimits::default());
        assert!(config.peers.is_empty());
        assert!(config.discovery.mdns);
        assert_eq!(config.discovery.service_type, "_clipshare._tcp.local.");
    }

    #[test]
    fn test_config_validation_service_type() {
        let mut config = Config::default_config().unwrap();
        config.discovery.service_type = "clipshare".to_string();
        assert!(config.validate().is_err());

        config.discovery.service_type = "_clipshare._tcp.local.".to_string();
        config.discovery.browse_window_ms = 0;
        assert!(config.validate().is_err());

        config.discovery.mdns = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_invalid_address() {
        let mut config = Config::default_config().unwrap();
        config.node.listen_addr = "invalid".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_duplicate_peer() {
        let mut config = Config::default_config().unwrap();
        let peer = PeerConfig {
            name: "laptop".to_string(),
            address: "192.168.1.20:52700".to_string(),
        };
        config.peers = vec![peer.clone(), peer];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_invalid_peer_address() {
        let mut config = Config::default_config().unwrap();
        config.peers.push(PeerConfig {
            name: "laptop".to_string(),
            address: "laptop.local".to_string(),
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[node]
name = "workstation"

[discovery]
mdns = false

[transfer]
max_type_tag_len = 256
idle_timeout_secs = 30

[[peers]]
name = "laptop"
address = "192.168.1.20:52700"
"#
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.node.name, "workstation");
        assert_eq!(config.node.listen_addr, "0.0.0.0:52700");
        assert!(!config.discovery.mdns);
        assert_eq!(config.discovery.browse_window_ms, 2000);
        assert_eq!(config.transfer.max_type_tag_len, 256);
        assert_eq!(config.transfer.idle_timeout_secs, 30);
        assert_eq!(
            config.transfer.read_chunk_size,
            TransferLimits::default().read_chunk_size
        );
        assert_eq!(config.peer("laptop").unwrap().address, "192.168.1.20:52700");
    }

    #[test]
    fn test_with_overrides() {
        let config = Config::default_config()
            .unwrap()
            .with_overrides(Some("127.0.0.1:6000".to_string()));
        assert_eq!(config.node.listen_addr, "127.0.0.1:6000");
    }
}
