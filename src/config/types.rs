//! Configuration type definitions

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// This node's identity and listener
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Name advertised to peers (defaults to the hostname)
    #[serde(default = "default_node_name")]
    pub name: String,

    /// Address to accept transfers on (e.g., "0.0.0.0:52700")
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            name: default_node_name(),
            listen_addr: default_listen_addr(),
        }
    }
}

fn default_node_name() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "clipshare".to_string())
}

fn default_listen_addr() -> String {
    "0.0.0.0:52700".to_string()
}

/// Where received payloads go and how sent text is tagged
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClipboardConfig {
    /// Directory received payloads are spooled into
    #[serde(default = "default_spool_dir")]
    pub spool_dir: PathBuf,

    /// Type tag applied to `--text` items
    #[serde(default = "default_text_type")]
    pub text_type: String,

    /// Type tag applied to `--file` items without an explicit type
    #[serde(default = "default_file_type")]
    pub file_type: String,
}

impl Default for ClipboardConfig {
    fn default() -> Self {
        Self {
            spool_dir: default_spool_dir(),
            text_type: default_text_type(),
            file_type: default_file_type(),
        }
    }
}

fn default_spool_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("lamco-clipshare")
        .join("received")
}

fn default_text_type() -> String {
    "public.utf8-plain-text".to_string()
}

fn default_file_type() -> String {
    "public.data".to_string()
}

/// How peers are found on the local network
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Advertise and browse over mDNS-SD in addition to `[[peers]]`
    #[serde(default = "default_mdns")]
    pub mdns: bool,

    /// DNS-SD service type nodes register under
    #[serde(default = "default_service_type")]
    pub service_type: String,

    /// How long a lookup waits for browse results, in milliseconds
    #[serde(default = "default_browse_window_ms")]
    pub browse_window_ms: u64,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            mdns: default_mdns(),
            service_type: default_service_type(),
            browse_window_ms: default_browse_window_ms(),
        }
    }
}

fn default_mdns() -> bool {
    true
}

fn default_service_type() -> String {
    crate::discovery::SERVICE_TYPE.to_string()
}

fn default_browse_window_ms() -> u64 {
    2000
}

/// A statically configured peer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerConfig {
    /// Peer name used on the command line and in logs
    pub name: String,

    /// Address the peer accepts transfers on
    pub address: String,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level ("trace", "debug", "info", "warn", "error")
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log directory (None = stdout only)
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            log_dir: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}
