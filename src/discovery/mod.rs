//! Peer Discovery
//!
//! Defines the [`Discovery`] trait for advertising this node and locating
//! peers on the local network, with two backends:
//!
//! - [`StaticDiscovery`] - driven by the `[[peers]]` table of the configuration
//! - [`MdnsDiscovery`] - registers and browses `_clipshare._tcp` services over
//!   mDNS-SD, falling back to the configured peers
//!
//! The transfer core never talks to discovery directly. The node uses it to
//! turn a peer name into an address before opening an outbound stream, and to
//! name the peer behind an accepted connection.

use crate::clipboard::error::{ClipboardError, Result};
use crate::config::types::PeerConfig;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use tracing::{debug, info};

pub mod mdns;

pub use mdns::{MdnsDiscovery, SERVICE_TYPE};

/// Identity of a remote peer
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(String);

impl PeerId {
    /// Create a peer identity
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Peer name
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PeerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PeerId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<SocketAddr> for PeerId {
    /// Unknown peers are named after their IP address
    fn from(addr: SocketAddr) -> Self {
        Self::new(addr.ip().to_string())
    }
}

/// A peer known to discovery
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Peer {
    /// Peer identity
    pub id: PeerId,
    /// Address the peer accepts transfers on
    pub address: SocketAddr,
}

/// Local-network discovery backend
#[async_trait]
pub trait Discovery: Send + 'static {
    /// Start advertising this node
    async fn advertise(&mut self, name: &str, port: u16) -> Result<()>;

    /// Peers currently known
    async fn browse(&mut self) -> Result<Vec<Peer>>;

    /// Address to open an outbound stream to `peer`
    async fn resolve(&mut self, peer: &PeerId) -> Result<SocketAddr>;

    /// Name the peer behind an accepted connection, if known
    fn identify(&self, remote: SocketAddr) -> Option<PeerId>;
}

/// Discovery backed by a fixed peer list
#[derive(Debug, Clone, Default)]
pub struct StaticDiscovery {
    peers: Vec<Peer>,
    advertised: Option<(String, u16)>,
}

impl StaticDiscovery {
    /// Create from configured peers
    pub fn new(peers: Vec<Peer>) -> Self {
        Self {
            peers,
            advertised: None,
        }
    }

    /// Create from the `[[peers]]` configuration table
    pub fn from_config(peers: &[PeerConfig]) -> Result<Self> {
        let peers = peers
            .iter()
            .map(|p| {
                let address = p.address.parse::<SocketAddr>().map_err(|e| {
                    ClipboardError::UnknownPeer(format!("{} ({}): {}", p.name, p.address, e))
                })?;
                Ok(Peer {
                    id: PeerId::new(p.name.clone()),
                    address,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(peers))
    }

    /// Name and port being advertised, if any
    pub fn advertised(&self) -> Option<(&str, u16)> {
        self.advertised
            .as_ref()
            .map(|(name, port)| (name.as_str(), *port))
    }

    /// Address of a configured peer
    pub fn lookup(&self, peer: &PeerId) -> Option<SocketAddr> {
        self.peers.iter().find(|p| &p.id == peer).map(|p| p.address)
    }

    fn find_by_ip(&self, ip: IpAddr) -> Option<&Peer> {
        self.peers.iter().find(|p| p.address.ip() == ip)
    }
}

#[async_trait]
impl Discovery for StaticDiscovery {
    async fn advertise(&mut self, name: &str, port: u16) -> Result<()> {
        info!("Advertising {} on port {} ({} static peers)", name, port, self.peers.len());
        self.advertised = Some((name.to_string(), port));
        Ok(())
    }

    async fn browse(&mut self) -> Result<Vec<Peer>> {
        Ok(self.peers.clone())
    }

    async fn resolve(&mut self, peer: &PeerId) -> Result<SocketAddr> {
        let found = self
            .lookup(peer)
            .ok_or_else(|| ClipboardError::UnknownPeer(peer.to_string()))?;
        debug!("Resolved {} to {}", peer, found);
        Ok(found)
    }

    fn identify(&self, remote: SocketAddr) -> Option<PeerId> {
        self.find_by_ip(remote.ip()).map(|p| p.id.clone())
    }
}
