//! mDNS-SD discovery backend
//!
//! Registers this node as a `_clipshare._tcp` service on the local network and
//! browses for other nodes. Peers listed in `[[peers]]` are always known and
//! take precedence over discovered ones with the same name.
//!
//! The mdns-sd daemon runs on its own thread. Browse results are forwarded
//! into a tokio channel and folded into the peer table whenever
//! [`browse`](Discovery::browse) or [`resolve`](Discovery::resolve) runs, so
//! [`identify`](Discovery::identify) sees the peers known as of the last call.

use super::{Discovery, Peer, PeerId, StaticDiscovery};
use crate::clipboard::error::{ClipboardError, Result};
use crate::config::types::DiscoveryConfig;
use async_trait::async_trait;
use mdns_sd::{ServiceDaemon, ServiceEvent, ServiceInfo};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TryRecvError};
use tokio::time::Instant;
use tracing::{debug, info, trace};

/// Service type nodes register under
pub const SERVICE_TYPE: &str = "_clipshare._tcp.local.";

/// Discovery over multicast DNS service discovery
pub struct MdnsDiscovery {
    daemon: ServiceDaemon,
    service_type: String,
    browse_window: Duration,
    configured: StaticDiscovery,
    discovered: HashMap<PeerId, Peer>,
    events: Option<mpsc::UnboundedReceiver<ServiceEvent>>,
    registered: Option<String>,
    own_instance: Option<String>,
}

impl std::fmt::Debug for MdnsDiscovery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MdnsDiscovery")
            .field("service_type", &self.service_type)
            .field("discovered", &self.discovered.len())
            .field("registered", &self.registered)
            .finish()
    }
}

fn mdns_error(e: mdns_sd::Error) -> ClipboardError {
    ClipboardError::Backend(format!("mDNS: {}", e))
}

impl MdnsDiscovery {
    /// Start the mDNS daemon. `configured` peers are always resolvable.
    pub fn new(config: &DiscoveryConfig, configured: StaticDiscovery) -> Result<Self> {
        let daemon = ServiceDaemon::new().map_err(mdns_error)?;
        Ok(Self {
            daemon,
            service_type: config.service_type.clone(),
            browse_window: Duration::from_millis(config.browse_window_ms),
            configured,
            discovered: HashMap::new(),
            events: None,
            registered: None,
            own_instance: None,
        })
    }

    fn start_browsing(&mut self) -> Result<()> {
        if self.events.is_some() {
            return Ok(());
        }

        let receiver = self.daemon.browse(&self.service_type).map_err(mdns_error)?;
        let (tx, rx) = mpsc::unbounded_channel();
        std::thread::Builder::new()
            .name("mdns-browse".to_string())
            .spawn(move || {
                // Ends when the daemon shuts down or the node drops the receiver
                while let Ok(event) = receiver.recv() {
                    if tx.send(event).is_err() {
                        break;
                    }
                }
            })?;

        debug!("Browsing for {}", self.service_type);
        self.events = Some(rx);
        Ok(())
    }

    /// Fold queued browse events into the peer table, waiting up to `window`
    async fn collect(&mut self, window: Duration) {
        let deadline = Instant::now() + window;
        let Some(events) = self.events.as_mut() else {
            return;
        };

        loop {
            let event = match events.try_recv() {
                Ok(event) => event,
                Err(TryRecvError::Disconnected) => break,
                Err(TryRecvError::Empty) => {
                    match tokio::time::timeout_at(deadline, events.recv()).await {
                        Ok(Some(event)) => event,
                        Ok(None) | Err(_) => break,
                    }
                }
            };
            apply_event(
                &mut self.discovered,
                &self.service_type,
                self.own_instance.as_deref(),
                event,
            );
        }
    }

    fn lookup(&self, peer: &PeerId) -> Option<SocketAddr> {
        self.configured
            .lookup(peer)
            .or_else(|| self.discovered.get(peer).map(|p| p.address))
    }
}

#[async_trait]
impl Discovery for MdnsDiscovery {
    async fn advertise(&mut self, name: &str, port: u16) -> Result<()> {
        let host = format!("{}.local.", host_label(name));
        let properties = HashMap::from([(
            "version".to_string(),
            env!("CARGO_PKG_VERSION").to_string(),
        )]);
        let service = ServiceInfo::new(&self.service_type, name, &host, "", port, properties)
            .map_err(mdns_error)?
            .enable_addr_auto();

        let fullname = service.get_fullname().to_string();
        self.daemon.register(service).map_err(mdns_error)?;
        info!("Advertising {} on port {}", fullname, port);

        self.registered = Some(fullname);
        self.own_instance = Some(name.to_string());
        self.start_browsing()
    }

    async fn browse(&mut self) -> Result<Vec<Peer>> {
        self.start_browsing()?;
        self.collect(self.browse_window).await;

        let mut peers = self.configured.browse().await?;
        peers.extend(
            self.discovered
                .values()
                .filter(|p| self.configured.lookup(&p.id).is_none())
                .cloned(),
        );
        peers.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(peers)
    }

    async fn resolve(&mut self, peer: &PeerId) -> Result<SocketAddr> {
        if let Some(address) = self.configured.lookup(peer) {
            return Ok(address);
        }

        self.start_browsing()?;
        self.collect(Duration::ZERO).await;
        if self.lookup(peer).is_none() {
            debug!("Waiting up to {:?} for {} to appear", self.browse_window, peer);
            self.collect(self.browse_window).await;
        }

        let address = self
            .lookup(peer)
            .ok_or_else(|| ClipboardError::UnknownPeer(peer.to_string()))?;
        debug!("Resolved {} to {} via mDNS", peer, address);
        Ok(address)
    }

    fn identify(&self, remote: SocketAddr) -> Option<PeerId> {
        self.configured.identify(remote).or_else(|| {
            self.discovered
                .values()
                .find(|p| p.address.ip() == remote.ip())
                .map(|p| p.id.clone())
        })
    }
}

impl Drop for MdnsDiscovery {
    fn drop(&mut self) {
        if let Some(fullname) = self.registered.take() {
            let _ = self.daemon.unregister(&fullname);
        }
        let _ = self.daemon.shutdown();
    }
}

/// DNS label for the advertised host name
fn host_label(name: &str) -> String {
    let label: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect();
    let label = label.trim_matches('-');
    if label.is_empty() {
        "clipshare".to_string()
    } else {
        label.to_string()
    }
}

/// Instance name of a service fullname, e.g. `laptop` of
/// `laptop._clipshare._tcp.local.`
fn instance_name<'a>(fullname: &'a str, service_type: &str) -> Option<&'a str> {
    fullname
        .strip_suffix(service_type)?
        .strip_suffix('.')
        .filter(|name| !name.is_empty())
}

fn peer_from_service(service: &ServiceInfo, service_type: &str) -> Option<Peer> {
    let name = instance_name(service.get_fullname(), service_type)?;
    let addresses = service.get_addresses();
    let ip = addresses
        .iter()
        .filter(|ip| ip.is_ipv4())
        .min()
        .or_else(|| addresses.iter().min())?;
    Some(Peer {
        id: PeerId::new(name),
        address: SocketAddr::new(*ip, service.get_port()),
    })
}

fn apply_event(
    peers: &mut HashMap<PeerId, Peer>,
    service_type: &str,
    own_instance: Option<&str>,
    event: ServiceEvent,
) {
    match event {
        ServiceEvent::ServiceResolved(service) => {
            let Some(peer) = peer_from_service(&service, service_type) else {
                return;
            };
            if Some(peer.id.as_str()) == own_instance {
                return;
            }
            if peers.get(&peer.id) != Some(&peer) {
                info!("Discovered peer {} at {}", peer.id, peer.address);
            }
            peers.insert(peer.id.clone(), peer);
        }
        ServiceEvent::ServiceRemoved(_, fullname) => {
            if let Some(name) = instance_name(&fullname, service_type) {
                if peers.remove(&PeerId::new(name)).is_some() {
                    info!("Peer {} left", name);
                }
            }
        }
        other => trace!("mDNS event: {:?}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service(instance: &str, ip: &str, port: u16) -> ServiceInfo {
        ServiceInfo::new(
            SERVICE_TYPE,
            instance,
            "host.local.",
            ip,
            port,
            HashMap::<String, String>::new(),
        )
        .unwrap()
    }

    #[test]
    fn test_instance_name() {
        assert_eq!(
            instance_name("laptop._clipshare._tcp.local.", SERVICE_TYPE),
            Some("laptop")
        );
        assert_eq!(
            instance_name("My Mac._clipshare._tcp.local.", SERVICE_TYPE),
            Some("My Mac")
        );
        assert_eq!(instance_name("laptop._other._tcp.local.", SERVICE_TYPE), None);
        assert_eq!(instance_name("._clipshare._tcp.local.", SERVICE_TYPE), None);
    }

    #[test]
    fn test_host_label() {
        assert_eq!(host_label("My Mac"), "My-Mac");
        assert_eq!(host_label("laptop"), "laptop");
        assert_eq!(host_label("  "), "clipshare");
    }

    #[test]
    fn test_resolved_and_removed_events() {
        let mut peers = HashMap::new();

        apply_event(
            &mut peers,
            SERVICE_TYPE,
            Some("workstation"),
            ServiceEvent::ServiceResolved(service("laptop", "192.168.1.30", 52700)),
        );
        assert_eq!(
            peers.get(&PeerId::from("laptop")).map(|p| p.address),
            Some("192.168.1.30:52700".parse().unwrap())
        );

        // Our own registration is not a peer
        apply_event(
            &mut peers,
            SERVICE_TYPE,
            Some("workstation"),
            ServiceEvent::ServiceResolved(service("workstation", "192.168.1.10", 52700)),
        );
        assert_eq!(peers.len(), 1);

        apply_event(
            &mut peers,
            SERVICE_TYPE,
            Some("workstation"),
            ServiceEvent::ServiceRemoved(
                SERVICE_TYPE.to_string(),
                "laptop._clipshare._tcp.local.".to_string(),
            ),
        );
        assert!(peers.is_empty());
    }
}
