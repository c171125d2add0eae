//! Clipboard Sharing Node
//!
//! Orchestrates discovery, the TCP listener, and the session manager into a
//! node that both receives and sends clipboard payloads.
//!
//! # Architecture
//!
//! ```text
//! ClipShareNode (one task, owns everything mutable)
//!   ├─> TcpListener          accepted streams  -> SessionManager::accept_inbound
//!   ├─> NodeHandle commands  Send{peer, payload} -> Discovery::resolve -> connect
//!   ├─> connect tasks        opened streams    -> SessionManager::send_payload
//!   └─> watcher tasks        readiness events  -> SessionManager::handle_*_event
//! ```
//!
//! # Threading Model
//!
//! The node future is not `Send` and is meant to be driven directly by a
//! current-thread runtime. Spawned tasks (connects and watchers) hold only
//! sockets and channels; transfer state never leaves the node loop.
//!
//! # Example
//!
//! ```no_run
//! use lamco_clipshare::clipboard::SpoolClipboard;
//! use lamco_clipshare::config::Config;
//! use lamco_clipshare::discovery::StaticDiscovery;
//! use lamco_clipshare::server::ClipShareNode;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("clipshare.toml")?;
//!     let sink = SpoolClipboard::new(&config.clipboard.spool_dir)?;
//!     let discovery = StaticDiscovery::from_config(&config.peers)?;
//!     let node = ClipShareNode::bind(&config, sink, discovery).await?;
//!     node.run().await?;
//!     Ok(())
//! }
//! ```

use anyhow::{Context, Result};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, warn};

use crate::clipboard::error::{ClipboardError, Direction};
use crate::clipboard::payload::Payload;
use crate::clipboard::sink::ClipboardSink;
use crate::config::Config;
use crate::discovery::{Discovery, PeerId};
use crate::net::{spawn_watcher, TcpDuplex, WatchEvent};
use crate::session::{SessionManager, SessionStats};
use crate::transfer::TransferStatus;

/// Request to a running node
#[derive(Debug)]
pub enum NodeCommand {
    /// Send `payload` to `peer`
    Send {
        /// Destination peer
        peer: PeerId,
        /// Items to send
        payload: Payload,
    },
    /// Stop the node loop
    Shutdown,
}

/// Cloneable handle for controlling a node from other tasks
#[derive(Debug, Clone)]
pub struct NodeHandle {
    tx: mpsc::UnboundedSender<NodeCommand>,
}

impl NodeHandle {
    /// Queue a payload for `peer`
    pub fn send(&self, peer: PeerId, payload: Payload) -> crate::clipboard::Result<()> {
        self.command(NodeCommand::Send { peer, payload })
    }

    /// Ask the node to stop
    pub fn shutdown(&self) -> crate::clipboard::Result<()> {
        self.command(NodeCommand::Shutdown)
    }

    fn command(&self, command: NodeCommand) -> crate::clipboard::Result<()> {
        self.tx
            .send(command)
            .map_err(|_| ClipboardError::Backend("node is not running".to_string()))
    }
}

/// What a node did before it stopped
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NodeSummary {
    /// Session counters
    pub sessions: SessionStats,
    /// Sends that never reached a transfer (unknown peer, connect failure)
    pub failed_sends: u64,
}

type ConnectResult = (PeerId, Payload, io::Result<TcpStream>);

/// A clipboard sharing node
pub struct ClipShareNode<C, D> {
    name: String,
    listener: TcpListener,
    sessions: SessionManager<C>,
    discovery: D,
    idle_timeout: Option<Duration>,
    commands_tx: mpsc::UnboundedSender<NodeCommand>,
    commands_rx: mpsc::UnboundedReceiver<NodeCommand>,
    events_tx: mpsc::UnboundedSender<WatchEvent>,
    events_rx: mpsc::UnboundedReceiver<WatchEvent>,
    connects: JoinSet<ConnectResult>,
    exit_when_idle: bool,
    sends_dispatched: u64,
    failed_sends: u64,
}

impl<C: ClipboardSink, D: Discovery> ClipShareNode<C, D> {
    /// Bind the listener and assemble the node
    pub async fn bind(config: &Config, sink: C, discovery: D) -> Result<Self> {
        let listen_addr: SocketAddr = config
            .node
            .listen_addr
            .parse()
            .context("Invalid listen address")?;
        let listener = TcpListener::bind(listen_addr)
            .await
            .with_context(|| format!("Failed to bind {}", listen_addr))?;

        let idle_timeout = match config.transfer.idle_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };

        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        Ok(Self {
            name: config.node.name.clone(),
            listener,
            sessions: SessionManager::new(sink, config.transfer.clone()),
            discovery,
            idle_timeout,
            commands_tx,
            commands_rx,
            events_tx,
            events_rx,
            connects: JoinSet::new(),
            exit_when_idle: false,
            sends_dispatched: 0,
            failed_sends: 0,
        })
    }

    /// Stop once every queued send has finished
    pub fn exit_when_idle(mut self, exit: bool) -> Self {
        self.exit_when_idle = exit;
        self
    }

    /// Address the listener is bound to
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Handle for queueing sends and shutting down
    pub fn handle(&self) -> NodeHandle {
        NodeHandle {
            tx: self.commands_tx.clone(),
        }
    }

    /// Session manager
    pub fn sessions(&self) -> &SessionManager<C> {
        &self.sessions
    }

    /// Run until shut down, or until idle when [`exit_when_idle`](Self::exit_when_idle) is set
    pub async fn run(mut self) -> Result<NodeSummary> {
        let port = self.local_addr()?.port();
        self.discovery
            .advertise(&self.name, port)
            .await
            .context("Failed to advertise node")?;
        info!("Node {} listening on port {}", self.name, port);

        loop {
            if self.exit_when_idle && self.is_done() {
                info!("All transfers finished");
                break;
            }

            tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, remote)) => self.on_accept(stream, remote),
                    Err(e) => warn!("Accept failed: {}", e),
                },
                Some(command) = self.commands_rx.recv() => match command {
                    NodeCommand::Send { peer, payload } => self.on_send(peer, payload).await,
                    NodeCommand::Shutdown => {
                        info!("Shutdown requested");
                        break;
                    }
                },
                Some(joined) = self.connects.join_next(), if !self.connects.is_empty() => {
                    self.on_connected(joined);
                }
                Some(report) = self.events_rx.recv() => self.on_watch_event(report),
            }
        }

        let active = self.sessions.active_transfers();
        if active > 0 {
            warn!("Stopping with {} transfers in flight", active);
        }
        self.connects.abort_all();

        Ok(NodeSummary {
            sessions: self.sessions.stats(),
            failed_sends: self.failed_sends,
        })
    }

    fn is_done(&self) -> bool {
        self.sends_dispatched > 0 && self.connects.is_empty() && self.sessions.is_idle()
    }

    fn on_accept(&mut self, stream: TcpStream, remote: SocketAddr) {
        let peer = self
            .discovery
            .identify(remote)
            .unwrap_or_else(|| PeerId::from(remote));
        debug!("Accepted connection from {} ({})", remote, peer);

        let stream = Arc::new(stream);
        match self
            .sessions
            .accept_inbound(peer.clone(), TcpDuplex::new(stream.clone()))
        {
            Ok(()) => {
                spawn_watcher(
                    stream,
                    peer,
                    Direction::Inbound,
                    self.idle_timeout,
                    self.events_tx.clone(),
                );
            }
            Err(e) => debug!("Dropped connection from {}: {}", remote, e),
        }
    }

    async fn on_send(&mut self, peer: PeerId, payload: Payload) {
        self.sends_dispatched += 1;

        if self.sessions.has_outbound(&peer) {
            warn!("Send to {} refused: outbound transfer already active", peer);
            self.failed_sends += 1;
            return;
        }

        let addr = match self.discovery.resolve(&peer).await {
            Ok(addr) => addr,
            Err(e) => {
                error!("Cannot send to {}: {}", peer, e);
                self.failed_sends += 1;
                return;
            }
        };

        info!("Connecting to {} at {}", peer, addr);
        self.connects
            .spawn(async move { (peer, payload, TcpStream::connect(addr).await) });
    }

    fn on_connected(&mut self, joined: std::result::Result<ConnectResult, JoinError>) {
        let (peer, payload, connected) = match joined {
            Ok(result) => result,
            Err(e) => {
                error!("Connect task failed: {}", e);
                self.failed_sends += 1;
                return;
            }
        };

        let stream = match connected {
            Ok(stream) => Arc::new(stream),
            Err(e) => {
                error!("Failed to connect to {}: {}", peer, e);
                self.failed_sends += 1;
                return;
            }
        };

        match self
            .sessions
            .send_payload(&payload, peer.clone(), TcpDuplex::new(stream.clone()))
        {
            Ok(TransferStatus::Active) => {
                spawn_watcher(
                    stream,
                    peer,
                    Direction::Outbound,
                    self.idle_timeout,
                    self.events_tx.clone(),
                );
            }
            Ok(TransferStatus::Finished) => {}
            Err(e) => {
                warn!("Send to {} refused: {}", peer, e);
                self.failed_sends += 1;
            }
        }
    }

    fn on_watch_event(&mut self, report: WatchEvent) {
        let WatchEvent {
            peer,
            direction,
            event,
            ack,
        } = report;

        let status = match direction {
            Direction::Inbound => self.sessions.handle_inbound_event(&peer, event),
            Direction::Outbound => self.sessions.handle_outbound_event(&peer, event),
        };

        // Watchers are detached; a failed ack means the task already exited
        let _ = ack.send(status);
    }
}
