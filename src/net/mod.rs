//! TCP Transport
//!
//! Adapts tokio sockets to the transfer engine's [`DuplexStream`] and turns
//! socket readiness into [`StreamEvent`]s.
//!
//! # Architecture
//!
//! ```text
//!  watcher task (per stream)              node loop
//!  ─────────────────────────              ─────────
//!  stream.ready(interest) ──WatchEvent──> SessionManager::handle_*_event
//!           ▲                                     │ try_read / try_write
//!           └──────────── ack(TransferStatus) ◄───┘
//! ```
//!
//! The watcher never reads or writes. It reports readiness, then waits for
//! the node to acknowledge before awaiting readiness again, so every byte is
//! moved on the node loop. A `Finished` acknowledgement (or a dropped node)
//! stops the watcher and releases its handle on the socket.

use crate::clipboard::error::Direction;
use crate::discovery::PeerId;
use crate::transfer::{DuplexStream, ReadOutcome, StreamEvent, TransferStatus};
use bytes::BytesMut;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::Interest;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, trace};

/// Non-blocking [`DuplexStream`] over a shared tokio socket
#[derive(Debug)]
pub struct TcpDuplex {
    stream: Option<Arc<TcpStream>>,
    peer_addr: Option<SocketAddr>,
}

impl TcpDuplex {
    /// Wrap a socket shared with its watcher
    pub fn new(stream: Arc<TcpStream>) -> Self {
        let peer_addr = stream.peer_addr().ok();
        Self {
            stream: Some(stream),
            peer_addr,
        }
    }

    /// Remote address, if the socket reported one
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer_addr
    }

    fn socket(&self) -> io::Result<&TcpStream> {
        self.stream
            .as_deref()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "stream closed"))
    }
}

impl DuplexStream for TcpDuplex {
    fn read(&mut self, max: usize) -> io::Result<ReadOutcome> {
        let socket = self.socket()?;
        let mut buf = BytesMut::zeroed(max);
        match socket.try_read(&mut buf) {
            Ok(0) => Ok(ReadOutcome::Eof),
            Ok(n) => {
                buf.truncate(n);
                Ok(ReadOutcome::Data(buf.freeze()))
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(ReadOutcome::Pending),
            Err(e) => Err(e),
        }
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.socket()?.try_write(buf) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(0),
            Err(e) => Err(e),
        }
    }

    fn close(&mut self) {
        if self.stream.take().is_some() {
            trace!("Closed stream to {:?}", self.peer_addr);
        }
    }
}

/// Readiness report from a watcher task
#[derive(Debug)]
pub struct WatchEvent {
    /// Peer the stream belongs to
    pub peer: PeerId,
    /// Which of the peer's transfers the stream carries
    pub direction: Direction,
    /// What the socket reported
    pub event: StreamEvent,
    /// Acknowledgement: whether to keep watching
    pub ack: oneshot::Sender<TransferStatus>,
}

/// Spawn a task reporting readiness of `stream` until its transfer finishes.
///
/// Inbound streams are watched for readability, outbound streams for
/// writability. With `idle_timeout`, a stream that stays quiet that long is
/// reported as a `TimedOut` error.
pub fn spawn_watcher(
    stream: Arc<TcpStream>,
    peer: PeerId,
    direction: Direction,
    idle_timeout: Option<Duration>,
    events: mpsc::UnboundedSender<WatchEvent>,
) -> JoinHandle<()> {
    tokio::spawn(watch(stream, peer, direction, idle_timeout, events))
}

async fn watch(
    stream: Arc<TcpStream>,
    peer: PeerId,
    direction: Direction,
    idle_timeout: Option<Duration>,
    events: mpsc::UnboundedSender<WatchEvent>,
) {
    let interest = match direction {
        Direction::Inbound => Interest::READABLE,
        Direction::Outbound => Interest::WRITABLE,
    };

    loop {
        let ready = match idle_timeout {
            Some(window) => match tokio::time::timeout(window, stream.ready(interest)).await {
                Ok(ready) => ready,
                Err(_) => Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("no activity for {:?}", window),
                )),
            },
            None => stream.ready(interest).await,
        };

        let event = match ready {
            // A read-closed socket is still drained through read(), which
            // reports the end once buffered bytes are consumed
            Ok(r) if direction == Direction::Inbound && (r.is_readable() || r.is_read_closed()) => {
                StreamEvent::HasBytesAvailable
            }
            Ok(r) if r.is_write_closed() => StreamEvent::EndEncountered,
            Ok(r) if r.is_writable() => StreamEvent::HasSpaceAvailable,
            Ok(_) => continue,
            Err(e) => StreamEvent::ErrorOccurred(e),
        };

        let (ack, status) = oneshot::channel();
        let report = WatchEvent {
            peer: peer.clone(),
            direction,
            event,
            ack,
        };
        if events.send(report).is_err() {
            debug!("Node loop gone, {} watcher for {} exiting", direction, peer);
            return;
        }

        match status.await {
            Ok(TransferStatus::Active) => {}
            Ok(TransferStatus::Finished) | Err(_) => {
                debug!("{} watcher for {} finished", direction, peer);
                return;
            }
        }
    }
}
