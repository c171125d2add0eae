//! # lamco-clipshare
//!
//! LAN clipboard sharing: incremental transfer of multi-representation
//! clipboard payloads between peers over non-blocking TCP streams.
//!
//! # Architecture
//!
//! ```text
//! lamco-clipshare
//!   ├─> protocol   (wire primitives: u8 counts, u64 BE lengths, UTF-8 tags)
//!   ├─> clipboard  (Payload / Item / Representation, sink and source seams)
//!   ├─> transfer   (outbound serializer, inbound state machine, stream trait)
//!   ├─> session    (one inbound + one outbound transfer per peer)
//!   ├─> net        (tokio sockets as DuplexStreams, readiness watchers)
//!   ├─> discovery  (peer naming and address resolution)
//!   └─> server     (the node event loop tying it all together)
//! ```
//!
//! # Data Flow
//!
//! **Send Path:** ClipboardSource → Payload → OutboundTransfer → TcpDuplex → Peer
//!
//! **Receive Path:** Peer → TcpDuplex → InboundTransfer → SessionManager → ClipboardSink
//!
//! # Wire Format
//!
//! ```text
//! Payload        := Item* Sentinel
//! Item           := RepCount(u8, 1-255) Representation{RepCount}
//! Representation := TypeTagLen(u64 BE) TypeTag(UTF-8) DataLen(u64 BE) Data
//! Sentinel       := 0x00
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Clipboard payload model and collaborators
pub mod clipboard;

/// Node configuration
pub mod config;

/// Peer discovery
pub mod discovery;

/// TCP transport
pub mod net;

/// Wire-format primitives
pub mod protocol;

/// Node event loop
pub mod server;

/// Per-peer transfer bookkeeping
pub mod session;

/// Transfer state machines
pub mod transfer;

/// Utility functions
pub mod utils;
