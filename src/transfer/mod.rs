//! Clipboard Transfer Engine
//!
//! Incremental, event-driven transfer of clipboard payloads over a
//! non-blocking [`DuplexStream`].
//!
//! # Architecture
//!
//! - [`OutboundTransfer`] - Serializes a payload up front, then drains it on
//!   writable events
//! - [`InboundTransfer`] - Feeds readable bytes into an [`InboundDecoder`] and
//!   reports items as they complete
//! - [`InboundDecoder`] - The receive state machine, free of any I/O
//!
//! Both transfers are single-threaded and callback-driven. They never spawn
//! work of their own: the owner calls `handle_event` once per readiness
//! notification and acts on the returned [`TransferEvent`]s.
//!
//! # Termination
//!
//! Every transfer produces exactly one [`TransferEvent::Ended`], whether it
//! finished cleanly, the stream failed, the peer disconnected or the payload
//! could not be serialized. The cause is logged, not reported.

use crate::clipboard::payload::Item;
use serde::{Deserialize, Serialize};

pub mod inbound;
pub mod outbound;
pub mod stream;

pub use inbound::{InboundDecoder, InboundState, InboundTransfer};
pub use outbound::OutboundTransfer;
pub use stream::{DuplexStream, MemoryStream, ReadOutcome, StreamEvent};

/// Notification emitted by a transfer to its owner
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferEvent {
    /// An inbound item was fully reconstructed
    ItemComplete(Item),
    /// The transfer reached its terminal state
    Ended,
}

/// Whether a transfer still needs stream events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStatus {
    /// Keep delivering readiness events
    Active,
    /// Transfer ended; stop watching the stream
    Finished,
}

/// Transfer limits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferLimits {
    /// Maximum bytes pulled from the stream per read call
    pub read_chunk_size: usize,

    /// Largest type tag accepted from a peer
    pub max_type_tag_len: usize,

    /// Largest single representation accepted from a peer
    pub max_representation_size: usize,

    /// Largest payload sent or received, sentinel included
    pub max_payload_size: usize,

    /// Seconds without readiness before a stream is failed (0 = never)
    pub idle_timeout_secs: u64,
}

impl Default for TransferLimits {
    fn default() -> Self {
        Self {
            read_chunk_size: 64 * 1024,                // 64KB reads
            max_type_tag_len: 4 * 1024,                // 4KB type tags
            max_representation_size: 256 * 1024 * 1024, // 256MB per representation
            max_payload_size: 512 * 1024 * 1024,       // 512MB per payload
            idle_timeout_secs: 0,
        }
    }
}
