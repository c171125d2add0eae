//! Transfer Session Manager
//!
//! Binds at most one inbound and one outbound transfer to each peer and relays
//! completed payloads to the clipboard sink.
//!
//! # Overview
//!
//! ```text
//!                      ┌──────────────── SessionManager ───────────────┐
//! accepted stream ───> │ accept_inbound ─> InboundTransfer ─┐          │
//!                      │                   (ItemComplete)   ├─ items ──┼─> ClipboardSink
//!                      │                   (Ended) ─────────┘          │
//! opened stream ─────> │ send_payload ──> OutboundTransfer             │
//!                      │                   (Ended) ─> clear slot       │
//!                      └───────────────────────────────────────────────┘
//! ```
//!
//! Items received so far are held here, not in the transfer, and are delivered
//! as one payload when the transfer ends. A transfer that ends early (peer
//! disconnect, stream error, protocol violation) delivers whatever items were
//! fully reconstructed before the fault.
//!
//! # Threading
//!
//! The transfer table is mutated only from the event loop that owns the
//! manager. Nothing here is `Sync`; a multi-threaded host must wrap the whole
//! manager in a lock.

use crate::clipboard::error::{ClipboardError, Direction, Result};
use crate::clipboard::payload::{Item, Payload};
use crate::clipboard::sink::{ClipboardSink, ClipboardSource};
use crate::discovery::PeerId;
use crate::transfer::{
    DuplexStream, InboundTransfer, OutboundTransfer, StreamEvent, TransferEvent, TransferLimits,
    TransferStatus,
};
use std::collections::HashMap;
use tracing::{debug, error, info, warn};

/// Stream type held by the manager
pub type BoxedStream = Box<dyn DuplexStream>;

struct InboundSlot {
    transfer: InboundTransfer<BoxedStream>,
    items: Vec<Item>,
}

#[derive(Default)]
struct PeerTransfers {
    inbound: Option<InboundSlot>,
    outbound: Option<OutboundTransfer<BoxedStream>>,
}

impl PeerTransfers {
    fn is_empty(&self) -> bool {
        self.inbound.is_none() && self.outbound.is_none()
    }
}

/// Session counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// Inbound transfers that reached their terminal state
    pub inbound_finished: u64,
    /// Outbound transfers that reached their terminal state
    pub outbound_finished: u64,
    /// Transfers refused by the one-per-peer guard
    pub rejected: u64,
    /// Items received across all inbound transfers
    pub items_received: u64,
    /// Payloads handed to the sink
    pub payloads_delivered: u64,
}

/// Owns every live transfer, keyed by peer
pub struct SessionManager<C> {
    sink: C,
    limits: TransferLimits,
    peers: HashMap<PeerId, PeerTransfers>,
    next_transfer_id: u64,
    stats: SessionStats,
}

impl<C: ClipboardSink> SessionManager<C> {
    /// Create a manager delivering into `sink`
    pub fn new(sink: C, limits: TransferLimits) -> Self {
        Self {
            sink,
            limits,
            peers: HashMap::new(),
            next_transfer_id: 1,
            stats: SessionStats::default(),
        }
    }

    /// Clipboard sink
    pub fn sink(&self) -> &C {
        &self.sink
    }

    /// Transfer limits applied to new transfers
    pub fn limits(&self) -> &TransferLimits {
        &self.limits
    }

    /// Session counters
    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    /// Whether an inbound transfer from `peer` is running
    pub fn has_inbound(&self, peer: &PeerId) -> bool {
        self.peers.get(peer).is_some_and(|p| p.inbound.is_some())
    }

    /// Whether an outbound transfer to `peer` is running
    pub fn has_outbound(&self, peer: &PeerId) -> bool {
        self.peers.get(peer).is_some_and(|p| p.outbound.is_some())
    }

    /// Number of running transfers in both directions
    pub fn active_transfers(&self) -> usize {
        self.peers
            .values()
            .map(|p| p.inbound.is_some() as usize + p.outbound.is_some() as usize)
            .sum()
    }

    /// Whether no transfer is running
    pub fn is_idle(&self) -> bool {
        self.peers.is_empty()
    }

    fn allocate_id(&mut self) -> u64 {
        let id = self.next_transfer_id;
        self.next_transfer_id += 1;
        id
    }

    fn reject(&mut self, peer: &PeerId, direction: Direction) -> ClipboardError {
        self.stats.rejected += 1;
        warn!(
            "Rejecting {} transfer for {}: one already active",
            direction, peer
        );
        ClipboardError::TransferAlreadyActive {
            peer: peer.to_string(),
            direction,
        }
    }

    /// Register and start an inbound transfer on an accepted stream.
    ///
    /// Refused, without creating a transfer, if `peer` already has one.
    pub fn accept_inbound(
        &mut self,
        peer: PeerId,
        stream: impl DuplexStream + 'static,
    ) -> Result<()> {
        if self.has_inbound(&peer) {
            return Err(self.reject(&peer, Direction::Inbound));
        }

        let id = self.allocate_id();
        let mut transfer =
            InboundTransfer::new(id, Box::new(stream) as BoxedStream, self.limits.clone());
        let events = transfer.start();
        info!("Inbound transfer {} from {} started", id, peer);

        self.peers.entry(peer.clone()).or_default().inbound = Some(InboundSlot {
            transfer,
            items: Vec::new(),
        });
        self.apply_inbound_events(&peer, events);
        Ok(())
    }

    /// Register and start an outbound transfer of `payload` on an opened stream.
    ///
    /// Refused, without creating a transfer, if `peer` already has one. The
    /// payload is serialized immediately; nothing of it is kept here.
    pub fn send_payload(
        &mut self,
        payload: &Payload,
        peer: PeerId,
        stream: impl DuplexStream + 'static,
    ) -> Result<TransferStatus> {
        if self.has_outbound(&peer) {
            return Err(self.reject(&peer, Direction::Outbound));
        }

        let id = self.allocate_id();
        let transfer =
            OutboundTransfer::new(id, payload, Box::new(stream) as BoxedStream, &self.limits);
        info!(
            "Outbound transfer {} to {} started: {} items",
            id,
            peer,
            payload.len()
        );
        Ok(self.register_outbound(peer, transfer))
    }

    /// Capture items from `source` and send them to `peer`.
    ///
    /// A capture failure still registers a transfer, which ends at once
    /// without writing.
    pub fn send_from_source(
        &mut self,
        source: &mut dyn ClipboardSource,
        peer: PeerId,
        stream: impl DuplexStream + 'static,
    ) -> Result<TransferStatus> {
        if self.has_outbound(&peer) {
            return Err(self.reject(&peer, Direction::Outbound));
        }

        match source.read_items() {
            Ok(items) => self.send_payload(&Payload::new(items), peer, stream),
            Err(e) => {
                let id = self.allocate_id();
                let transfer = OutboundTransfer::failed(id, Box::new(stream) as BoxedStream, e);
                Ok(self.register_outbound(peer, transfer))
            }
        }
    }

    fn register_outbound(
        &mut self,
        peer: PeerId,
        mut transfer: OutboundTransfer<BoxedStream>,
    ) -> TransferStatus {
        let events = transfer.start();
        self.peers.entry(peer.clone()).or_default().outbound = Some(transfer);
        self.apply_outbound_events(&peer, events)
    }

    /// Route a readiness event to the inbound transfer from `peer`
    pub fn handle_inbound_event(&mut self, peer: &PeerId, event: StreamEvent) -> TransferStatus {
        let Some(slot) = self.peers.get_mut(peer).and_then(|p| p.inbound.as_mut()) else {
            debug!("Dropping inbound event for {}: no transfer", peer);
            return TransferStatus::Finished;
        };
        let events = slot.transfer.handle_event(event);
        self.apply_inbound_events(peer, events)
    }

    /// Route a readiness event to the outbound transfer to `peer`
    pub fn handle_outbound_event(&mut self, peer: &PeerId, event: StreamEvent) -> TransferStatus {
        let Some(transfer) = self.peers.get_mut(peer).and_then(|p| p.outbound.as_mut()) else {
            debug!("Dropping outbound event for {}: no transfer", peer);
            return TransferStatus::Finished;
        };
        let events = transfer.handle_event(event);
        self.apply_outbound_events(peer, events)
    }

    fn apply_inbound_events(&mut self, peer: &PeerId, events: Vec<TransferEvent>) -> TransferStatus {
        let mut ended = false;

        if let Some(slot) = self.peers.get_mut(peer).and_then(|p| p.inbound.as_mut()) {
            for event in events {
                match event {
                    TransferEvent::ItemComplete(item) => {
                        debug!(
                            "Item {} from {} complete: {:?}",
                            slot.items.len(),
                            peer,
                            item.type_tags().collect::<Vec<_>>()
                        );
                        self.stats.items_received += 1;
                        slot.items.push(item);
                    }
                    TransferEvent::Ended => ended = true,
                }
            }
        }

        if !ended {
            return TransferStatus::Active;
        }

        let Some(slot) = self.take_inbound(peer) else {
            return TransferStatus::Finished;
        };
        self.stats.inbound_finished += 1;

        let payload = Payload::new(slot.items);
        info!(
            "Inbound transfer {} from {} ended: {} items, digest {}",
            slot.transfer.id(),
            peer,
            payload.len(),
            payload.digest()
        );
        match self.sink.deliver(peer, payload) {
            Ok(()) => self.stats.payloads_delivered += 1,
            Err(e) => error!("Clipboard sink rejected payload from {}: {}", peer, e),
        }
        TransferStatus::Finished
    }

    fn apply_outbound_events(
        &mut self,
        peer: &PeerId,
        events: Vec<TransferEvent>,
    ) -> TransferStatus {
        if !events.contains(&TransferEvent::Ended) {
            return TransferStatus::Active;
        }

        if let Some(transfer) = self
            .peers
            .get_mut(peer)
            .and_then(|p| p.outbound.take())
        {
            self.stats.outbound_finished += 1;
            info!(
                "Outbound transfer {} to {} ended: {}/{} bytes",
                transfer.id(),
                peer,
                transfer.bytes_written(),
                transfer.total_bytes()
            );
        }
        self.prune(peer);
        TransferStatus::Finished
    }

    fn take_inbound(&mut self, peer: &PeerId) -> Option<InboundSlot> {
        let slot = self.peers.get_mut(peer).and_then(|p| p.inbound.take());
        self.prune(peer);
        slot
    }

    fn prune(&mut self, peer: &PeerId) {
        if self.peers.get(peer).is_some_and(PeerTransfers::is_empty) {
            self.peers.remove(peer);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clipboard::payload::Representation;
    use crate::clipboard::sink::MockClipboardSink;
    use crate::transfer::MemoryStream;
    use mockall::predicate::eq;

    fn laptop() -> PeerId {
        PeerId::from("laptop")
    }

    fn two_item_payload() -> Payload {
        Payload::new(vec![
            Item::single("public.utf8-plain-text", "first"),
            Item::new(vec![
                Representation::new("public.utf8-plain-text", "second"),
                Representation::new("public.rtf", "{\\rtf1 second}"),
            ])
            .unwrap(),
        ])
    }

    fn readable(bytes: &[u8]) -> MemoryStream {
        let mut stream = MemoryStream::new();
        stream.push_incoming(bytes.to_vec());
        stream
    }

    #[test]
    fn test_inbound_payload_delivered_on_end() {
        let payload = two_item_payload();

        let mut sink = MockClipboardSink::new();
        sink.expect_deliver()
            .with(eq(laptop()), eq(payload.clone()))
            .times(1)
            .returning(|_, _| Ok(()));

        let mut manager = SessionManager::new(sink, TransferLimits::default());
        manager
            .accept_inbound(laptop(), readable(&payload.encode()))
            .unwrap();
        assert!(manager.has_inbound(&laptop()));

        let status = manager.handle_inbound_event(&laptop(), StreamEvent::HasBytesAvailable);
        assert_eq!(status, TransferStatus::Finished);
        assert!(manager.is_idle());
        assert_eq!(manager.stats().items_received, 2);
        assert_eq!(manager.stats().payloads_delivered, 1);
    }

    #[test]
    fn test_second_inbound_for_same_peer_rejected() {
        let mut sink = MockClipboardSink::new();
        sink.expect_deliver().times(1).returning(|_, _| Ok(()));

        let mut manager = SessionManager::new(sink, TransferLimits::default());
        let encoded = two_item_payload().encode();

        // First transfer has only part of its bytes so far
        manager
            .accept_inbound(laptop(), readable(&encoded[..5]))
            .unwrap();
        assert_eq!(
            manager.handle_inbound_event(&laptop(), StreamEvent::HasBytesAvailable),
            TransferStatus::Active
        );

        let second = manager.accept_inbound(laptop(), readable(&encoded));
        assert!(matches!(
            second,
            Err(ClipboardError::TransferAlreadyActive {
                direction: Direction::Inbound,
                ..
            })
        ));
        assert_eq!(manager.stats().rejected, 1);
        assert_eq!(manager.active_transfers(), 1);

        // The first transfer is unaffected and still ends normally
        assert_eq!(
            manager.handle_inbound_event(&laptop(), StreamEvent::EndEncountered),
            TransferStatus::Finished
        );
        assert!(manager.is_idle());
    }

    #[test]
    fn test_premature_end_delivers_complete_items() {
        let payload = two_item_payload();
        let encoded = payload.encode();
        let cut = payload.items()[0].encoded_len() + 12;

        let mut sink = MockClipboardSink::new();
        sink.expect_deliver()
            .withf(|_, delivered| delivered.len() == 1)
            .times(1)
            .returning(|_, _| Ok(()));

        let mut manager = SessionManager::new(sink, TransferLimits::default());
        manager
            .accept_inbound(laptop(), readable(&encoded[..cut]))
            .unwrap();
        manager.handle_inbound_event(&laptop(), StreamEvent::HasBytesAvailable);

        assert_eq!(
            manager.handle_inbound_event(&laptop(), StreamEvent::EndEncountered),
            TransferStatus::Finished
        );
        // Events after the end have no transfer to reach
        assert_eq!(
            manager.handle_inbound_event(&laptop(), StreamEvent::HasBytesAvailable),
            TransferStatus::Finished
        );
    }

    #[test]
    fn test_outbound_guard_and_completion() {
        let sink = MockClipboardSink::new();
        let mut manager = SessionManager::new(sink, TransferLimits::default());
        let payload = two_item_payload();

        let status = manager
            .send_payload(&payload, laptop(), MemoryStream::new().with_write_capacity(8))
            .unwrap();
        assert_eq!(status, TransferStatus::Active);

        let second = manager.send_payload(&payload, laptop(), MemoryStream::new());
        assert!(matches!(
            second,
            Err(ClipboardError::TransferAlreadyActive {
                direction: Direction::Outbound,
                ..
            })
        ));

        // Inbound and outbound for one peer are independent
        manager
            .accept_inbound(laptop(), MemoryStream::new())
            .unwrap();
        assert_eq!(manager.active_transfers(), 2);

        let mut rounds = 0;
        while manager.handle_outbound_event(&laptop(), StreamEvent::HasSpaceAvailable)
            == TransferStatus::Active
        {
            rounds += 1;
            assert!(rounds < 100);
        }
        assert!(!manager.has_outbound(&laptop()));
        assert!(manager.has_inbound(&laptop()));
        assert_eq!(manager.stats().outbound_finished, 1);
    }

    #[test]
    fn test_source_failure_ends_immediately() {
        struct BrokenSource;
        impl ClipboardSource for BrokenSource {
            fn read_items(&mut self) -> Result<Vec<Item>> {
                Err(ClipboardError::SerializationFault(
                    "representation vanished".to_string(),
                ))
            }
        }

        let mut manager = SessionManager::new(MockClipboardSink::new(), TransferLimits::default());
        let status = manager
            .send_from_source(&mut BrokenSource, laptop(), MemoryStream::new())
            .unwrap();

        assert_eq!(status, TransferStatus::Finished);
        assert!(manager.is_idle());
        assert_eq!(manager.stats().outbound_finished, 1);
    }

    #[test]
    fn test_sink_failure_still_clears_peer() {
        let mut sink = MockClipboardSink::new();
        sink.expect_deliver()
            .times(1)
            .returning(|_, _| Err(ClipboardError::Backend("disk full".to_string())));

        let mut manager = SessionManager::new(sink, TransferLimits::default());
        manager.accept_inbound(laptop(), readable(&[0x00])).unwrap();
        manager.handle_inbound_event(&laptop(), StreamEvent::HasBytesAvailable);

        assert!(manager.is_idle());
        assert_eq!(manager.stats().payloads_delivered, 0);
        assert_eq!(manager.stats().inbound_finished, 1);
    }
}
