//! Outbound Transfer
//!
//! Flattens a payload into one wire-format blob before anything is written,
//! then drains it through the stream as writable events arrive. Payloads are
//! clipboard-sized, so holding the whole blob is acceptable.

use crate::clipboard::error::{log_transfer_fault, ClipboardError, Direction, Result};
use crate::clipboard::payload::{Item, Payload};
use crate::transfer::stream::{DuplexStream, StreamEvent};
use crate::transfer::{TransferEvent, TransferLimits};
use bytes::Bytes;
use std::io;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Serialize a payload, sentinel included.
///
/// Enforces the same limits a receiving peer applies, so a payload the peer
/// would refuse fails here instead of being silently truncated there.
pub fn serialize(payload: &Payload, limits: &TransferLimits) -> Result<Bytes> {
    check_size("Payload", payload.encoded_len(), limits.max_payload_size)?;
    for rep in payload.items().iter().flat_map(Item::representations) {
        check_size("Type tag", rep.type_tag.len(), limits.max_type_tag_len)?;
        check_size("Representation", rep.data.len(), limits.max_representation_size)?;
    }
    Ok(payload.encode())
}

fn check_size(field: &str, len: usize, limit: usize) -> Result<()> {
    if len > limit {
        return Err(ClipboardError::SerializationFault(format!(
            "{} too large: {}",
            field,
            ClipboardError::DataSizeExceeded(len, limit)
        )));
    }
    Ok(())
}

/// Outbound transfer bound to one stream
#[derive(Debug)]
pub struct OutboundTransfer<S> {
    id: u64,
    stream: S,
    blob: Option<Bytes>,
    cursor: usize,
    ended: bool,
    started_at: Instant,
}

impl<S: DuplexStream> OutboundTransfer<S> {
    /// Serialize `payload` and bind it to `stream`.
    ///
    /// A payload that cannot be serialized still yields a transfer: it ends
    /// on [`start`](Self::start) without writing anything.
    pub fn new(id: u64, payload: &Payload, stream: S, limits: &TransferLimits) -> Self {
        match serialize(payload, limits) {
            Ok(blob) => {
                debug!(
                    "Outbound transfer {}: {} items, {} bytes, digest {}",
                    id,
                    payload.len(),
                    blob.len(),
                    payload.digest()
                );
                Self::with_blob(id, Some(blob), stream)
            }
            Err(e) => Self::failed(id, stream, e),
        }
    }

    /// Create a transfer whose payload could not be captured
    pub fn failed(id: u64, stream: S, error: ClipboardError) -> Self {
        log_transfer_fault(Direction::Outbound, id, &error);
        Self::with_blob(id, None, stream)
    }

    fn with_blob(id: u64, blob: Option<Bytes>, stream: S) -> Self {
        Self {
            id,
            stream,
            blob,
            cursor: 0,
            ended: false,
            started_at: Instant::now(),
        }
    }

    /// Transfer identifier
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Whether `Ended` has been emitted
    pub fn is_finished(&self) -> bool {
        self.ended
    }

    /// Bytes accepted by the stream so far
    pub fn bytes_written(&self) -> usize {
        self.cursor
    }

    /// Serialized size, zero if serialization failed
    pub fn total_bytes(&self) -> usize {
        self.blob.as_ref().map_or(0, Bytes::len)
    }

    /// Progress percentage (0-100)
    pub fn percentage(&self) -> f64 {
        let total = self.total_bytes();
        if total == 0 {
            return 100.0;
        }
        (self.cursor as f64 / total as f64) * 100.0
    }

    /// Start the transfer.
    ///
    /// Ends immediately if serialization failed; otherwise waits for the
    /// stream to report space.
    pub fn start(&mut self) -> Vec<TransferEvent> {
        self.started_at = Instant::now();
        if self.blob.is_none() {
            return self.finish();
        }
        debug!("Outbound transfer {} started", self.id);
        Vec::new()
    }

    /// Process one readiness notification
    pub fn handle_event(&mut self, event: StreamEvent) -> Vec<TransferEvent> {
        if self.ended {
            return Vec::new();
        }

        match event {
            StreamEvent::HasSpaceAvailable => self.drain_writable(),
            StreamEvent::HasBytesAvailable => Vec::new(),
            StreamEvent::EndEncountered if self.is_complete() => self.finish(),
            StreamEvent::EndEncountered => self.abort(ClipboardError::StreamFault(
                io::Error::new(io::ErrorKind::UnexpectedEof, "peer closed the stream"),
            )),
            StreamEvent::ErrorOccurred(e) => self.abort(ClipboardError::StreamFault(e)),
        }
    }

    fn abort(&mut self, fault: ClipboardError) -> Vec<TransferEvent> {
        log_transfer_fault(Direction::Outbound, self.id, &fault);
        warn!(
            "Outbound transfer {} stopped at {:.1}% ({}/{} bytes)",
            self.id,
            self.percentage(),
            self.cursor,
            self.total_bytes()
        );
        self.finish()
    }

    fn is_complete(&self) -> bool {
        self.blob
            .as_ref()
            .is_some_and(|blob| self.cursor >= blob.len())
    }

    fn drain_writable(&mut self) -> Vec<TransferEvent> {
        let Some(blob) = self.blob.clone() else {
            return self.finish();
        };

        while self.cursor < blob.len() {
            match self.stream.write(&blob[self.cursor..]) {
                Ok(0) => return Vec::new(),
                Ok(n) => self.cursor += n,
                Err(e) => return self.abort(ClipboardError::StreamFault(e)),
            }
        }

        info!(
            "Outbound transfer {} completed: {} bytes in {:?}",
            self.id,
            blob.len(),
            self.started_at.elapsed()
        );
        self.finish()
    }

    fn finish(&mut self) -> Vec<TransferEvent> {
        if self.ended {
            return Vec::new();
        }
        self.ended = true;
        self.stream.close();
        vec![TransferEvent::Ended]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clipboard::payload::{Item, Representation};
    use crate::transfer::stream::MemoryStream;

    fn sample_payload() -> Payload {
        Payload::new(vec![
            Item::new(vec![
                Representation::new("public.utf8-plain-text", "clipboard"),
                Representation::new("public.html", "<b>clipboard</b>"),
            ])
            .unwrap(),
            Item::single("public.png", vec![0u8; 300]),
        ])
    }

    #[test]
    fn test_drains_through_partial_writes() {
        let payload = sample_payload();
        let stream = MemoryStream::new().with_write_capacity(7);
        let mut transfer = OutboundTransfer::new(1, &payload, stream, &TransferLimits::default());
        assert!(transfer.start().is_empty());

        let mut ended = 0;
        let mut events_seen = 0;
        while !transfer.is_finished() {
            let events = transfer.handle_event(StreamEvent::HasSpaceAvailable);
            ended += events.len();
            events_seen += 1;
            assert!(events_seen < 1000, "transfer never finished");
        }

        assert_eq!(ended, 1);
        assert_eq!(transfer.stream.written(), &payload.encode()[..]);
        assert!(transfer.stream.is_closed());
        assert_eq!(transfer.percentage(), 100.0);
    }

    #[test]
    fn test_single_writable_event_drains_everything() {
        let payload = sample_payload();
        let mut transfer = OutboundTransfer::new(
            2,
            &payload,
            MemoryStream::new(),
            &TransferLimits::default(),
        );
        transfer.start();

        assert_eq!(
            transfer.handle_event(StreamEvent::HasSpaceAvailable),
            vec![TransferEvent::Ended]
        );
        assert_eq!(transfer.bytes_written(), payload.encoded_len());
        assert!(transfer
            .handle_event(StreamEvent::HasSpaceAvailable)
            .is_empty());
    }

    #[test]
    fn test_empty_payload_writes_sentinel() {
        let mut transfer = OutboundTransfer::new(
            3,
            &Payload::default(),
            MemoryStream::new(),
            &TransferLimits::default(),
        );
        transfer.start();
        transfer.handle_event(StreamEvent::HasSpaceAvailable);
        assert_eq!(transfer.stream.written(), &[0x00]);
    }

    #[test]
    fn test_peer_close_mid_drain_ends_once() {
        let stream = MemoryStream::new().with_write_capacity(4);
        let mut transfer =
            OutboundTransfer::new(4, &sample_payload(), stream, &TransferLimits::default());
        transfer.start();

        assert!(transfer
            .handle_event(StreamEvent::HasSpaceAvailable)
            .is_empty());
        assert_eq!(
            transfer.handle_event(StreamEvent::EndEncountered),
            vec![TransferEvent::Ended]
        );
        assert!(transfer
            .handle_event(StreamEvent::ErrorOccurred(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "pipe",
            )))
            .is_empty());
        assert_eq!(transfer.bytes_written(), 4);
    }

    #[test]
    fn test_write_error_ends_transfer() {
        let mut stream = MemoryStream::new();
        stream.fail_writes(std::io::ErrorKind::BrokenPipe);
        let mut transfer =
            OutboundTransfer::new(5, &sample_payload(), stream, &TransferLimits::default());
        transfer.start();

        assert_eq!(
            transfer.handle_event(StreamEvent::HasSpaceAvailable),
            vec![TransferEvent::Ended]
        );
        assert!(transfer.is_finished());
    }

    #[test]
    fn test_serialization_failure_ends_on_start() {
        let limits = TransferLimits {
            max_payload_size: 16,
            ..Default::default()
        };
        let mut transfer = OutboundTransfer::new(6, &sample_payload(), MemoryStream::new(), &limits);

        assert_eq!(transfer.start(), vec![TransferEvent::Ended]);
        assert!(transfer.stream.written().is_empty());
        assert!(transfer.stream.is_closed());
        assert!(transfer
            .handle_event(StreamEvent::HasSpaceAvailable)
            .is_empty());
    }

    #[test]
    fn test_serialize_rejects_what_a_peer_would_refuse() {
        let limits = TransferLimits::default();
        let long_tag = Payload::new(vec![Item::single("t".repeat(5000), "x")]);
        assert!(matches!(
            serialize(&long_tag, &limits),
            Err(ClipboardError::SerializationFault(_))
        ));

        let mut transfer = OutboundTransfer::new(7, &long_tag, MemoryStream::new(), &limits);
        assert_eq!(transfer.start(), vec![TransferEvent::Ended]);
        assert!(transfer.stream.written().is_empty());

        let small = TransferLimits {
            max_representation_size: 8,
            ..Default::default()
        };
        let big_data = Payload::new(vec![Item::single("public.png", vec![0u8; 9])]);
        assert!(serialize(&big_data, &small).is_err());
        let at_limit = Payload::new(vec![Item::single("public.png", vec![0u8; 8])]);
        assert!(serialize(&at_limit, &small).is_ok());

        // Whatever serializes under a limit set decodes under the same set
        let encoded = serialize(&at_limit, &small).unwrap();
        let mut decoder = crate::transfer::InboundDecoder::new(small);
        decoder.feed(&encoded);
        assert_eq!(
            decoder.step(),
            vec![
                TransferEvent::ItemComplete(at_limit.items()[0].clone()),
                TransferEvent::Ended
            ]
        );
    }

    #[test]
    fn test_serialize_size_limit() {
        let limits = TransferLimits {
            max_payload_size: 1,
            ..Default::default()
        };
        assert!(serialize(&Payload::default(), &limits).is_ok());
        assert!(matches!(
            serialize(&sample_payload(), &limits),
            Err(ClipboardError::SerializationFault(_))
        ));
    }
}
