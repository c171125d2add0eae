//! Inbound Transfer
//!
//! Reconstructs a payload from bytes that arrive in arbitrary chunks.
//!
//! # State Machine
//!
//! ```text
//!                 ┌──────────────────────────────────────────────┐
//!                 ▼                                              │
//! AwaitingRepCount ─► EvaluatingRepCount ─(0)─► Trap             │
//!                           │(n>0)                               │
//!                           ▼                                    │
//!                 ┌─► AwaitingTypeSize ─► AwaitingType           │
//!                 │                           │                  │
//!                 │   AwaitingData ◄─ AwaitingDataSize           │
//!                 │        │                                     │
//!                 │        ▼                                     │
//!                 └─(n>0) CheckingLoopCondition ─(0, item)───────┘
//! ```
//!
//! [`transition`] is a pure function of the current state and the buffered
//! bytes. [`InboundDecoder::step`] calls it until it stalls, evicting exactly
//! the bytes each transition consumed, so a field is never partially consumed
//! and the sequence of emitted items does not depend on how the input was
//! split.

use crate::clipboard::error::{
    is_wait_signal, log_transfer_fault, ClipboardError, Direction, Result,
};
use crate::clipboard::payload::{Item, Representation};
use crate::protocol::{self, ByteQueue};
use crate::transfer::stream::{DuplexStream, ReadOutcome, StreamEvent};
use crate::transfer::{TransferEvent, TransferLimits};
use tracing::{debug, trace};

/// Receive state machine states
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundState {
    /// Waiting for the representation count of the next item
    AwaitingRepCount,
    /// Count read; deciding between item and sentinel
    EvaluatingRepCount {
        /// Representation count just read
        count: u8,
    },
    /// Waiting for the type tag length
    AwaitingTypeSize {
        /// Representations left in the current item
        remaining: u8,
    },
    /// Waiting for the type tag bytes
    AwaitingType {
        /// Representations left in the current item
        remaining: u8,
        /// Type tag length in bytes
        size: usize,
    },
    /// Waiting for the data length
    AwaitingDataSize {
        /// Representations left in the current item
        remaining: u8,
        /// Type tag of the representation being read
        type_tag: String,
    },
    /// Waiting for the representation data
    AwaitingData {
        /// Representations left in the current item
        remaining: u8,
        /// Type tag of the representation being read
        type_tag: String,
        /// Data length in bytes
        size: usize,
    },
    /// One representation finished; item done or more to read
    CheckingLoopCondition {
        /// Representations left in the current item
        remaining: u8,
    },
    /// Terminal, absorbing state
    Trap,
}

/// Side effect of a transition, applied by the decoder
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Evict the consumed bytes and move on
    None,
    /// The consumed bytes are the data of a representation with this tag
    Representation(String),
    /// The accumulated representations form a complete item
    ItemComplete,
}

/// A fired transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    /// State after the transition
    pub next: InboundState,
    /// Bytes to evict from the front of the buffer
    pub consumed: usize,
    /// Effect to apply
    pub effect: Effect,
}

/// Result of attempting a transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// No transition is eligible until more bytes arrive
    Stalled(InboundState),
    /// A transition fired
    Advanced(Transition),
}

fn advance(next: InboundState, consumed: usize, effect: Effect) -> Step {
    Step::Advanced(Transition {
        next,
        consumed,
        effect,
    })
}

fn field_len(value: u64, limit: usize, field: &str) -> Result<usize> {
    match usize::try_from(value) {
        Ok(len) if len <= limit => Ok(len),
        _ => Err(ClipboardError::ProtocolViolation(format!(
            "{} length {} exceeds limit {}",
            field, value, limit
        ))),
    }
}

/// Attempt one transition from `state` over the buffered `input`.
///
/// Never consumes a field that is not fully buffered. Fails only on protocol
/// violations (oversized length fields, type tags that are not UTF-8).
/// Decode errors that only mean "not buffered yet" stall instead.
pub fn transition(state: InboundState, input: &[u8], limits: &TransferLimits) -> Result<Step> {
    use InboundState::*;

    let step = match state {
        AwaitingRepCount => match protocol::decode_u8(input) {
            Ok((count, consumed)) => advance(EvaluatingRepCount { count }, consumed, Effect::None),
            Err(_) => Step::Stalled(AwaitingRepCount),
        },

        EvaluatingRepCount { count: 0 } => advance(Trap, 0, Effect::None),
        EvaluatingRepCount { count } => advance(
            AwaitingTypeSize { remaining: count },
            0,
            Effect::None,
        ),

        AwaitingTypeSize { remaining } => match protocol::decode_u64_be(input) {
            Ok((size, consumed)) => {
                let size = field_len(size, limits.max_type_tag_len, "Type tag")?;
                advance(AwaitingType { remaining, size }, consumed, Effect::None)
            }
            Err(_) => Step::Stalled(AwaitingTypeSize { remaining }),
        },

        AwaitingType { remaining, size } => match protocol::decode_utf8(input, size)
            .map_err(ClipboardError::from)
        {
            Ok((type_tag, consumed)) => advance(
                AwaitingDataSize {
                    remaining,
                    type_tag,
                },
                consumed,
                Effect::None,
            ),
            Err(e) if is_wait_signal(&e) => Step::Stalled(AwaitingType { remaining, size }),
            Err(e) => return Err(e),
        },

        AwaitingDataSize {
            remaining,
            type_tag,
        } => match protocol::decode_u64_be(input) {
            Ok((size, consumed)) => {
                let size = field_len(size, limits.max_representation_size, "Data")?;
                advance(
                    AwaitingData {
                        remaining,
                        type_tag,
                        size,
                    },
                    consumed,
                    Effect::None,
                )
            }
            Err(_) => Step::Stalled(AwaitingDataSize {
                remaining,
                type_tag,
            }),
        },

        AwaitingData {
            remaining,
            type_tag,
            size,
        } => {
            if input.len() < size {
                Step::Stalled(AwaitingData {
                    remaining,
                    type_tag,
                    size,
                })
            } else {
                advance(
                    CheckingLoopCondition {
                        remaining: remaining.saturating_sub(1),
                    },
                    size,
                    Effect::Representation(type_tag),
                )
            }
        }

        CheckingLoopCondition { remaining: 0 } => {
            advance(AwaitingRepCount, 0, Effect::ItemComplete)
        }
        CheckingLoopCondition { remaining } => {
            advance(AwaitingTypeSize { remaining }, 0, Effect::None)
        }

        Trap => Step::Stalled(Trap),
    };

    Ok(step)
}

/// Receive-side decoder: byte accumulator plus state machine.
///
/// Holds no stream. Callers [`feed`](Self::feed) bytes and
/// [`step`](Self::step) the machine.
#[derive(Debug)]
pub struct InboundDecoder {
    id: u64,
    state: InboundState,
    buffer: ByteQueue,
    current: Vec<Representation>,
    limits: TransferLimits,
    ended: bool,
    bytes_received: usize,
    items_completed: usize,
}

impl InboundDecoder {
    /// Create a decoder in `AwaitingRepCount`
    pub fn new(limits: TransferLimits) -> Self {
        Self {
            id: 0,
            state: InboundState::AwaitingRepCount,
            buffer: ByteQueue::with_capacity(limits.read_chunk_size),
            current: Vec::new(),
            limits,
            ended: false,
            bytes_received: 0,
            items_completed: 0,
        }
    }

    /// Tag log lines with the owning transfer's id
    pub fn with_id(mut self, id: u64) -> Self {
        self.id = id;
        self
    }

    /// Current state
    pub fn state(&self) -> &InboundState {
        &self.state
    }

    /// Whether `Ended` has been emitted
    pub fn is_finished(&self) -> bool {
        self.ended
    }

    /// Total bytes fed so far
    pub fn bytes_received(&self) -> usize {
        self.bytes_received
    }

    /// Items emitted so far
    pub fn items_completed(&self) -> usize {
        self.items_completed
    }

    /// Bytes buffered but not yet consumed
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Append newly read bytes. Ignored once the machine is trapped.
    pub fn feed(&mut self, bytes: &[u8]) {
        if self.state == InboundState::Trap {
            return;
        }
        self.bytes_received = self.bytes_received.saturating_add(bytes.len());
        if self.bytes_received > self.limits.max_payload_size {
            self.fault(ClipboardError::DataSizeExceeded(
                self.bytes_received,
                self.limits.max_payload_size,
            ));
            return;
        }
        self.buffer.append(bytes);
    }

    /// Fire every eligible transition, returning the events they produced
    pub fn step(&mut self) -> Vec<TransferEvent> {
        let mut events = Vec::new();

        loop {
            if self.state == InboundState::Trap {
                if !self.ended {
                    self.ended = true;
                    events.push(TransferEvent::Ended);
                }
                break;
            }

            let state = std::mem::replace(&mut self.state, InboundState::Trap);
            match transition(state, self.buffer.as_slice(), &self.limits) {
                Ok(Step::Stalled(state)) => {
                    self.state = state;
                    break;
                }
                Ok(Step::Advanced(t)) => {
                    trace!("Inbound transition -> {:?} ({} bytes)", t.next, t.consumed);
                    match t.effect {
                        Effect::None => self.buffer.consume(t.consumed),
                        Effect::Representation(type_tag) => {
                            let data = self.buffer.take(t.consumed);
                            self.current.push(Representation { type_tag, data });
                        }
                        Effect::ItemComplete => {
                            let representations = std::mem::take(&mut self.current);
                            match Item::new(representations) {
                                Ok(item) => {
                                    self.items_completed += 1;
                                    events.push(TransferEvent::ItemComplete(item));
                                }
                                Err(e) => {
                                    self.fault(e);
                                    continue;
                                }
                            }
                        }
                    }
                    self.state = t.next;
                }
                Err(e) => self.fault(e),
            }
        }

        events
    }

    /// Stream ended or failed: trap and emit `Ended` unless already done
    pub fn terminate(&mut self) -> Vec<TransferEvent> {
        if self.state != InboundState::Trap {
            debug!(
                "Inbound stream ended in {:?} after {} items",
                self.state, self.items_completed
            );
            self.trap();
        }
        self.step()
    }

    fn fault(&mut self, fault: ClipboardError) {
        log_transfer_fault(Direction::Inbound, self.id, &fault);
        self.trap();
    }

    fn trap(&mut self) {
        self.state = InboundState::Trap;
        self.buffer.clear();
        self.current.clear();
    }
}

/// Inbound transfer bound to one stream
#[derive(Debug)]
pub struct InboundTransfer<S> {
    id: u64,
    stream: S,
    decoder: InboundDecoder,
    read_chunk_size: usize,
    closed: bool,
}

impl<S: DuplexStream> InboundTransfer<S> {
    /// Create a transfer reading from `stream`
    pub fn new(id: u64, stream: S, limits: TransferLimits) -> Self {
        let read_chunk_size = limits.read_chunk_size.max(1);
        Self {
            id,
            stream,
            decoder: InboundDecoder::new(limits).with_id(id),
            read_chunk_size,
            closed: false,
        }
    }

    /// Transfer identifier
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Decoder state, for diagnostics
    pub fn decoder(&self) -> &InboundDecoder {
        &self.decoder
    }

    /// Whether the transfer has ended
    pub fn is_finished(&self) -> bool {
        self.decoder.is_finished()
    }

    /// Start the transfer. Nothing is read until the stream reports data.
    pub fn start(&mut self) -> Vec<TransferEvent> {
        debug!("Inbound transfer {} started", self.id);
        Vec::new()
    }

    /// Process one readiness notification
    pub fn handle_event(&mut self, event: StreamEvent) -> Vec<TransferEvent> {
        if self.decoder.is_finished() {
            return Vec::new();
        }

        let mut events = match event {
            StreamEvent::HasBytesAvailable => self.drain_readable(),
            StreamEvent::HasSpaceAvailable => Vec::new(),
            StreamEvent::EndEncountered => {
                debug!("Inbound transfer {}: end of stream", self.id);
                self.decoder.terminate()
            }
            StreamEvent::ErrorOccurred(e) => {
                let fault = ClipboardError::StreamFault(e);
                log_transfer_fault(Direction::Inbound, self.id, &fault);
                self.decoder.terminate()
            }
        };

        if self.decoder.is_finished() {
            self.close();
            if !events.contains(&TransferEvent::Ended) {
                events.push(TransferEvent::Ended);
            }
        }
        events
    }

    fn drain_readable(&mut self) -> Vec<TransferEvent> {
        let mut events = Vec::new();

        while !self.decoder.is_finished() {
            match self.stream.read(self.read_chunk_size) {
                Ok(ReadOutcome::Data(bytes)) => {
                    self.decoder.feed(&bytes);
                    events.extend(self.decoder.step());
                }
                Ok(ReadOutcome::Pending) => break,
                Ok(ReadOutcome::Eof) => {
                    debug!("Inbound transfer {}: peer closed stream", self.id);
                    events.extend(self.decoder.terminate());
                }
                Err(e) => {
                    let fault = ClipboardError::StreamFault(e);
                    log_transfer_fault(Direction::Inbound, self.id, &fault);
                    events.extend(self.decoder.terminate());
                }
            }
        }

        events
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.stream.close();
            debug!(
                "Inbound transfer {} closed: {} bytes, {} items",
                self.id,
                self.decoder.bytes_received(),
                self.decoder.items_completed()
            );
        }
    }
}
