//! Clipboard Payload Model
//!
//! The in-memory representation of what gets transferred, plus the seams to
//! whatever owns the real clipboard.
//!
//! # Model
//!
//! ```text
//! Payload
//!   └─> Item (1..=255 representations, one clipboard entry)
//!         └─> Representation (type tag, opaque bytes)
//! ```
//!
//! Type tags are free-form UTF-8 strings ("public.utf8-plain-text",
//! "text/html", ...). Nothing here interprets them or converts between them.
//!
//! # Collaborators
//!
//! - [`ClipboardSink`] - Receives completed payloads
//! - [`ClipboardSource`] - Supplies items to send

pub mod error;
pub mod payload;
pub mod sink;

pub use error::{classify_error, ClipboardError, Direction, ErrorType, Result};
pub use payload::{Item, Payload, Representation};
pub use sink::{
    ArgumentSource, ChannelSink, ClipboardSink, ClipboardSource, SourceData, SourceEntry,
    SpoolClipboard,
};
