//! Clipboard Error Types
//!
//! Error handling for payload construction, transfers and session bookkeeping.
//!
//! Transfer-level faults never reach the owner of a transfer as values: a
//! transfer that hits any of them ends with a single `Ended` notification and
//! the cause is logged. These types exist for logging, for the operations that
//! refuse to start, and for the collaborators around the core.

use crate::protocol::WireError;
use thiserror::Error;
use tracing::{debug, error, warn};

/// Result type for clipboard operations
pub type Result<T> = std::result::Result<T, ClipboardError>;

/// Transfer direction relative to this node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Peer is sending to us
    Inbound,
    /// We are sending to the peer
    Outbound,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Inbound => write!(f, "inbound"),
            Self::Outbound => write!(f, "outbound"),
        }
    }
}

/// Clipboard module error types
#[derive(Error, Debug)]
pub enum ClipboardError {
    /// Wire field could not be decoded
    #[error("Wire error: {0}")]
    Wire(#[from] WireError),

    /// Stream ended or failed mid-transfer
    #[error("Stream fault: {0}")]
    StreamFault(std::io::Error),

    /// Outbound payload could not be materialized
    #[error("Serialization failed: {0}")]
    SerializationFault(String),

    /// Peer sent a field we refuse to honor
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    /// A transfer in the same direction is already running for this peer
    #[error("{direction} transfer already active for peer {peer}")]
    TransferAlreadyActive {
        /// Peer identity
        peer: String,
        /// Direction of the rejected transfer
        direction: Direction,
    },

    /// Item representation count outside 1-255
    #[error("Item must carry 1-255 representations, got {0}")]
    InvalidItem(usize),

    /// Data size exceeds limit
    #[error("Data size {0} exceeds maximum allowed {1}")]
    DataSizeExceeded(usize, usize),

    /// Peer is not known to discovery
    #[error("Unknown peer: {0}")]
    UnknownPeer(String),

    /// Clipboard collaborator failed
    #[error("Clipboard backend error: {0}")]
    Backend(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Error classification used for log routing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorType {
    /// Buffered data does not yet hold a full field
    Truncated,
    /// Transport failures
    Stream,
    /// Outbound payload materialization
    Serialization,
    /// Malformed or hostile peer input
    Protocol,
    /// Operation refused by the session table
    Rejected,
    /// Payload model or size validation
    DataValidation,
    /// Discovery or clipboard collaborators
    Collaborator,
}

/// Classify error for logging and recovery decisions
pub fn classify_error(error: &ClipboardError) -> ErrorType {
    match error {
        ClipboardError::Wire(WireError::Truncated { .. }) => ErrorType::Truncated,
        ClipboardError::Wire(WireError::InvalidUtf8) | ClipboardError::ProtocolViolation(_) => {
            ErrorType::Protocol
        }

        ClipboardError::StreamFault(_) | ClipboardError::Io(_) => ErrorType::Stream,

        ClipboardError::SerializationFault(_) => ErrorType::Serialization,

        ClipboardError::TransferAlreadyActive { .. } => ErrorType::Rejected,

        ClipboardError::InvalidItem(_) | ClipboardError::DataSizeExceeded(_, _) => {
            ErrorType::DataValidation
        }

        ClipboardError::UnknownPeer(_) | ClipboardError::Backend(_) => ErrorType::Collaborator,
    }
}

/// Whether the error is the normal "wait for more data" signal
pub fn is_wait_signal(error: &ClipboardError) -> bool {
    classify_error(error) == ErrorType::Truncated
}

/// Log a fault that ended transfer `id`, at the level its class calls for
pub fn log_transfer_fault(direction: Direction, id: u64, fault: &ClipboardError) {
    match classify_error(fault) {
        ErrorType::Truncated => debug!("{} transfer {}: {}", direction, id, fault),
        ErrorType::Stream => warn!("{} transfer {}: {}", direction, id, fault),
        ErrorType::Protocol | ErrorType::DataValidation => {
            warn!("{} transfer {}: rejecting peer input: {}", direction, id, fault)
        }
        ErrorType::Serialization => error!("{} transfer {}: {}", direction, id, fault),
        ErrorType::Rejected | ErrorType::Collaborator => {
            warn!("{} transfer {} refused: {}", direction, id, fault)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        let error = ClipboardError::Wire(WireError::Truncated {
            needed: 8,
            available: 3,
        });
        assert_eq!(classify_error(&error), ErrorType::Truncated);
        assert!(is_wait_signal(&error));

        let error = ClipboardError::Wire(WireError::InvalidUtf8);
        assert_eq!(classify_error(&error), ErrorType::Protocol);

        let error = ClipboardError::StreamFault(std::io::ErrorKind::ConnectionReset.into());
        assert_eq!(classify_error(&error), ErrorType::Stream);
        assert!(!is_wait_signal(&error));

        let error = ClipboardError::SerializationFault("gone".to_string());
        assert_eq!(classify_error(&error), ErrorType::Serialization);

        let error = ClipboardError::TransferAlreadyActive {
            peer: "laptop".to_string(),
            direction: Direction::Inbound,
        };
        assert_eq!(classify_error(&error), ErrorType::Rejected);

        let error = ClipboardError::InvalidItem(0);
        assert_eq!(classify_error(&error), ErrorType::DataValidation);
    }

    #[test]
    fn test_error_display() {
        let error = ClipboardError::TransferAlreadyActive {
            peer: "laptop".to_string(),
            direction: Direction::Outbound,
        };
        assert_eq!(
            error.to_string(),
            "outbound transfer already active for peer laptop"
        );

        assert_eq!(
            ClipboardError::DataSizeExceeded(20, 10).to_string(),
            "Data size 20 exceeds maximum allowed 10"
        );

        let error = ClipboardError::StreamFault(std::io::Error::new(
            std::io::ErrorKind::BrokenPipe,
            "peer went away",
        ));
        assert_eq!(error.to_string(), "Stream fault: peer went away");
    }
}
