//! Growable byte queue for incremental decoding

use bytes::{Buf, Bytes, BytesMut};

/// Byte accumulator fed by stream reads and drained by the decoder.
///
/// Consumed prefixes are evicted by advancing the underlying [`BytesMut`], so
/// eviction never shifts the remaining bytes.
#[derive(Debug, Default)]
pub struct ByteQueue {
    inner: BytesMut,
}

impl ByteQueue {
    /// Create an empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty queue with reserved capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: BytesMut::with_capacity(capacity),
        }
    }

    /// Append newly read bytes
    pub fn append(&mut self, bytes: &[u8]) {
        self.inner.extend_from_slice(bytes);
    }

    /// View everything buffered without consuming it
    pub fn as_slice(&self) -> &[u8] {
        &self.inner
    }

    /// Evict `n` bytes from the front.
    ///
    /// Callers only consume fields they have confirmed are fully buffered.
    pub fn consume(&mut self, n: usize) {
        debug_assert!(n <= self.inner.len(), "consume past end of queue");
        self.inner.advance(n.min(self.inner.len()));
    }

    /// Split off the first `n` bytes without copying
    pub fn take(&mut self, n: usize) -> Bytes {
        self.inner.split_to(n.min(self.inner.len())).freeze()
    }

    /// Number of buffered bytes
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Whether the queue is empty
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Drop everything buffered
    pub fn clear(&mut self) {
        self.inner.clear();
    }
}
