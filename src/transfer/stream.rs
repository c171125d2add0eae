//! Non-blocking duplex stream abstraction
//!
//! Transfers never touch sockets directly. They are handed a [`DuplexStream`]
//! and driven by [`StreamEvent`]s delivered by whatever owns the event loop.

use bytes::Bytes;
use std::collections::VecDeque;
use std::io;

/// Outcome of a best-effort read
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    /// Bytes were available (never empty)
    Data(Bytes),
    /// Nothing available right now
    Pending,
    /// Peer closed its write side
    Eof,
}

/// Readiness notification for a stream
#[derive(Debug)]
pub enum StreamEvent {
    /// Data is available to read
    HasBytesAvailable,
    /// The stream can accept more bytes
    HasSpaceAvailable,
    /// The peer closed the stream
    EndEncountered,
    /// The stream failed
    ErrorOccurred(io::Error),
}

/// Duplex byte stream with synchronous, never-blocking operations
pub trait DuplexStream {
    /// Read up to `max` bytes
    fn read(&mut self, max: usize) -> io::Result<ReadOutcome>;

    /// Write as many bytes as the stream accepts right now.
    ///
    /// Returns 0 when the stream would block.
    fn write(&mut self, buf: &[u8]) -> io::Result<usize>;

    /// Close the stream; further reads and writes fail
    fn close(&mut self);
}

impl<S: DuplexStream + ?Sized> DuplexStream for Box<S> {
    fn read(&mut self, max: usize) -> io::Result<ReadOutcome> {
        (**self).read(max)
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        (**self).write(buf)
    }

    fn close(&mut self) {
        (**self).close()
    }
}

/// In-memory stream for tests and in-process loopback.
///
/// Reads are served from queued chunks. Writes land in a sink whose capacity
/// can be limited to exercise backpressure: once the budget is spent a write
/// returns 0, and the budget is refilled for the next writable round.
#[derive(Debug, Default)]
pub struct MemoryStream {
    incoming: VecDeque<Bytes>,
    eof: bool,
    written: Vec<u8>,
    write_capacity: Option<usize>,
    write_budget: usize,
    write_error: Option<io::ErrorKind>,
    closed: bool,
}

impl MemoryStream {
    /// Create an empty stream
    pub fn new() -> Self {
        Self::default()
    }

    /// Limit how many bytes are accepted per writable round
    pub fn with_write_capacity(mut self, capacity: usize) -> Self {
        self.write_capacity = Some(capacity);
        self.write_budget = capacity;
        self
    }

    /// Queue bytes for a later read
    pub fn push_incoming(&mut self, bytes: impl Into<Bytes>) {
        let bytes = bytes.into();
        if !bytes.is_empty() {
            self.incoming.push_back(bytes);
        }
    }

    /// Report end-of-stream once the queued bytes are drained
    pub fn set_eof(&mut self) {
        self.eof = true;
    }

    /// Make every subsequent write fail with `kind`
    pub fn fail_writes(&mut self, kind: io::ErrorKind) {
        self.write_error = Some(kind);
    }

    /// Everything written so far
    pub fn written(&self) -> &[u8] {
        &self.written
    }

    /// Whether `close` was called
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl DuplexStream for MemoryStream {
    fn read(&mut self, max: usize) -> io::Result<ReadOutcome> {
        if self.closed {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "stream closed"));
        }
        let Some(mut chunk) = self.incoming.pop_front() else {
            return Ok(if self.eof {
                ReadOutcome::Eof
            } else {
                ReadOutcome::Pending
            });
        };
        if chunk.len() > max {
            let rest = chunk.split_off(max);
            self.incoming.push_front(rest);
        }
        Ok(ReadOutcome::Data(chunk))
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.closed {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "stream closed"));
        }
        if let Some(kind) = self.write_error {
            return Err(io::Error::new(kind, "injected write failure"));
        }
        let n = match self.write_capacity {
            None => buf.len(),
            Some(capacity) => {
                if self.write_budget == 0 {
                    self.write_budget = capacity;
                    return Ok(0);
                }
                let n = self.write_budget.min(buf.len());
                self.write_budget -= n;
                n
            }
        };
        self.written.extend_from_slice(&buf[..n]);
        Ok(n)
    }

    fn close(&mut self) {
        self.closed = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_stream_reads_in_order() {
        let mut stream = MemoryStream::new();
        stream.push_incoming(vec![1, 2, 3, 4]);
        stream.push_incoming(vec![5]);
        stream.set_eof();

        assert_eq!(
            stream.read(3).unwrap(),
            ReadOutcome::Data(Bytes::from_static(&[1, 2, 3]))
        );
        assert_eq!(
            stream.read(8).unwrap(),
            ReadOutcome::Data(Bytes::from_static(&[4]))
        );
        assert_eq!(
            stream.read(8).unwrap(),
            ReadOutcome::Data(Bytes::from_static(&[5]))
        );
        assert_eq!(stream.read(8).unwrap(), ReadOutcome::Eof);
    }

    #[test]
    fn test_memory_stream_partial_writes() {
        let mut stream = MemoryStream::new().with_write_capacity(2);
        assert_eq!(stream.write(b"hello").unwrap(), 2);
        // Budget spent: would block, then refilled for the next round
        assert_eq!(stream.write(b"llo").unwrap(), 0);
        assert_eq!(stream.write(b"llo").unwrap(), 2);
        assert_eq!(stream.written(), b"hell");

        stream.close();
        assert!(stream.write(b"o").is_err());
        assert!(stream.is_closed());
    }
}
