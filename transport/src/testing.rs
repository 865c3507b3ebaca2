//! In-memory transport for tests.

use tokio::io::{duplex, DuplexStream};

/// A connected pair of in-memory byte streams. Bytes written on one side's
/// writer arrive at the other side's reader, like a child process's stdio
/// pair without the child.
pub struct MemoryTransport {
    pub read: DuplexStream,
    pub write: DuplexStream,
}

impl MemoryTransport {
    pub fn pair() -> (Self, Self) {
        Self::pair_with_buffer_size(64 * 1024)
    }

    /// Smaller buffers are useful for exercising backpressure.
    pub fn pair_with_buffer_size(buffer_size: usize) -> (Self, Self) {
        let (a_to_b_write, a_to_b_read) = duplex(buffer_size);
        let (b_to_a_write, b_to_a_read) = duplex(buffer_size);

        let a = MemoryTransport {
            read: b_to_a_read,
            write: a_to_b_write,
        };
        let b = MemoryTransport {
            read: a_to_b_read,
            write: b_to_a_write,
        };
        (a, b)
    }

    pub fn into_split(self) -> (DuplexStream, DuplexStream) {
        (self.read, self.write)
    }
}
