use crate::core::repr::EthernetAddress;
use crate::{
    Error,
    Result,
};

/// A transmit or receive buffer checked out of a `BufferPool`.
///
/// The buffer remembers which interface it belongs to by hardware address so
/// it can only be returned to the pool it came from.
#[derive(Debug)]
pub struct PacketBuffer {
    data: Vec<u8>,
    len: usize,
    owner: EthernetAddress,
}

impl PacketBuffer {
    /// Returns the number of bytes that can be written to the buffer.
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Returns the length of the frame held by the buffer.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Sets the length of the frame held by the buffer.
    ///
    /// # Panics
    ///
    /// Panics if len exceeds the capacity of the buffer.
    pub fn set_len(&mut self, len: usize) {
        assert!(len <= self.data.len(), "frame exceeds packet buffer");
        self.len = len;
    }

    /// Sets the frame length and returns the frame for writing.
    pub fn frame_mut(&mut self, len: usize) -> &mut [u8] {
        self.set_len(len);
        &mut self.data[.. len]
    }

    fn zero(&mut self) {
        for byte in self.data.iter_mut() {
            *byte = 0;
        }
        self.len = 0;
    }
}

impl AsRef<[u8]> for PacketBuffer {
    fn as_ref(&self) -> &[u8] {
        &self.data[.. self.len]
    }
}

impl AsMut<[u8]> for PacketBuffer {
    fn as_mut(&mut self) -> &mut [u8] {
        &mut self.data[.. self.len]
    }
}

/// A free list of packet buffers sized for one interface.
///
/// Buffers are allocated on demand and recycled on `put`. The pool is bounded
/// only by `max_buffers`, if any, and by the heap.
#[derive(Debug)]
pub struct BufferPool {
    free: Vec<PacketBuffer>,
    buffer_len: usize,
    max_buffers: Option<usize>,
    outstanding: usize,
    owner: EthernetAddress,
}

impl BufferPool {
    /// Creates a pool of buffers with buffer_len bytes each.
    pub fn new(owner: EthernetAddress, buffer_len: usize, max_buffers: Option<usize>) -> BufferPool {
        BufferPool {
            free: Vec::new(),
            buffer_len,
            max_buffers,
            outstanding: 0,
            owner,
        }
    }

    /// Returns the capacity of each buffer.
    pub fn buffer_len(&self) -> usize {
        self.buffer_len
    }

    /// Returns the number of buffers checked out of the pool.
    pub fn outstanding(&self) -> usize {
        self.outstanding
    }

    /// Returns the number of buffers waiting on the free list.
    pub fn free_len(&self) -> usize {
        self.free.len()
    }

    /// Checks out a zeroed buffer, allocating one if the free list is empty.
    pub fn get(&mut self) -> Result<PacketBuffer> {
        if let Some(max_buffers) = self.max_buffers {
            if self.outstanding >= max_buffers {
                return Err(Error::Exhausted);
            }
        }

        let buffer = match self.free.pop() {
            Some(mut buffer) => {
                buffer.zero();
                buffer
            }
            None => {
                let mut data = Vec::new();
                data.try_reserve_exact(self.buffer_len)
                    .map_err(|_| Error::Exhausted)?;
                data.resize(self.buffer_len, 0);
                PacketBuffer {
                    data,
                    len: 0,
                    owner: self.owner,
                }
            }
        };

        self.outstanding += 1;
        Ok(buffer)
    }

    /// Zeroes a buffer and returns it to the free list.
    ///
    /// # Panics
    ///
    /// Panics if the buffer was checked out of a different pool.
    pub fn put(&mut self, mut buffer: PacketBuffer) {
        assert_eq!(buffer.owner, self.owner, "buffer returned to the wrong pool");
        assert!(self.outstanding > 0, "more buffers returned than checked out");

        buffer.zero();
        self.outstanding -= 1;
        self.free.push(buffer);
    }
}
