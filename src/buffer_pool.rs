//! Fixed pool of reusable datagram buffers.
//!
//! Generalizes the audio sample ring used to hand PCM between the
//! transmitter and receiver threads of the reference input stream into a
//! pool of `max_datagram`-sized byte buffers: the socket reader checks one
//! out, receives into it, hands it to the parser, then returns it instead of
//! allocating per packet.

use ringbuf::{
    traits::{Consumer, Observer, Producer},
    HeapRb,
};

pub struct BufferPool {
    free: HeapRb<Box<[u8]>>,
    buf_size: usize,
}

impl BufferPool {
    pub fn new(count: usize, buf_size: usize) -> Self {
        let free = HeapRb::new(count);
        let mut pool = Self { free, buf_size };
        for _ in 0..count {
            let _ = pool.free.try_push(vec![0u8; buf_size].into_boxed_slice());
        }
        pool
    }

    /// Check out a buffer, allocating a fresh one if the pool is momentarily
    /// exhausted (e.g. a burst of datagrams larger than `recv_buffers`).
    pub fn acquire(&mut self) -> Box<[u8]> {
        self.free
            .try_pop()
            .unwrap_or_else(|| vec![0u8; self.buf_size].into_boxed_slice())
    }

    /// Return a buffer to the pool. Dropped silently if the pool is full.
    pub fn release(&mut self, buf: Box<[u8]>) {
        let _ = self.free.try_push(buf);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recycles_buffers() {
        let mut pool = BufferPool::new(4, 4096);
        let buf = pool.acquire();
        assert_eq!(buf.len(), 4096);
        pool.release(buf);
        assert_eq!(pool.free.occupied_len(), 4);
    }

    #[test]
    fn grows_past_capacity_rather_than_blocking() {
        let mut pool = BufferPool::new(1, 16);
        let a = pool.acquire();
        let b = pool.acquire();
        assert_eq!(a.len(), 16);
        assert_eq!(b.len(), 16);
    }
}
