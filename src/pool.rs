//! Reusable record buffers.
//!
//! Every event and array borrows a `Vec<u8>` from a free list and hands it
//! back when it is finished. Oversized buffers are dropped instead of
//! returned, so one huge record cannot pin memory for the rest of the
//! process.

use parking_lot::Mutex;

/// Capacity a fresh buffer starts with.
pub(crate) const INITIAL_CAPACITY: usize = 500;

/// Buffers that grew past this are not reused.
pub(crate) const MAX_RETAINED_CAPACITY: usize = 1 << 16;

/// Upper bound on idle buffers kept per pool.
const MAX_IDLE: usize = 1024;

pub(crate) struct BufferPool {
    free: Mutex<Vec<Vec<u8>>>,
}

impl BufferPool {
    pub(crate) const fn new() -> Self {
        Self {
            free: parking_lot::const_mutex(Vec::new()),
        }
    }

    /// Takes an empty buffer from the pool, allocating one if it is dry.
    pub(crate) fn get(&self) -> Vec<u8> {
        self.free
            .lock()
            .pop()
            .unwrap_or_else(|| Vec::with_capacity(INITIAL_CAPACITY))
    }

    /// Returns a buffer for reuse.
    pub(crate) fn put(&self, mut buf: Vec<u8>) {
        if buf.capacity() > MAX_RETAINED_CAPACITY {
            tracing::trace!(capacity = buf.capacity(), "dropping oversized buffer");
            return;
        }
        buf.clear();
        let mut free = self.free.lock();
        if free.len() < MAX_IDLE {
            free.push(buf);
        }
    }

    #[cfg(test)]
    pub(crate) fn idle(&self) -> usize {
        self.free.lock().len()
    }
}

pub(crate) static EVENT_POOL: BufferPool = BufferPool::new();
pub(crate) static ARRAY_POOL: BufferPool = BufferPool::new();
