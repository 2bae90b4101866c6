//! Reusable buffer pool for the send/receive hot path.
//!
//! Sends and reads borrow a fixed-capacity buffer from a shared pool instead
//! of allocating per message. A buffer has exactly one owner at any time:
//! either the pool, or the single in-flight operation holding a
//! [`PooledBuf`]. Dropping the guard returns the storage, so the pool only
//! grows with peak concurrent demand and never shrinks.

use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::core::POOL_BUFFER_CAPACITY;

/// A pool of fixed-capacity byte buffers, shared across connections.
#[derive(Debug)]
pub struct BufferPool {
    capacity: usize,
    free: Mutex<Vec<Box<[u8]>>>,
    allocated: AtomicUsize,
}

impl BufferPool {
    /// Create a pool handing out buffers of the default capacity.
    pub fn new() -> Arc<Self> {
        Self::with_capacity(POOL_BUFFER_CAPACITY)
    }

    /// Create a pool handing out buffers of `capacity` bytes each.
    pub fn with_capacity(capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            capacity,
            free: Mutex::new(Vec::new()),
            allocated: AtomicUsize::new(0),
        })
    }

    /// Buffer capacity of this pool's size class.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Check out a buffer, allocating a fresh one only if the pool is empty.
    pub fn acquire(self: &Arc<Self>) -> PooledBuf {
        let storage = self.free.lock().expect("pool lock").pop();
        let storage = storage.unwrap_or_else(|| {
            self.allocated.fetch_add(1, Ordering::Relaxed);
            vec![0u8; self.capacity].into_boxed_slice()
        });
        PooledBuf {
            storage: Some(storage),
            pool: Arc::clone(self),
        }
    }

    /// Total number of distinct buffers ever allocated.
    pub fn allocated(&self) -> usize {
        self.allocated.load(Ordering::Relaxed)
    }

    /// Number of buffers currently resting in the pool.
    pub fn available(&self) -> usize {
        self.free.lock().expect("pool lock").len()
    }

    fn release(&self, storage: Box<[u8]>) {
        self.free.lock().expect("pool lock").push(storage);
    }
}

/// Exclusive ownership of one pooled buffer.
///
/// Dereferences to the full buffer slice; the holder tracks how many bytes
/// are meaningful. The storage returns to the pool on drop.
#[derive(Debug)]
pub struct PooledBuf {
    storage: Option<Box<[u8]>>,
    pool: Arc<BufferPool>,
}

impl Deref for PooledBuf {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.storage.as_deref().expect("buffer present until drop")
    }
}

impl DerefMut for PooledBuf {
    fn deref_mut(&mut self) -> &mut [u8] {
        self.storage
            .as_deref_mut()
            .expect("buffer present until drop")
    }
}

impl Drop for PooledBuf {
    fn drop(&mut self) {
        if let Some(storage) = self.storage.take() {
            self.pool.release(storage);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reuses_released_buffers() {
        let pool = BufferPool::with_capacity(64);

        for _ in 0..100 {
            let buf = pool.acquire();
            assert_eq!(buf.len(), 64);
        }

        // Sequential acquire/release cycles only ever needed one buffer.
        assert_eq!(pool.allocated(), 1);
        assert_eq!(pool.available(), 1);
    }

    #[test]
    fn allocations_bounded_by_peak_in_flight() {
        let pool = BufferPool::with_capacity(32);

        let peak: Vec<_> = (0..5).map(|_| pool.acquire()).collect();
        assert_eq!(pool.allocated(), 5);
        drop(peak);

        // Interleaved churn below the old peak allocates nothing new.
        for _ in 0..20 {
            let a = pool.acquire();
            let b = pool.acquire();
            let c = pool.acquire();
            drop(a);
            drop(b);
            drop(c);
        }
        assert_eq!(pool.allocated(), 5);
        assert_eq!(pool.available(), 5);
    }

    #[test]
    fn buffers_are_writable() {
        let pool = BufferPool::with_capacity(16);
        let mut buf = pool.acquire();
        buf[..4].copy_from_slice(&[1, 2, 3, 4]);
        assert_eq!(&buf[..4], &[1, 2, 3, 4]);
    }
}
