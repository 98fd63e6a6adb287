//! Byte accounting for device allocations.

use crate::errors::{DeviceError, DeviceResult};
use log::debug;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Tracks current and peak usage of a device's memory, with an optional capacity.
#[derive(Debug, Default)]
pub struct MemoryPool {
    in_use: AtomicU64,
    peak: AtomicU64,
    limit: Option<u64>,
}

impl MemoryPool {
    /// Creates an unbounded pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a pool that refuses allocations beyond `limit` bytes.
    pub fn with_limit(limit: u64) -> Self {
        Self {
            limit: Some(limit),
            ..Self::default()
        }
    }

    pub fn limit(&self) -> Option<u64> {
        self.limit
    }

    /// Bytes currently held by live leases.
    pub fn in_use(&self) -> u64 {
        self.in_use.load(Ordering::SeqCst)
    }

    /// High-water mark since the last [`reset_peak`](Self::reset_peak).
    pub fn peak(&self) -> u64 {
        self.peak.load(Ordering::SeqCst)
    }

    /// Starts a new measurement window: the peak becomes the current usage.
    pub fn reset_peak(&self) {
        self.peak.store(self.in_use(), Ordering::SeqCst);
    }

    /// Reserves `bytes`, returning a lease that gives them back when dropped.
    pub fn reserve(self: &Arc<Self>, bytes: u64) -> DeviceResult<MemoryLease> {
        let mut current = self.in_use.load(Ordering::SeqCst);
        loop {
            let requested_total = current.saturating_add(bytes);
            if let Some(limit) = self.limit {
                if requested_total > limit {
                    debug!(
                        "Allocation of {} bytes refused ({} in use, limit {})",
                        bytes, current, limit
                    );
                    return Err(DeviceError::OutOfMemory {
                        requested: bytes,
                        in_use: current,
                        limit,
                    });
                }
            }
            match self.in_use.compare_exchange(
                current,
                requested_total,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => {
                    self.peak.fetch_max(requested_total, Ordering::SeqCst);
                    return Ok(MemoryLease {
                        pool: Arc::clone(self),
                        bytes,
                    });
                }
                Err(actual) => current = actual,
            }
        }
    }

    fn release(&self, bytes: u64) {
        self.in_use.fetch_sub(bytes, Ordering::SeqCst);
    }
}

/// Ownership of a number of bytes reserved from a [`MemoryPool`].
pub struct MemoryLease {
    pool: Arc<MemoryPool>,
    bytes: u64,
}

impl MemoryLease {
    pub fn bytes(&self) -> u64 {
        self.bytes
    }
}

impl fmt::Debug for MemoryLease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryLease")
            .field("bytes", &self.bytes)
            .finish()
    }
}

impl Drop for MemoryLease {
    fn drop(&mut self) {
        self.pool.release(self.bytes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lease_release_on_drop() {
        let pool = Arc::new(MemoryPool::new());
        let lease = pool.reserve(128).unwrap();
        assert_eq!(pool.in_use(), 128);
        drop(lease);
        assert_eq!(pool.in_use(), 0);
        assert_eq!(pool.peak(), 128);
    }

    #[test]
    fn test_peak_is_high_water_mark() {
        let pool = Arc::new(MemoryPool::new());
        let a = pool.reserve(100).unwrap();
        let b = pool.reserve(50).unwrap();
        drop(a);
        let _c = pool.reserve(20).unwrap();
        drop(b);
        assert_eq!(pool.peak(), 150);
        assert_eq!(pool.in_use(), 20);
    }

    #[test]
    fn test_reset_peak_uses_current_usage() {
        let pool = Arc::new(MemoryPool::new());
        let held = pool.reserve(64).unwrap();
        drop(pool.reserve(1000).unwrap());
        pool.reset_peak();
        assert_eq!(pool.peak(), 64);
        drop(held);
        pool.reset_peak();
        assert_eq!(pool.peak(), 0);
    }

    #[test]
    fn test_limit_refuses_allocation() {
        let pool = Arc::new(MemoryPool::with_limit(100));
        let _held = pool.reserve(60).unwrap();
        let result = pool.reserve(41);
        assert_eq!(
            result.unwrap_err(),
            DeviceError::OutOfMemory {
                requested: 41,
                in_use: 60,
                limit: 100
            }
        );
        assert_eq!(pool.in_use(), 60);
        assert!(pool.reserve(40).is_ok());
    }
}
