//! Host-memory device.

use super::{Device, MemoryLease, MemoryPool, ResourceManager};
use crate::errors::DeviceResult;
use log::debug;
use std::sync::Arc;

/// Executes candidates on the host CPU while accounting memory like an accelerator would.
///
/// Work issued to this device completes before the issuing call returns, so
/// [`Device::synchronize`] has nothing to wait for. A memory limit can be set
/// to emulate a device with finite memory.
#[derive(Debug)]
pub struct CpuDevice {
    name: String,
    pool: Arc<MemoryPool>,
}

impl CpuDevice {
    pub fn new() -> Self {
        Self {
            name: "cpu".to_string(),
            pool: Arc::new(MemoryPool::new()),
        }
    }

    /// Creates a device whose allocations fail once `limit_bytes` would be exceeded.
    pub fn with_memory_limit(limit_bytes: u64) -> Self {
        Self {
            name: format!("cpu (limit {} MiB)", limit_bytes / (1 << 20)),
            pool: Arc::new(MemoryPool::with_limit(limit_bytes)),
        }
    }

    pub fn memory_pool(&self) -> &Arc<MemoryPool> {
        &self.pool
    }
}

impl Default for CpuDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceManager for CpuDevice {
    fn reset(&self) {
        // Host allocations are returned to the system as soon as their leases
        // drop, so there is no cache to empty.
        self.pool.reset_peak();
        self.synchronize();
        debug!(
            "Reset {}: {} bytes still in use",
            self.name,
            self.pool.in_use()
        );
    }

    fn peak_usage(&self) -> u64 {
        self.pool.peak()
    }
}

impl Device for CpuDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn allocate(&self, bytes: u64) -> DeviceResult<MemoryLease> {
        self.pool.reserve(bytes)
    }

    fn synchronize(&self) {}
}
