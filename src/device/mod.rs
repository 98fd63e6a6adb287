//! Compute-device abstraction.
//!
//! The benchmark harness never owns the numeric substrate; it only needs to
//! place tensors on a device, wait for outstanding work, and read and reset the
//! device's memory accounting between runs. Those needs are split into two
//! traits so that orchestration code can be driven by a stub in tests.
//!
//! # Memory accounting
//!
//! Every byte a candidate holds on the device is represented by a
//! [`MemoryLease`] taken from a [`MemoryPool`]. Dropping the lease returns the
//! bytes. The pool records the high-water mark since its last reset, which is
//! what a run reports as its peak memory.

pub mod cpu_device;
pub mod device_array;
pub mod memory_pool;

pub use cpu_device::CpuDevice;
pub use device_array::DeviceArray;
pub use memory_pool::{MemoryLease, MemoryPool};

use crate::errors::DeviceResult;

/// Process-wide memory state of a device.
pub trait ResourceManager {
    /// Releases cached memory, resets the peak-usage counter to the current
    /// usage, and blocks until outstanding device work has finished.
    fn reset(&self);

    /// Returns the maximum number of bytes allocated since the last [`reset`](Self::reset).
    fn peak_usage(&self) -> u64;
}

/// A compute device that candidates allocate tensors on.
pub trait Device: ResourceManager {
    /// Human readable device name used in log output.
    fn name(&self) -> &str;

    /// Reserves `bytes` of device memory.
    ///
    /// Fails with [`DeviceError::OutOfMemory`](crate::errors::DeviceError::OutOfMemory)
    /// when the request cannot be satisfied.
    fn allocate(&self, bytes: u64) -> DeviceResult<MemoryLease>;

    /// Blocks until all previously issued work on the device has completed.
    fn synchronize(&self);
}
