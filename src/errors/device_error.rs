//! Error types raised by the compute substrate.

use thiserror::Error;

/// Errors that can occur while allocating or operating on device memory.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    #[error(
        "Device out of memory: tried to allocate {requested} bytes with {in_use} bytes in use (limit {limit} bytes)"
    )]
    OutOfMemory {
        requested: u64,
        in_use: u64,
        limit: u64,
    },

    #[error("Tensor shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },
}

impl DeviceError {
    /// Returns true when the device could not satisfy a memory request.
    pub fn is_out_of_memory(&self) -> bool {
        matches!(self, DeviceError::OutOfMemory { .. })
    }
}
