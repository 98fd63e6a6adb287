//! Error types for the benchmark harness.
//!
//! Device-level failures and harness-level failures are kept apart so that the
//! out-of-memory condition can be recognised by type rather than by message.

mod benchmark_error;
mod device_error;

pub use benchmark_error::BenchmarkError;
pub use device_error::DeviceError;

/// Result type alias for operations on the compute device.
pub type DeviceResult<T> = std::result::Result<T, DeviceError>;

/// Result type alias for benchmark operations.
pub type BenchmarkResult<T> = std::result::Result<T, BenchmarkError>;
