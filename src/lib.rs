//! Micro-benchmark harness comparing implementations of a latent cross-attention encoder.
//!
//! The harness sweeps a declarative space of workload configurations, runs each
//! candidate implementation through a warm-up and a measured forward/backward
//! epoch on synthetic data, and records run time, throughput and peak device
//! memory. Runs that exhaust device memory are retried at half the batch size.

pub mod benchmarks;
pub mod candidates;
pub mod device;
pub mod errors;

pub use benchmarks::{BenchmarkRunner, BenchmarkSuite, ResultRecord, RunConfiguration};
pub use candidates::{Candidate, CandidateFactory, CandidateRegistry};
pub use device::{CpuDevice, Device, ResourceManager};
pub use errors::{BenchmarkError, BenchmarkResult, DeviceError, DeviceResult};
