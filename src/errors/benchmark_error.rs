//! Error types for benchmark configuration, execution and reporting.

use super::device_error::DeviceError;
use thiserror::Error;

/// Errors that can abort a benchmarking session.
///
/// Only [`BenchmarkError::Device`] wrapping [`DeviceError::OutOfMemory`] is ever
/// handled locally (by the batch-size backoff); everything else propagates to
/// the binary and terminates the session.
#[derive(Error, Debug)]
pub enum BenchmarkError {
    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error("Failed to parse configuration file '{path}': {source}")]
    ConfigParseError {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Configuration validation error for field '{field}': {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Unknown candidate '{name}'. Available: {available:?}")]
    UnknownCandidate {
        name: String,
        available: Vec<String>,
    },

    #[error("Failed to build candidate '{candidate}': {message}")]
    CandidateBuild { candidate: String, message: String },

    #[error("Candidate '{candidate}' execution error: {message}")]
    CandidateExecution { candidate: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl BenchmarkError {
    /// Returns true for the resource-exhaustion condition the backoff controller retries on.
    pub fn is_resource_exhausted(&self) -> bool {
        matches!(self, BenchmarkError::Device(error) if error.is_out_of_memory())
    }
}
