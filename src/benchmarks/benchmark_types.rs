//! Benchmark type definitions and configuration structures.

use super::config_expansion::{ConfigurationSpec, expand_specs};
use super::performance_metrics::{DerivedMetrics, bytes_to_gigabytes};
use crate::errors::{BenchmarkError, BenchmarkResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A sweepable field of a [`RunConfiguration`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    BatchSize,
    /// Feature dimension of every input token.
    InputDim,
    /// Sequence length of every input sample.
    InputSize,
    Depth,
    LatentDim,
    NumLatents,
}

impl Field {
    pub const ALL: [Field; 6] = [
        Field::BatchSize,
        Field::InputDim,
        Field::InputSize,
        Field::Depth,
        Field::LatentDim,
        Field::NumLatents,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Field::BatchSize => "batch_size",
            Field::InputDim => "input_dim",
            Field::InputSize => "input_size",
            Field::Depth => "depth",
            Field::LatentDim => "latent_dim",
            Field::NumLatents => "num_latents",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Fully resolved parameters of a single benchmark run.
///
/// Missing fields in a deserialized configuration take their value from
/// [`DEFAULT_CONFIGURATION`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunConfiguration {
    pub batch_size: usize,
    pub input_dim: usize,
    pub input_size: usize,
    pub depth: usize,
    pub latent_dim: usize,
    pub num_latents: usize,
}

/// Fallback values for every field a sweep does not set.
pub const DEFAULT_CONFIGURATION: RunConfiguration = RunConfiguration {
    batch_size: 256,
    input_dim: 128,
    input_size: 512,
    depth: 8,
    latent_dim: 256,
    num_latents: 256,
};

impl Default for RunConfiguration {
    fn default() -> Self {
        DEFAULT_CONFIGURATION
    }
}

impl RunConfiguration {
    pub fn get(&self, field: Field) -> usize {
        match field {
            Field::BatchSize => self.batch_size,
            Field::InputDim => self.input_dim,
            Field::InputSize => self.input_size,
            Field::Depth => self.depth,
            Field::LatentDim => self.latent_dim,
            Field::NumLatents => self.num_latents,
        }
    }

    /// Returns a copy with `field` replaced by `value`.
    pub fn with_field(mut self, field: Field, value: usize) -> Self {
        match field {
            Field::BatchSize => self.batch_size = value,
            Field::InputDim => self.input_dim = value,
            Field::InputSize => self.input_size = value,
            Field::Depth => self.depth = value,
            Field::LatentDim => self.latent_dim = value,
            Field::NumLatents => self.num_latents = value,
        }
        self
    }

    pub fn with_batch_size(self, batch_size: usize) -> Self {
        self.with_field(Field::BatchSize, batch_size)
    }

    /// Applies `overrides` on top of `defaults`; override values win.
    pub fn merged(overrides: &ConfigOverrides, defaults: &RunConfiguration) -> Self {
        overrides
            .iter()
            .fold(*defaults, |config, (field, value)| config.with_field(field, value))
    }

    /// Validates the configuration
    pub fn validate(&self) -> BenchmarkResult<()> {
        for field in Field::ALL {
            if field != Field::Depth && self.get(field) == 0 {
                return Err(BenchmarkError::ConfigValidationError {
                    field: field.name().to_string(),
                    message: "Value must be greater than 0".to_string(),
                });
            }
        }
        Ok(())
    }
}

impl fmt::Display for RunConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = Field::ALL
            .iter()
            .map(|field| format!("{}={}", field, self.get(*field)))
            .collect();
        write!(f, "{}", parts.join(" "))
    }
}

/// One combination produced by expanding a [`ConfigurationSpec`], before defaults are merged in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigOverrides {
    values: Vec<(Field, usize)>,
}

impl ConfigOverrides {
    pub fn new(values: Vec<(Field, usize)>) -> Self {
        Self { values }
    }

    pub fn get(&self, field: Field) -> Option<usize> {
        self.values
            .iter()
            .find(|(candidate, _)| *candidate == field)
            .map(|(_, value)| *value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Field, usize)> + '_ {
        self.values.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl fmt::Display for ConfigOverrides {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .values
            .iter()
            .map(|(field, value)| format!("{}: {}", field, value))
            .collect();
        write!(f, "{{{}}}", parts.join(", "))
    }
}

/// A complete benchmark sweep: defaults, the sweep specs, and the batch count per run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BenchmarkSuite {
    pub num_batches: usize,
    pub defaults: RunConfiguration,
    pub sweeps: Vec<ConfigurationSpec>,
}

impl BenchmarkSuite {
    pub const DEFAULT_NUM_BATCHES: usize = 100;

    /// Validates the suite and every configuration it expands to.
    pub fn validate(&self) -> BenchmarkResult<()> {
        self.run_configurations().map(|_| ())
    }

    /// Expands every sweep, merges it over the defaults, and validates the result.
    pub fn run_configurations(&self) -> BenchmarkResult<Vec<RunConfiguration>> {
        if self.num_batches == 0 {
            return Err(BenchmarkError::ConfigValidationError {
                field: "num_batches".to_string(),
                message: "Number of batches must be greater than 0".to_string(),
            });
        }

        expand_specs(&self.sweeps)
            .map(|overrides| {
                let config = RunConfiguration::merged(&overrides, &self.defaults);
                config.validate()?;
                Ok(config)
            })
            .collect()
    }
}

impl Default for BenchmarkSuite {
    /// Sequence lengths grow while batch sizes shrink to keep each run within device memory.
    fn default() -> Self {
        Self {
            num_batches: Self::DEFAULT_NUM_BATCHES,
            defaults: DEFAULT_CONFIGURATION,
            sweeps: vec![
                ConfigurationSpec::new()
                    .with(Field::InputSize, vec![128, 256, 512])
                    .with(Field::BatchSize, 256),
                ConfigurationSpec::new()
                    .with(Field::InputSize, vec![1024, 2048, 4096])
                    .with(Field::BatchSize, 128),
                ConfigurationSpec::new()
                    .with(Field::InputSize, vec![8192])
                    .with(Field::BatchSize, 64),
                ConfigurationSpec::new()
                    .with(Field::InputSize, vec![16384])
                    .with(Field::BatchSize, 48),
            ],
        }
    }
}

/// Outcome of one completed run, flattened for tabular export.
///
/// `batch_size` is the requested batch size; `executed_batch_size` is what ran
/// after any out-of-memory backoff, and the throughput figures are based on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRecord {
    pub batch_size: usize,
    pub input_dim: usize,
    pub input_size: usize,
    pub depth: usize,
    pub latent_dim: usize,
    pub num_latents: usize,
    pub candidate: String,
    pub executed_batch_size: usize,
    pub backoff_reductions: u32,
    /// Seconds spent in the measured pass.
    pub run_time: f64,
    /// Peak device memory in gigabytes (MiB / 1000).
    pub peak_memory: f64,
    pub it_per_sec: f64,
    pub time_per_it: f64,
}

impl ResultRecord {
    pub fn new(
        candidate: &str,
        requested: &RunConfiguration,
        executed: &RunConfiguration,
        backoff_reductions: u32,
        run_time: f64,
        peak_memory_bytes: u64,
        num_batches: usize,
    ) -> Self {
        let metrics = DerivedMetrics::from_run(run_time, executed.batch_size, num_batches);

        Self {
            batch_size: requested.batch_size,
            input_dim: requested.input_dim,
            input_size: requested.input_size,
            depth: requested.depth,
            latent_dim: requested.latent_dim,
            num_latents: requested.num_latents,
            candidate: candidate.to_string(),
            executed_batch_size: executed.batch_size,
            backoff_reductions,
            run_time,
            peak_memory: bytes_to_gigabytes(peak_memory_bytes),
            it_per_sec: metrics.it_per_sec,
            time_per_it: metrics.time_per_it,
        }
    }

    /// The requested configuration this record was measured for.
    pub fn configuration(&self) -> RunConfiguration {
        RunConfiguration {
            batch_size: self.batch_size,
            input_dim: self.input_dim,
            input_size: self.input_size,
            depth: self.depth,
            latent_dim: self.latent_dim,
            num_latents: self.num_latents,
        }
    }
}
