//! Core benchmark execution logic.

use super::backoff::{BackoffPolicy, run_with_backoff};
use super::benchmark_types::{BenchmarkSuite, ResultRecord};
use super::single_run::SingleRunExecutor;
use crate::candidates::CandidateRegistry;
use crate::device::Device;
use crate::errors::{BenchmarkError, BenchmarkResult};
use log::{info, warn};
use std::fs;
use std::io;
use std::path::Path;

/// Default location of the suite file, relative to the working directory.
pub const DEFAULT_SUITE_PATH: &str = "configs/benchmark_suite.json";

/// Configuration loader that handles JSON files with fallbacks
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load a configuration file with fallback to defaults
    ///
    /// Only a missing file falls back; any other read failure is returned.
    pub fn load_config<T>(path: impl AsRef<Path>, config_name: &str) -> BenchmarkResult<T>
    where
        T: serde::de::DeserializeOwned + Default,
    {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(content) => {
                serde_json::from_str(&content).map_err(|e| BenchmarkError::ConfigParseError {
                    path: path.display().to_string(),
                    source: e,
                })
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                warn!(
                    "Config file '{}' not found, using default configuration for {}",
                    path.display(),
                    config_name
                );
                Ok(T::default())
            }
            Err(e) => Err(BenchmarkError::Io(e)),
        }
    }

    /// Load a benchmark suite and check every configuration it expands to
    pub fn load_suite(path: impl AsRef<Path>) -> BenchmarkResult<BenchmarkSuite> {
        let suite: BenchmarkSuite = Self::load_config(path, "benchmark_suite")?;
        suite.validate()?;
        Ok(suite)
    }
}

/// Runs every registered candidate over every configuration of a suite.
///
/// Runs are strictly sequential. The device's peak-usage counter is reset
/// before and after each run so every record's peak memory belongs to that run
/// alone.
pub struct BenchmarkRunner<'a> {
    device: &'a dyn Device,
    candidates: &'a CandidateRegistry,
    suite: BenchmarkSuite,
    policy: BackoffPolicy,
    seed: Option<u64>,
}

impl<'a> BenchmarkRunner<'a> {
    pub fn new(
        device: &'a dyn Device,
        candidates: &'a CandidateRegistry,
        suite: BenchmarkSuite,
    ) -> Self {
        Self {
            device,
            candidates,
            suite,
            policy: BackoffPolicy::Enabled,
            seed: None,
        }
    }

    pub fn with_policy(mut self, policy: BackoffPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Seeds the synthetic batches of every run.
    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    /// Run all candidates over all configurations
    ///
    /// Configurations are expanded and validated before the first run. The
    /// first error that is not recovered by backoff aborts the whole session.
    pub fn run(&self) -> BenchmarkResult<Vec<ResultRecord>> {
        let configs = self.suite.run_configurations()?;
        let num_batches = self.suite.num_batches;
        let executor = SingleRunExecutor::new(self.device, num_batches).with_seed(self.seed);

        info!(
            "Starting benchmark: {} candidate(s) x {} configuration(s), {} batches per run on {}",
            self.candidates.len(),
            configs.len(),
            num_batches,
            self.device.name()
        );

        let mut results = Vec::with_capacity(self.candidates.len() * configs.len());
        for (name, factory) in self.candidates.iter() {
            info!("{}", "=".repeat(80));
            info!("Candidate: {}", name);
            info!("{}", "=".repeat(80));

            for config in &configs {
                info!("Running {} with {}", name, config);
                self.device.reset();

                let mut attempts = 0;
                let outcome = run_with_backoff(config, self.policy, |attempt| {
                    // Drop the high-water mark of a failed attempt.
                    if attempts > 0 {
                        self.device.reset();
                    }
                    attempts += 1;
                    executor.run(factory, attempt)
                })?;
                let peak_memory = self.device.peak_usage();

                let record = ResultRecord::new(
                    name,
                    config,
                    &outcome.executed,
                    outcome.reductions,
                    outcome.run_time,
                    peak_memory,
                    num_batches,
                );
                info!(
                    "  {:.3} s, {:.1} it/s, {:.3} GB peak",
                    record.run_time, record.it_per_sec, record.peak_memory
                );
                results.push(record);

                self.device.reset();
            }
        }

        info!("All benchmarks completed successfully");
        Ok(results)
    }
}
