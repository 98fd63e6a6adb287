//! Warm-up then measured execution of one candidate on one configuration.

use super::benchmark_types::RunConfiguration;
use super::synthetic_data::SyntheticDataSource;
use crate::candidates::{Candidate, CandidateFactory};
use crate::device::{Device, DeviceArray};
use crate::errors::BenchmarkResult;
use log::{Level, debug, log};
use ndarray::Array3;
use std::time::Instant;

/// Drives a freshly built candidate through a fixed number of batches twice:
/// an untimed warm-up epoch followed by a timed one over the same data.
pub struct SingleRunExecutor<'a> {
    device: &'a dyn Device,
    num_batches: usize,
    seed: Option<u64>,
}

impl<'a> SingleRunExecutor<'a> {
    pub fn new(device: &'a dyn Device, num_batches: usize) -> Self {
        Self {
            device,
            num_batches,
            seed: None,
        }
    }

    /// Makes the synthetic batches reproducible.
    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    pub fn num_batches(&self) -> usize {
        self.num_batches
    }

    /// Returns the wall-clock seconds spent in the measured epoch.
    ///
    /// Any device error, including running out of memory, is returned as is.
    pub fn run(
        &self,
        factory: &CandidateFactory,
        config: &RunConfiguration,
    ) -> BenchmarkResult<f64> {
        let mut candidate = factory(config)?;
        candidate.to_device(self.device)?;

        let mut source = SyntheticDataSource::from_config(config);
        if let Some(seed) = self.seed {
            source = source.with_seed(seed);
        }
        let batches: Vec<Array3<f32>> = source.batches().take(self.num_batches).collect();

        debug!("Warm-up epoch for {} ({})", candidate.name(), config);
        self.run_epoch(&mut *candidate, &batches, Level::Info)?;

        let start = Instant::now();
        self.run_epoch(&mut *candidate, &batches, Level::Debug)?;
        let run_time = start.elapsed().as_secs_f64();

        Ok(run_time)
    }

    /// One pass over `batches`: upload, forward, backward, then a device barrier.
    ///
    /// Progress is logged at `progress_level`; the measured epoch uses `Debug`
    /// so that logging stays out of the timed region under the default filter.
    fn run_epoch(
        &self,
        candidate: &mut dyn Candidate,
        batches: &[Array3<f32>],
        progress_level: Level,
    ) -> BenchmarkResult<()> {
        let progress_step = (batches.len() / 10).max(1);

        for (i, batch) in batches.iter().enumerate() {
            let batch = DeviceArray::upload(self.device, batch.clone())?;
            let pass = candidate.forward(self.device, &batch)?;
            candidate.backward(self.device, pass)?;

            if (i + 1) % progress_step == 0 {
                log!(progress_level, "  Progress: {}/{}", i + 1, batches.len());
            }
        }
        self.device.synchronize();

        Ok(())
    }
}
