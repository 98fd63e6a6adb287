//! End-to-end tests of the benchmark orchestrator using stub devices and candidates.

use ndarray::{Array3, Ix3};
use perceiver_bench::benchmarks::{
    BackoffPolicy, BenchmarkRunner, BenchmarkSuite, ConfigurationSpec, Field, RunConfiguration,
    SingleRunExecutor, bytes_to_gigabytes,
};
use perceiver_bench::candidates::{Candidate, CandidateFactory, CandidateRegistry, ForwardPass};
use perceiver_bench::device::{
    CpuDevice, Device, DeviceArray, MemoryLease, MemoryPool, ResourceManager,
};
use perceiver_bench::errors::{BenchmarkError, BenchmarkResult, DeviceResult};
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::Arc;

const MIB: u64 = 1 << 20;

/// Candidate that does no real work: returns a zero tensor of the right shape
/// and, optionally, holds `scratch_per_sample` bytes per sample while running.
struct StubCandidate {
    config: RunConfiguration,
    scratch_per_sample: u64,
}

impl Candidate for StubCandidate {
    fn name(&self) -> &str {
        "stub"
    }

    fn to_device(&mut self, _device: &dyn Device) -> BenchmarkResult<()> {
        Ok(())
    }

    fn forward(
        &mut self,
        device: &dyn Device,
        batch: &DeviceArray<Ix3>,
    ) -> BenchmarkResult<ForwardPass> {
        let scratch = device.allocate(self.scratch_per_sample * batch.shape()[0] as u64)?;
        let output = DeviceArray::zeros(
            device,
            (batch.shape()[0], self.config.num_latents, self.config.latent_dim),
        )?;
        Ok(ForwardPass::new(output, scratch))
    }

    fn backward(&mut self, _device: &dyn Device, pass: ForwardPass) -> BenchmarkResult<()> {
        let _scratch: MemoryLease = pass.into_tape("stub")?;
        Ok(())
    }
}

fn stub_factory(scratch_per_sample: u64) -> CandidateFactory {
    Box::new(move |config: &RunConfiguration| -> BenchmarkResult<Box<dyn Candidate>> {
        Ok(Box::new(StubCandidate {
            config: *config,
            scratch_per_sample,
        }))
    })
}

fn stub_registry(scratch_per_sample: u64) -> CandidateRegistry {
    let mut registry = CandidateRegistry::new();
    registry.register("stub", stub_factory(scratch_per_sample));
    registry
}

/// Batches and backward calls seen by every candidate a [`recording_factory`] builds.
#[derive(Default)]
struct CallLog {
    forward_inputs: RefCell<Vec<Array3<f32>>>,
    backward_calls: Cell<usize>,
}

/// Candidate that copies every batch it is given into a shared [`CallLog`].
struct RecordingCandidate {
    config: RunConfiguration,
    calls: Rc<CallLog>,
}

impl Candidate for RecordingCandidate {
    fn name(&self) -> &str {
        "recording"
    }

    fn to_device(&mut self, _device: &dyn Device) -> BenchmarkResult<()> {
        Ok(())
    }

    fn forward(
        &mut self,
        device: &dyn Device,
        batch: &DeviceArray<Ix3>,
    ) -> BenchmarkResult<ForwardPass> {
        self.calls
            .forward_inputs
            .borrow_mut()
            .push(batch.view().to_owned());
        let output = DeviceArray::zeros(
            device,
            (batch.shape()[0], self.config.num_latents, self.config.latent_dim),
        )?;
        Ok(ForwardPass::new(output, ()))
    }

    fn backward(&mut self, _device: &dyn Device, pass: ForwardPass) -> BenchmarkResult<()> {
        pass.into_tape::<()>("recording")?;
        self.calls.backward_calls.set(self.calls.backward_calls.get() + 1);
        Ok(())
    }
}

fn recording_factory(calls: Rc<CallLog>) -> CandidateFactory {
    Box::new(move |config: &RunConfiguration| -> BenchmarkResult<Box<dyn Candidate>> {
        Ok(Box::new(RecordingCandidate {
            config: *config,
            calls: Rc::clone(&calls),
        }))
    })
}

/// Suite with small tensors: `input_size = 8` and a tiny latent array.
fn small_suite(batch_sizes: Vec<usize>) -> BenchmarkSuite {
    let defaults = RunConfiguration {
        input_size: 8,
        input_dim: 4,
        latent_dim: 2,
        num_latents: 2,
        ..RunConfiguration::default()
    };
    BenchmarkSuite {
        num_batches: 3,
        defaults,
        sweeps: vec![ConfigurationSpec::new().with(Field::BatchSize, batch_sizes)],
    }
}

/// Device whose peak counter drops to zero on reset and that counts resets.
struct CountingDevice {
    pool: Arc<MemoryPool>,
    resets: Cell<usize>,
    syncs: Cell<usize>,
}

impl CountingDevice {
    fn new() -> Self {
        Self {
            pool: Arc::new(MemoryPool::new()),
            resets: Cell::new(0),
            syncs: Cell::new(0),
        }
    }
}

impl ResourceManager for CountingDevice {
    fn reset(&self) {
        self.pool.reset_peak();
        self.resets.set(self.resets.get() + 1);
    }

    fn peak_usage(&self) -> u64 {
        self.pool.peak()
    }
}

impl Device for CountingDevice {
    fn name(&self) -> &str {
        "counting"
    }

    fn allocate(&self, bytes: u64) -> DeviceResult<MemoryLease> {
        self.pool.reserve(bytes)
    }

    fn synchronize(&self) {
        self.syncs.set(self.syncs.get() + 1);
    }
}

#[cfg(test)]
mod orchestration_tests {
    use super::*;

    #[test]
    fn test_one_record_per_configuration() {
        let device = CountingDevice::new();
        let registry = stub_registry(0);
        let records = BenchmarkRunner::new(&device, &registry, small_suite(vec![2, 4]))
            .run()
            .unwrap();

        assert_eq!(records.len(), 2);
        let batch_sizes: Vec<usize> = records.iter().map(|r| r.batch_size).collect();
        assert_eq!(batch_sizes, vec![2, 4]);
        for record in &records {
            assert_eq!(record.candidate, "stub");
            assert_eq!(record.input_size, 8);
            assert_eq!(record.executed_batch_size, record.batch_size);
            assert_eq!(record.backoff_reductions, 0);
            assert!(record.run_time >= 0.0);
            assert!(record.peak_memory >= 0.0);
            assert!(record.it_per_sec >= 0.0);
        }
    }

    #[test]
    fn test_reset_before_and_after_every_run() {
        let device = CountingDevice::new();
        let registry = stub_registry(0);
        BenchmarkRunner::new(&device, &registry, small_suite(vec![2, 4]))
            .run()
            .unwrap();

        assert_eq!(device.resets.get(), 4);
        // One barrier per epoch, two epochs per run.
        assert_eq!(device.syncs.get(), 4);
    }

    #[test]
    fn test_peak_memory_is_isolated_between_runs() {
        let device = CountingDevice::new();
        let registry = stub_registry(MIB);
        let records = BenchmarkRunner::new(&device, &registry, small_suite(vec![8, 1]))
            .run()
            .unwrap();

        // The second run must not report the first run's eight-sample scratch.
        assert!(records[0].peak_memory >= bytes_to_gigabytes(8 * MIB));
        assert!(records[1].peak_memory >= bytes_to_gigabytes(MIB));
        assert!(records[1].peak_memory < bytes_to_gigabytes(2 * MIB));
        assert_eq!(device.pool.in_use(), 0);
    }

    #[test]
    fn test_candidates_run_in_registry_order() {
        let device = CountingDevice::new();
        let mut registry = CandidateRegistry::new();
        registry.register("first", stub_factory(0));
        registry.register("second", stub_factory(0));

        let records = BenchmarkRunner::new(&device, &registry, small_suite(vec![1, 2]))
            .run()
            .unwrap();
        let order: Vec<(&str, usize)> = records
            .iter()
            .map(|r| (r.candidate.as_str(), r.batch_size))
            .collect();
        assert_eq!(
            order,
            vec![("first", 1), ("first", 2), ("second", 1), ("second", 2)]
        );
    }

    #[test]
    fn test_invalid_configuration_fails_before_any_run() {
        let device = CountingDevice::new();
        let registry = stub_registry(0);
        let result = BenchmarkRunner::new(&device, &registry, small_suite(vec![2, 0])).run();

        assert!(matches!(
            result,
            Err(BenchmarkError::ConfigValidationError { .. })
        ));
        assert_eq!(device.resets.get(), 0);
    }

    #[test]
    fn test_build_error_aborts_session() {
        let device = CountingDevice::new();
        let mut registry = CandidateRegistry::new();
        registry.register(
            "broken",
            Box::new(|_: &RunConfiguration| -> BenchmarkResult<Box<dyn Candidate>> {
                Err(BenchmarkError::CandidateBuild {
                    candidate: "broken".to_string(),
                    message: "cannot build".to_string(),
                })
            }),
        );

        let result = BenchmarkRunner::new(&device, &registry, small_suite(vec![2])).run();
        assert!(matches!(result, Err(BenchmarkError::CandidateBuild { .. })));
    }
}

#[cfg(test)]
mod single_run_tests {
    use super::*;

    #[test]
    fn test_warm_up_and_measured_pass_replay_the_same_batches() {
        let num_batches = 5;
        let device = CountingDevice::new();
        let calls = Rc::new(CallLog::default());
        let factory = recording_factory(Rc::clone(&calls));
        let config = small_suite(vec![2]).run_configurations().unwrap()[0];

        let run_time = SingleRunExecutor::new(&device, num_batches)
            .run(&factory, &config)
            .unwrap();
        assert!(run_time >= 0.0);

        let inputs = calls.forward_inputs.borrow();
        assert_eq!(inputs.len(), 2 * num_batches);
        assert_eq!(calls.backward_calls.get(), 2 * num_batches);
        assert_eq!(&inputs[..num_batches], &inputs[num_batches..]);
        for pair in inputs[..num_batches].windows(2) {
            assert_ne!(pair[0], pair[1]);
        }
        assert!(inputs.iter().all(|batch| batch.shape() == [2, 8, 4]));
        assert_eq!(device.syncs.get(), 2);
    }

    #[test]
    fn test_each_run_draws_fresh_batches() {
        let device = CountingDevice::new();
        let calls = Rc::new(CallLog::default());
        let factory = recording_factory(Rc::clone(&calls));
        let config = small_suite(vec![2]).run_configurations().unwrap()[0];
        let executor = SingleRunExecutor::new(&device, 2);

        executor.run(&factory, &config).unwrap();
        executor.run(&factory, &config).unwrap();

        let inputs = calls.forward_inputs.borrow();
        assert_eq!(inputs.len(), 8);
        assert_ne!(inputs[0], inputs[4]);
    }
}

#[cfg(test)]
mod backoff_integration_tests {
    use super::*;

    #[test]
    fn test_out_of_memory_run_is_recorded_at_executed_batch_size() {
        let device = CpuDevice::with_memory_limit(6 * MIB);
        let registry = stub_registry(MIB);
        let records = BenchmarkRunner::new(&device, &registry, small_suite(vec![8]))
            .run()
            .unwrap();

        let record = &records[0];
        assert_eq!(record.batch_size, 8);
        assert_eq!(record.executed_batch_size, 4);
        assert_eq!(record.backoff_reductions, 1);
        assert!(record.peak_memory >= bytes_to_gigabytes(4 * MIB));
        assert!(record.peak_memory <= bytes_to_gigabytes(6 * MIB));

        assert_eq!(device.memory_pool().limit(), Some(6 * MIB));
        assert_eq!(device.memory_pool().in_use(), 0);

        let expected_it_per_sec = (4 * 3) as f64 / record.run_time;
        assert!((record.it_per_sec - expected_it_per_sec).abs() <= 1e-6 * expected_it_per_sec);
    }

    #[test]
    fn test_disabled_backoff_propagates_out_of_memory() {
        let device = CpuDevice::with_memory_limit(6 * MIB);
        let registry = stub_registry(MIB);
        let result = BenchmarkRunner::new(&device, &registry, small_suite(vec![8]))
            .with_policy(BackoffPolicy::Disabled)
            .run();

        assert!(result.unwrap_err().is_resource_exhausted());
    }
}
