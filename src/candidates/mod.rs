//! Candidate implementations and the contract the harness drives them through.
//!
//! A candidate is built from a [`RunConfiguration`] by a [`CandidateFactory`],
//! moved onto a [`Device`], and then fed batches: each batch goes through
//! [`Candidate::forward`] and the resulting [`ForwardPass`] is handed straight
//! back to [`Candidate::backward`], which differentiates the mean of the output.
//! Gradients are computed and then discarded; no parameter update happens.

pub mod checkpointed;
pub mod dense;
pub mod latent_attention;

pub use checkpointed::CheckpointedPerceiver;
pub use dense::DensePerceiver;
pub use latent_attention::LatentAttentionParams;

use crate::benchmarks::RunConfiguration;
use crate::device::{Device, DeviceArray};
use crate::errors::{BenchmarkError, BenchmarkResult};
use ndarray::Ix3;
use std::any::Any;

/// An implementation under benchmark.
pub trait Candidate {
    /// Identifier used in error messages.
    fn name(&self) -> &str;

    /// Places parameters and gradient buffers on `device`.
    fn to_device(&mut self, device: &dyn Device) -> BenchmarkResult<()>;

    /// Runs the forward computation on a `(batch, seq_len, feature_dim)` batch.
    fn forward(
        &mut self,
        device: &dyn Device,
        batch: &DeviceArray<Ix3>,
    ) -> BenchmarkResult<ForwardPass>;

    /// Differentiates the mean of `pass`'s output with respect to every parameter.
    fn backward(&mut self, device: &dyn Device, pass: ForwardPass) -> BenchmarkResult<()>;
}

/// Output of a forward computation together with whatever the candidate saved
/// to differentiate it later.
pub struct ForwardPass {
    output: DeviceArray<Ix3>,
    tape: Box<dyn Any>,
}

impl ForwardPass {
    pub fn new<T: Any>(output: DeviceArray<Ix3>, tape: T) -> Self {
        Self {
            output,
            tape: Box::new(tape),
        }
    }

    pub fn output(&self) -> &DeviceArray<Ix3> {
        &self.output
    }

    /// Scalar reduction of the output that backward differentiates.
    pub fn mean(&self) -> f32 {
        self.output.mean()
    }

    /// Recovers the saved activations, failing if they were produced by a
    /// candidate with a different tape type.
    pub fn into_tape<T: Any>(self, candidate: &str) -> BenchmarkResult<T> {
        self.tape
            .downcast::<T>()
            .map(|tape| *tape)
            .map_err(|_| BenchmarkError::CandidateExecution {
                candidate: candidate.to_string(),
                message: "Forward pass was produced by a different candidate".to_string(),
            })
    }
}

/// Builds a fresh candidate for a run configuration.
pub type CandidateFactory = Box<dyn Fn(&RunConfiguration) -> BenchmarkResult<Box<dyn Candidate>>>;

/// Ordered mapping from candidate identifier to factory.
#[derive(Default)]
pub struct CandidateRegistry {
    entries: Vec<(String, CandidateFactory)>,
}

impl CandidateRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the built-in candidates.
    ///
    /// With a seed, every run's parameters are initialised from that seed.
    pub fn with_builtin_candidates(seed: Option<u64>) -> Self {
        let mut registry = Self::new();
        registry.register(
            DensePerceiver::NAME,
            Box::new(move |config: &RunConfiguration| -> BenchmarkResult<Box<dyn Candidate>> {
                Ok(Box::new(DensePerceiver::from_config(config, seed)?))
            }),
        );
        registry.register(
            CheckpointedPerceiver::NAME,
            Box::new(move |config: &RunConfiguration| -> BenchmarkResult<Box<dyn Candidate>> {
                Ok(Box::new(CheckpointedPerceiver::from_config(config, seed)?))
            }),
        );
        registry
    }

    /// Adds a candidate, replacing any existing factory with the same name.
    pub fn register(&mut self, name: &str, factory: CandidateFactory) {
        match self.entries.iter_mut().find(|(existing, _)| existing == name) {
            Some(entry) => entry.1 = factory,
            None => self.entries.push((name.to_string(), factory)),
        }
    }

    /// Keeps only the named candidates, in registry order.
    pub fn retain_named(&mut self, names: &[String]) -> BenchmarkResult<()> {
        if let Some(unknown) = names.iter().find(|name| self.get(name).is_none()) {
            return Err(BenchmarkError::UnknownCandidate {
                name: unknown.clone(),
                available: self.names(),
            });
        }
        self.entries.retain(|(name, _)| names.contains(name));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&CandidateFactory> {
        self.entries
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, factory)| factory)
    }

    pub fn names(&self) -> Vec<String> {
        self.entries.iter().map(|(name, _)| name.clone()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &CandidateFactory)> {
        self.entries
            .iter()
            .map(|(name, factory)| (name.as_str(), factory))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
