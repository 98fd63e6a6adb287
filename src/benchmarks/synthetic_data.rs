//! Unbounded source of random input batches.

use super::benchmark_types::RunConfiguration;
use ndarray::Array3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;

/// Produces batches of shape `(batch_size, sequence_length, feature_dim)` with
/// i.i.d. standard-normal entries.
///
/// Every call to [`batches`](Self::batches) starts a fresh traversal with fresh
/// samples. With a seed the traversals are reproducible across processes but
/// still differ from one another.
#[derive(Debug, Clone)]
pub struct SyntheticDataSource {
    feature_dim: usize,
    sequence_length: usize,
    batch_size: usize,
    seed: Option<u64>,
    traversals: u64,
}

impl SyntheticDataSource {
    pub fn new(feature_dim: usize, sequence_length: usize, batch_size: usize) -> Self {
        Self {
            feature_dim,
            sequence_length,
            batch_size,
            seed: None,
            traversals: 0,
        }
    }

    /// Shapes batches after `config.input_dim`, `config.input_size` and `config.batch_size`.
    pub fn from_config(config: &RunConfiguration) -> Self {
        Self::new(config.input_dim, config.input_size, config.batch_size)
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn batch_shape(&self) -> (usize, usize, usize) {
        (self.batch_size, self.sequence_length, self.feature_dim)
    }

    /// Starts a new infinite traversal.
    pub fn batches(&mut self) -> SyntheticBatches {
        let rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(self.traversals)),
            None => StdRng::from_entropy(),
        };
        self.traversals += 1;

        SyntheticBatches {
            shape: self.batch_shape(),
            rng,
        }
    }
}

/// Infinite iterator of random batches; take a finite prefix.
#[derive(Debug, Clone)]
pub struct SyntheticBatches {
    shape: (usize, usize, usize),
    rng: StdRng,
}

impl Iterator for SyntheticBatches {
    type Item = Array3<f32>;

    fn next(&mut self) -> Option<Self::Item> {
        let rng = &mut self.rng;
        Some(Array3::from_shape_simple_fn(self.shape, || {
            rng.sample::<f32, _>(StandardNormal)
        }))
    }
}
