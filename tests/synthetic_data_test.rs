//! Tests for the synthetic batch source.

use perceiver_bench::benchmarks::{RunConfiguration, SyntheticDataSource};

const DELTA: f32 = 0.05;

#[cfg(test)]
mod synthetic_data_tests {
    use super::*;

    #[test]
    fn test_batch_shape_follows_configuration() {
        let config = RunConfiguration {
            batch_size: 2,
            input_dim: 3,
            input_size: 5,
            ..RunConfiguration::default()
        };
        let mut source = SyntheticDataSource::from_config(&config);
        assert_eq!(source.batch_shape(), (2, 5, 3));

        let batch = source.batches().next().unwrap();
        assert_eq!(batch.shape(), &[2, 5, 3]);
    }

    #[test]
    fn test_source_is_unbounded() {
        let mut source = SyntheticDataSource::new(2, 2, 1);
        assert_eq!(source.batches().take(250).count(), 250);
    }

    #[test]
    fn test_consecutive_batches_differ() {
        let mut source = SyntheticDataSource::new(4, 4, 2);
        let batches: Vec<_> = source.batches().take(2).collect();
        assert_ne!(batches[0], batches[1]);
    }

    #[test]
    fn test_fresh_traversal_is_not_a_replay() {
        let mut source = SyntheticDataSource::new(4, 4, 2).with_seed(3);
        let first: Vec<_> = source.batches().take(3).collect();
        let second: Vec<_> = source.batches().take(3).collect();
        assert_ne!(first, second);
    }

    #[test]
    fn test_seeded_sources_are_reproducible() {
        let mut a = SyntheticDataSource::new(4, 4, 2).with_seed(42);
        let mut b = SyntheticDataSource::new(4, 4, 2).with_seed(42);
        for _ in 0..2 {
            let from_a: Vec<_> = a.batches().take(3).collect();
            let from_b: Vec<_> = b.batches().take(3).collect();
            assert_eq!(from_a, from_b);
        }
    }

    #[test]
    fn test_values_are_standard_normal() {
        let mut source = SyntheticDataSource::new(64, 64, 16).with_seed(9);
        let batch = source.batches().next().unwrap();

        let n = batch.len() as f32;
        let mean = batch.sum() / n;
        let variance = batch.mapv(|v| (v - mean) * (v - mean)).sum() / n;
        assert!(mean.abs() < DELTA, "mean {}", mean);
        assert!((variance - 1.0).abs() < DELTA, "variance {}", variance);
    }

    #[test]
    fn test_zero_batch_size_yields_empty_batches() {
        let mut source = SyntheticDataSource::new(3, 4, 0);
        let batch = source.batches().next().unwrap();
        assert!(batch.is_empty());
    }
}
