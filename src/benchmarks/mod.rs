//! Benchmark harness: configuration sweeps, single runs, backoff and reporting.
//!
//! A [`BenchmarkSuite`] is expanded into concrete [`RunConfiguration`]s, each of
//! which every registered candidate runs through the [`SingleRunExecutor`]
//! wrapped in [`run_with_backoff`]. The [`BenchmarkRunner`] turns the outcomes
//! into [`ResultRecord`]s for the CSV report.

pub mod backoff;
pub mod benchmark_runner;
pub mod benchmark_types;
pub mod config_expansion;
pub mod performance_metrics;
pub mod report;
pub mod single_run;
pub mod synthetic_data;

pub use backoff::{BackoffOutcome, BackoffPolicy, run_with_backoff};
pub use benchmark_runner::{BenchmarkRunner, ConfigLoader, DEFAULT_SUITE_PATH};
pub use benchmark_types::{
    BenchmarkSuite, ConfigOverrides, DEFAULT_CONFIGURATION, Field, ResultRecord, RunConfiguration,
};
pub use config_expansion::{AxisValues, Combinations, ConfigurationSpec, expand_specs};
pub use performance_metrics::{
    DerivedMetrics, bytes_to_gigabytes, overhead_ratio, print_performance_analysis,
};
pub use report::{read_csv, write_csv, write_records};
pub use single_run::SingleRunExecutor;
pub use synthetic_data::{SyntheticBatches, SyntheticDataSource};
