//! Benchmark binary comparing the built-in encoder candidates.
//!
//! ```bash
//! # Full sweep, results in benchmark_results.csv
//! benchmark
//!
//! # One candidate, a capped memory pool and a custom output file
//! benchmark --candidate checkpointed-perceiver --memory-limit-mb 512 --output-path out.csv
//! ```

use clap::Parser;
use env_logger::Env;
use log::{error, info};
use perceiver_bench::benchmarks::{
    BackoffPolicy, BenchmarkRunner, ConfigLoader, DEFAULT_SUITE_PATH, print_performance_analysis,
    write_csv,
};
use perceiver_bench::{BenchmarkResult, CandidateRegistry, CpuDevice};
use std::error::Error;
use std::path::PathBuf;

/// Benchmark encoder candidates across a sweep of workload configurations
#[derive(Parser, Debug)]
#[command(name = "benchmark", version, about, long_about = None)]
struct Cli {
    /// CSV file receiving one row per completed run
    #[arg(long, alias = "output_path", default_value = "benchmark_results.csv")]
    output_path: PathBuf,

    /// JSON suite file; the built-in suite is used if it does not exist
    #[arg(long, default_value = DEFAULT_SUITE_PATH)]
    config: PathBuf,

    /// Only run the named candidate (repeatable)
    #[arg(long = "candidate", value_name = "NAME")]
    candidates: Vec<String>,

    /// Override the number of batches per run
    #[arg(long)]
    num_batches: Option<usize>,

    /// Cap the device memory pool, in MiB
    #[arg(long, value_name = "MB")]
    memory_limit_mb: Option<u64>,

    /// Fail a run on the first out-of-memory error instead of halving the batch size
    #[arg(long)]
    no_backoff: bool,

    /// Seed for synthetic data and parameter initialisation
    #[arg(long)]
    seed: Option<u64>,

    /// List the available candidates and exit
    #[arg(long)]
    list: bool,
}

fn run(cli: Cli) -> BenchmarkResult<()> {
    let mut registry = CandidateRegistry::with_builtin_candidates(cli.seed);
    if cli.list {
        println!("Available candidates:");
        for name in registry.names() {
            println!("  {}", name);
        }
        return Ok(());
    }
    if !cli.candidates.is_empty() {
        registry.retain_named(&cli.candidates)?;
    }

    let mut suite = ConfigLoader::load_suite(&cli.config)?;
    if let Some(num_batches) = cli.num_batches {
        suite.num_batches = num_batches;
    }

    let device = match cli.memory_limit_mb {
        Some(limit) => CpuDevice::with_memory_limit(limit.saturating_mul(1 << 20)),
        None => CpuDevice::new(),
    };

    let results = BenchmarkRunner::new(&device, &registry, suite)
        .with_policy(BackoffPolicy::from_enabled(!cli.no_backoff))
        .with_seed(cli.seed)
        .run()?;

    write_csv(&cli.output_path, &results)?;
    print_performance_analysis(&results);

    println!("\n{}", "=".repeat(80));
    println!("Benchmark Complete");
    println!("{}", "=".repeat(80));

    Ok(())
}

fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    info!("Output path: {}", cli.output_path.display());

    if let Err(e) = run(cli) {
        error!("Benchmark failed: {}", e);
        let mut source = e.source();
        while let Some(cause) = source {
            error!("  caused by: {}", cause);
            source = cause.source();
        }
        std::process::exit(1);
    }
}
