//! Performance measurement utilities for benchmarks.

use super::benchmark_types::{ResultRecord, RunConfiguration};

const BYTES_PER_MIB: f64 = (1u64 << 20) as f64;

/// Converts a byte count to the gigabytes reported in results (MiB / 1000).
pub fn bytes_to_gigabytes(bytes: u64) -> f64 {
    bytes as f64 / BYTES_PER_MIB / 1000.0
}

/// Throughput figures derived from one measured pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DerivedMetrics {
    pub total_samples: usize,
    /// Samples processed per second.
    pub it_per_sec: f64,
    /// Seconds spent per sample.
    pub time_per_it: f64,
}

impl DerivedMetrics {
    /// A run that processed no samples (backed off to batch size 0) reports
    /// zero throughput. A zero `run_time` is not guarded against.
    pub fn new(run_time: f64, total_samples: usize) -> Self {
        let samples = total_samples as f64;
        let (it_per_sec, time_per_it) = if total_samples > 0 {
            (samples / run_time, run_time / samples)
        } else {
            (0.0, 0.0)
        };

        Self {
            total_samples,
            it_per_sec,
            time_per_it,
        }
    }

    pub fn from_run(run_time: f64, batch_size: usize, num_batches: usize) -> Self {
        Self::new(run_time, batch_size * num_batches)
    }

    /// How many times slower this pass was than `baseline`.
    pub fn overhead_ratio(&self, baseline: &DerivedMetrics) -> f64 {
        overhead_ratio(self.it_per_sec, baseline.it_per_sec)
    }

    pub fn overhead_percentage(&self, baseline: &DerivedMetrics) -> f64 {
        (self.overhead_ratio(baseline) - 1.0) * 100.0
    }
}

/// Slowdown of a run with throughput `it_per_sec` relative to `baseline_it_per_sec`.
pub fn overhead_ratio(it_per_sec: f64, baseline_it_per_sec: f64) -> f64 {
    if it_per_sec > 0.0 {
        baseline_it_per_sec / it_per_sec
    } else {
        f64::INFINITY
    }
}

/// Groups records by requested configuration, keeping first-seen order.
pub fn group_by_configuration(
    results: &[ResultRecord],
) -> Vec<(RunConfiguration, Vec<&ResultRecord>)> {
    let mut groups: Vec<(RunConfiguration, Vec<&ResultRecord>)> = Vec::new();
    for record in results {
        let config = record.configuration();
        match groups.iter_mut().find(|(existing, _)| *existing == config) {
            Some((_, records)) => records.push(record),
            None => groups.push((config, vec![record])),
        }
    }
    groups
}

/// Prints detailed performance analysis
///
/// For every configuration the first candidate is the baseline the others are
/// compared against.
pub fn print_performance_analysis(results: &[ResultRecord]) {
    if results.is_empty() {
        return;
    }

    println!("\n{}", "=".repeat(80));
    println!("Detailed Results");
    println!("{}", "=".repeat(80));

    for (config, records) in group_by_configuration(results) {
        println!("\n📊 {}", config);
        let baseline = records[0];

        for record in &records {
            println!(
                "   {}: {:.3} s, {:.1} it/s, {:.3} GB peak",
                record.candidate, record.run_time, record.it_per_sec, record.peak_memory
            );
            if record.backoff_reductions > 0 {
                println!(
                    "      ran at batch size {} after {} reduction(s)",
                    record.executed_batch_size, record.backoff_reductions
                );
            }
            if record.candidate != baseline.candidate {
                let ratio = overhead_ratio(record.it_per_sec, baseline.it_per_sec);
                println!(
                    "      vs {}: {:.2}x ({:.1}%)",
                    baseline.candidate,
                    ratio,
                    (ratio - 1.0) * 100.0
                );
            }
        }
    }

    println!("\n{}", "=".repeat(80));
    println!("Performance Analysis");
    println!("{}", "=".repeat(80));

    println!("\n🚀 Speed Rankings (mean it/s, fastest to slowest):");
    let mut rankings: Vec<(&str, f64, usize)> = Vec::new();
    for record in results {
        match rankings
            .iter_mut()
            .find(|(name, _, _)| *name == record.candidate.as_str())
        {
            Some((_, total, count)) => {
                *total += record.it_per_sec;
                *count += 1;
            }
            None => rankings.push((record.candidate.as_str(), record.it_per_sec, 1)),
        }
    }
    let mut rankings: Vec<(&str, f64)> = rankings
        .into_iter()
        .map(|(name, total, count)| (name, total / count as f64))
        .collect();
    rankings.sort_by(|a, b| b.1.total_cmp(&a.1));

    for (i, (name, mean)) in rankings.iter().enumerate() {
        let rank_emoji = match i {
            0 => "🥇",
            1 => "🥈",
            2 => "🥉",
            _ => "  ",
        };
        println!("   {} {}: {:.1} it/s", rank_emoji, name, mean);
    }
}
