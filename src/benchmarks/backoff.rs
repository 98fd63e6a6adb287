//! Out-of-memory recovery by repeatedly halving the batch size.

use super::benchmark_types::RunConfiguration;
use crate::errors::BenchmarkResult;
use log::warn;

/// Whether a run may shrink its batch size after running out of memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackoffPolicy {
    #[default]
    Enabled,
    Disabled,
}

impl BackoffPolicy {
    pub fn from_enabled(enabled: bool) -> Self {
        if enabled {
            BackoffPolicy::Enabled
        } else {
            BackoffPolicy::Disabled
        }
    }

    pub fn is_enabled(self) -> bool {
        self == BackoffPolicy::Enabled
    }
}

/// A run that eventually succeeded, possibly at a reduced batch size.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffOutcome {
    pub run_time: f64,
    /// The configuration that actually ran.
    pub executed: RunConfiguration,
    /// How many times the batch size was halved.
    pub reductions: u32,
}

/// Calls `run` with `config`, halving the batch size (rounding down) after
/// every out-of-memory failure until a run succeeds.
///
/// The caller's configuration is never modified; the one that ran is returned in
/// the outcome. With [`BackoffPolicy::Disabled`], or once the batch size is
/// already zero, the out-of-memory error is returned unchanged. Any other error
/// is returned immediately without a retry.
pub fn run_with_backoff<F>(
    config: &RunConfiguration,
    policy: BackoffPolicy,
    mut run: F,
) -> BenchmarkResult<BackoffOutcome>
where
    F: FnMut(&RunConfiguration) -> BenchmarkResult<f64>,
{
    let mut attempt = *config;
    let mut reductions = 0;

    loop {
        match run(&attempt) {
            Ok(run_time) => {
                return Ok(BackoffOutcome {
                    run_time,
                    executed: attempt,
                    reductions,
                });
            }
            Err(e)
                if e.is_resource_exhausted() && policy.is_enabled() && attempt.batch_size > 0 =>
            {
                let reduced = attempt.batch_size / 2;
                warn!(
                    "OOM, retrying; reducing batch size from {} to {}: {}",
                    attempt.batch_size, reduced, e
                );
                attempt = attempt.with_batch_size(reduced);
                reductions += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
