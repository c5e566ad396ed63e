//! Job-level retry policy: retry with backoff, or move to the dead set.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Mutex;
use std::time::Duration;

use crate::config::RetryConfig;
use crate::job::JobPayload;

/// How one execution attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The sidecar ran the job and reported success.
    Success,
    /// The sidecar could not be reached, timed out, or the circuit was open.
    TransportError,
    /// The sidecar ran the job and reported failure.
    ExecutionFailure,
}

/// What to do with a completed job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Success; the record is dropped.
    Drop,
    /// Schedule another attempt after the given delay.
    Schedule(Duration),
    /// Retry budget exhausted; move to the dead set.
    Dead,
}

/// Decides retry-vs-dead and computes backoff delays.
///
/// Delays grow as `base_delay * 2^(n-1)` clamped to `max_delay`, with a
/// uniform additive jitter of up to 25% so retry storms spread out. The
/// policy is deterministic for a given RNG seed.
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
    rng: Mutex<StdRng>,
}

impl RetryPolicy {
    /// Create a policy from retry configuration.
    pub fn new(config: &RetryConfig) -> Self {
        Self::with_rng(config, StdRng::from_entropy())
    }

    /// Create a policy with a fixed RNG seed.
    pub fn with_seed(config: &RetryConfig, seed: u64) -> Self {
        Self::with_rng(config, StdRng::seed_from_u64(seed))
    }

    fn with_rng(config: &RetryConfig, rng: StdRng) -> Self {
        Self {
            max_attempts: config.max_attempts,
            base_delay: config.base_delay,
            max_delay: config.max_delay,
            rng: Mutex::new(rng),
        }
    }

    /// Decide what happens to `job` after an attempt with the given outcome.
    pub fn decide(&self, job: &JobPayload, outcome: Outcome) -> Decision {
        if outcome == Outcome::Success {
            return Decision::Drop;
        }
        let max_attempts = self.max_attempts_for(job);
        let attempt = self.attempts_consumed(job) + 1;
        if attempt > max_attempts {
            Decision::Dead
        } else {
            Decision::Schedule(self.delay(attempt))
        }
    }

    /// Effective attempt cap for this job.
    ///
    /// A non-zero `retry` on a record that has never failed is the
    /// producer's per-job cap; once the orchestrator starts counting
    /// attempts in that field, the configured cap applies.
    fn max_attempts_for(&self, job: &JobPayload) -> u32 {
        if job.failed_at.is_none() && job.retry > 0 {
            job.retry
        } else {
            self.max_attempts
        }
    }

    fn attempts_consumed(&self, job: &JobPayload) -> u32 {
        if job.failed_at.is_none() {
            0
        } else {
            job.retry
        }
    }

    /// Backoff delay for the n-th attempt (1-based), jitter included.
    fn delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(62) as i32;
        let raw = self.base_delay.as_secs_f64() * 2f64.powi(exponent);
        let capped = raw.min(self.max_delay.as_secs_f64());
        let jitter: f64 = {
            let mut rng = self
                .rng
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            rng.gen_range(0.0..=0.25)
        };
        Duration::from_secs_f64(capped * (1.0 + jitter))
    }
}
