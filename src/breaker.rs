//! Circuit breaker guarding calls to the execution sidecar.

use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Failures tolerated before the circuit opens.
pub const DEFAULT_MAX_FAILURES: u32 = 5;
/// Cooling-off period before an open circuit admits a probe request.
pub const DEFAULT_RESET_TIMEOUT: Duration = Duration::from_secs(30);

/// State of the circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    /// Requests flow normally.
    Closed,
    /// Requests are blocked until the reset timeout elapses.
    Open,
    /// One probe request is in flight to test recovery.
    HalfOpen,
}

#[derive(Debug)]
struct Inner {
    state: BreakerState,
    failures: u32,
    last_failure: Option<Instant>,
}

/// Three-state circuit breaker.
///
/// Consecutive failures up to `max_failures` open the circuit; after
/// `reset_timeout` the next request is admitted as a probe (half-open) and
/// its outcome decides whether the circuit closes again or re-opens.
#[derive(Debug)]
pub struct CircuitBreaker {
    max_failures: u32,
    reset_timeout: Duration,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    /// Create a breaker with the given thresholds.
    pub fn new(max_failures: u32, reset_timeout: Duration) -> Self {
        Self {
            max_failures: max_failures.max(1),
            reset_timeout,
            inner: Mutex::new(Inner {
                state: BreakerState::Closed,
                failures: 0,
                last_failure: None,
            }),
        }
    }

    /// Whether a request may proceed right now.
    ///
    /// An open circuit whose reset timeout has elapsed transitions to
    /// half-open and admits the caller as the probe.
    pub fn allow_request(&self) -> bool {
        let mut inner = self.lock();
        match inner.state {
            BreakerState::Closed | BreakerState::HalfOpen => true,
            BreakerState::Open => {
                let cooled_down = inner
                    .last_failure
                    .map(|at| at.elapsed() >= self.reset_timeout)
                    .unwrap_or(true);
                if cooled_down {
                    inner.state = BreakerState::HalfOpen;
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Record a successful request; closes the circuit and clears failures.
    pub fn record_success(&self) {
        let mut inner = self.lock();
        inner.failures = 0;
        inner.state = BreakerState::Closed;
    }

    /// Record a failed request.
    ///
    /// Opens the circuit when the failure count reaches the threshold, or
    /// immediately when the failed request was a half-open probe.
    pub fn record_failure(&self) {
        let mut inner = self.lock();
        inner.failures += 1;
        inner.last_failure = Some(Instant::now());
        if inner.state == BreakerState::HalfOpen || inner.failures >= self.max_failures {
            inner.state = BreakerState::Open;
        }
    }

    /// Current breaker state.
    pub fn state(&self) -> BreakerState {
        self.lock().state
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FAILURES, DEFAULT_RESET_TIMEOUT)
    }
}
