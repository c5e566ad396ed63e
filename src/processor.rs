//! Concurrent job processor: admission, execution tasks, shutdown.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use crate::error::{DraymanError, Result};
use crate::executor::Executor;
use crate::job::{ExecutionStatus, JobPayload};
use crate::retry::{Decision, Outcome, RetryPolicy};
use crate::semaphore::Semaphore;
use crate::store::JobStore;

/// Runs admitted jobs on their own tasks, bounded by the semaphore.
///
/// `submit` returns as soon as a token is acquired; the spawned task owns
/// the record through execution, maps the outcome through the retry
/// policy, applies the resulting store action, and releases the token.
pub struct Processor {
    semaphore: Arc<Semaphore>,
    executor: Arc<dyn Executor>,
    store: Arc<dyn JobStore>,
    policy: Arc<RetryPolicy>,
    admission: CancellationToken,
    running: AtomicBool,
}

impl Processor {
    /// Create a processor with the given concurrency cap.
    pub fn new(
        concurrency: usize,
        executor: Arc<dyn Executor>,
        store: Arc<dyn JobStore>,
        policy: Arc<RetryPolicy>,
    ) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(concurrency)),
            executor,
            store,
            policy,
            admission: CancellationToken::new(),
            running: AtomicBool::new(true),
        }
    }

    /// Admit a job and spawn its execution task.
    ///
    /// Blocks on the semaphore; this is the orchestrator's backpressure
    /// point. The only errors are [`DraymanError::Shutdown`] and
    /// [`DraymanError::Cancelled`] — job-content problems flow through the
    /// task as execution outcomes.
    pub async fn submit(&self, job: JobPayload) -> Result<()> {
        if !self.running.load(Ordering::SeqCst) {
            return Err(DraymanError::Shutdown);
        }
        if !self.semaphore.acquire(&self.admission).await {
            return Err(DraymanError::Cancelled);
        }

        let semaphore = Arc::clone(&self.semaphore);
        let executor = Arc::clone(&self.executor);
        let store = Arc::clone(&self.store);
        let policy = Arc::clone(&self.policy);
        tokio::spawn(async move {
            Self::run_job(executor, store, policy, job).await;
            semaphore.release();
        });
        Ok(())
    }

    async fn run_job(
        executor: Arc<dyn Executor>,
        store: Arc<dyn JobStore>,
        policy: Arc<RetryPolicy>,
        mut job: JobPayload,
    ) {
        let started = Instant::now();
        tracing::debug!(jid = %job.jid, class = %job.class, queue = %job.queue, "executing job");

        let outcome = match executor.execute(&job).await {
            Ok(report) => match report.status {
                ExecutionStatus::Success => {
                    tracing::info!(
                        jid = %job.jid,
                        class = %job.class,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        execution_time = report.execution_time,
                        "job succeeded"
                    );
                    Outcome::Success
                }
                ExecutionStatus::Failure => {
                    job.error_message = report.error_message.clone();
                    tracing::warn!(
                        jid = %job.jid,
                        class = %job.class,
                        error = report.error_message.as_deref().unwrap_or("unknown"),
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "job reported failure"
                    );
                    Outcome::ExecutionFailure
                }
            },
            Err(e) => {
                job.error_message = Some(e.to_string());
                job.error_class = Some(e.error_class().to_string());
                tracing::warn!(
                    jid = %job.jid,
                    class = %job.class,
                    error = %e,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "executor call failed"
                );
                Outcome::TransportError
            }
        };

        match policy.decide(&job, outcome) {
            Decision::Drop => {}
            Decision::Schedule(delay) => {
                if let Err(e) = store.schedule_retry(&mut job, delay).await {
                    tracing::error!(jid = %job.jid, error = %e, "failed to schedule retry");
                }
            }
            Decision::Dead => {
                if let Err(e) = store.move_to_dead(&mut job).await {
                    tracing::error!(jid = %job.jid, error = %e, "failed to move job to dead set");
                } else {
                    tracing::warn!(jid = %job.jid, retry = job.retry, "job moved to dead set");
                }
            }
        }
    }

    /// Number of jobs currently in flight.
    pub fn active(&self) -> usize {
        self.semaphore.active()
    }

    /// Concurrency cap.
    pub fn capacity(&self) -> usize {
        self.semaphore.capacity()
    }

    /// Whether new submissions are accepted.
    pub fn running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Stop admissions and wait for in-flight jobs to drain.
    ///
    /// Cancels any blocked `submit` call, then waits for the active count
    /// to reach zero. On deadline expiry returns
    /// [`DraymanError::ShutdownTimeout`]; still-executing tasks finish on
    /// their own and release their tokens.
    pub async fn shutdown(&self, deadline: Duration) -> Result<()> {
        if !self.running.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        tracing::info!(deadline_secs = deadline.as_secs_f64(), "processor draining");
        self.admission.cancel();

        if self.semaphore.wait_with_timeout(deadline).await {
            tracing::info!("processor drained");
            Ok(())
        } else {
            tracing::warn!(active = self.active(), "drain deadline exceeded");
            Err(DraymanError::ShutdownTimeout)
        }
    }
}
