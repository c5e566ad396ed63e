//! Periodic promotion of due schedule entries back onto their queues.

use std::sync::Arc;
use std::time::Duration;
use tokio::time;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::store::JobStore;

/// Sweeps the schedule set and requeues entries whose time has come.
pub struct Scheduler {
    store: Arc<dyn JobStore>,
    interval: Duration,
    cancel: CancellationToken,
}

impl Scheduler {
    /// Create a new Scheduler.
    pub fn new(store: Arc<dyn JobStore>, interval: Duration, cancel: CancellationToken) -> Self {
        Self {
            store,
            interval,
            cancel,
        }
    }

    /// Run the sweep loop until cancelled.
    ///
    /// Cancellation interrupts the inter-sweep sleep, so the loop exits
    /// promptly instead of waiting out the interval.
    pub async fn run(&self) {
        tracing::info!(interval_secs = self.interval.as_secs_f64(), "scheduler started");

        loop {
            if self.cancel.is_cancelled() {
                break;
            }
            if let Err(e) = self.tick().await {
                tracing::warn!(error = %e, "schedule sweep failed");
            }
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = time::sleep(self.interval) => {}
            }
        }

        tracing::info!("scheduler stopped");
    }

    /// Process one sweep.
    async fn tick(&self) -> Result<()> {
        let promoted = self.store.promote_scheduled().await?;
        if promoted > 0 {
            tracing::debug!(count = promoted, "promoted scheduled jobs");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::JobPayload;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;

    #[derive(Default)]
    struct CountingStore {
        sweeps: AtomicUsize,
    }

    #[async_trait]
    impl JobStore for CountingStore {
        async fn poll(&self, _queues: &[String]) -> Result<Option<JobPayload>> {
            Ok(None)
        }

        async fn schedule_retry(&self, _job: &mut JobPayload, _delay: Duration) -> Result<()> {
            Ok(())
        }

        async fn move_to_dead(&self, _job: &mut JobPayload) -> Result<()> {
            Ok(())
        }

        async fn promote_scheduled(&self) -> Result<usize> {
            self.sweeps.fetch_add(1, Ordering::SeqCst);
            Ok(0)
        }

        async fn queue_size(&self, _queue: &str) -> Result<usize> {
            Ok(0)
        }

        async fn close(&self) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_cancellation_interrupts_sleep() {
        let store = Arc::new(CountingStore::default());
        let cancel = CancellationToken::new();
        let scheduler = Scheduler::new(
            Arc::clone(&store) as Arc<dyn JobStore>,
            Duration::from_secs(10),
            cancel.clone(),
        );

        let runner = tokio::spawn(async move { scheduler.run().await });
        tokio::time::sleep(Duration::from_millis(20)).await;

        let start = Instant::now();
        cancel.cancel();
        runner.await.unwrap();

        // The loop must wake from its 10s sleep immediately, not ride it out.
        assert!(start.elapsed() < Duration::from_millis(500));
        assert_eq!(store.sweeps.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_pre_cancelled_scheduler_never_sweeps() {
        let store = Arc::new(CountingStore::default());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let scheduler = Scheduler::new(
            Arc::clone(&store) as Arc<dyn JobStore>,
            Duration::from_millis(10),
            cancel,
        );
        scheduler.run().await;

        assert_eq!(store.sweeps.load(Ordering::SeqCst), 0);
    }
}
