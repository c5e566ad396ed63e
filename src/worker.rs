//! Orchestrator: poll loop, background sweeps, and lifecycle management.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::error::{DraymanError, Result};
use crate::executor::{Executor, SidecarClient};
use crate::processor::Processor;
use crate::retry::RetryPolicy;
use crate::scheduler::Scheduler;
use crate::store::redis::RedisStore;
use crate::store::JobStore;

/// Pause after a failed poll before trying again.
const POLL_ERROR_BACKOFF: Duration = Duration::from_secs(1);

/// Top-level supervisor owning the poll loop and the lifecycle of the
/// processor, scheduler, and clients.
pub struct Orchestrator {
    config: Config,
    store: Arc<dyn JobStore>,
    executor: Arc<dyn Executor>,
    processor: Arc<Processor>,
    cancel: CancellationToken,
}

impl Orchestrator {
    /// Connect to the store and sidecar described by `config`.
    pub async fn connect(config: Config) -> Result<Self> {
        let store: Arc<dyn JobStore> = Arc::new(RedisStore::connect(&config.redis).await?);
        let executor: Arc<dyn Executor> = Arc::new(SidecarClient::connect(&config.sidecar)?);
        Ok(Self::with_parts(config, store, executor))
    }

    /// Assemble an orchestrator from pre-built collaborators.
    pub fn with_parts(
        config: Config,
        store: Arc<dyn JobStore>,
        executor: Arc<dyn Executor>,
    ) -> Self {
        let policy = Arc::new(RetryPolicy::new(&config.retry));
        let processor = Arc::new(Processor::new(
            config.worker.concurrency,
            Arc::clone(&executor),
            Arc::clone(&store),
            policy,
        ));
        Self {
            config,
            store,
            executor,
            processor,
            cancel: CancellationToken::new(),
        }
    }

    /// The processor driving job execution.
    pub fn processor(&self) -> &Arc<Processor> {
        &self.processor
    }

    /// Run until an interrupt or terminate signal arrives, then drain.
    pub async fn run(&self) -> Result<()> {
        self.run_until(shutdown_signal()).await
    }

    /// Run until the provided future resolves, then drain.
    pub async fn run_until<S>(&self, shutdown: S) -> Result<()>
    where
        S: Future<Output = ()> + Send,
    {
        match self.executor.health().await {
            Ok(()) => tracing::info!("executor healthy"),
            Err(e) => tracing::warn!(error = %e, "executor health check failed"),
        }
        for queue in &self.config.worker.queues {
            match self.store.queue_size(queue).await {
                Ok(depth) => tracing::debug!(queue = %queue, depth, "queue depth at startup"),
                Err(e) => tracing::warn!(queue = %queue, error = %e, "failed to read queue depth"),
            }
        }

        let mut tasks = JoinSet::new();

        {
            let store = Arc::clone(&self.store);
            let processor = Arc::clone(&self.processor);
            let queues = self.config.worker.queues.clone();
            let poll_interval = self.config.worker.poll_interval;
            let cancel = self.cancel.clone();
            tasks.spawn(async move {
                poll_loop(store, processor, queues, poll_interval, cancel).await;
            });
        }

        let scheduler = Scheduler::new(
            Arc::clone(&self.store),
            self.config.worker.promote_interval,
            self.cancel.clone(),
        );
        tasks.spawn(async move { scheduler.run().await });

        tracing::info!(
            concurrency = self.config.worker.concurrency,
            queues = ?self.config.worker.queues,
            "orchestrator started"
        );

        shutdown.await;
        tracing::info!("shutdown requested, draining");

        self.cancel.cancel();
        let drained = self
            .processor
            .shutdown(self.config.worker.shutdown_timeout)
            .await;

        while let Some(result) = tasks.join_next().await {
            if let Err(e) = result {
                tracing::error!(error = %e, "task panicked");
            }
        }

        if let Err(e) = self.store.close().await {
            tracing::warn!(error = %e, "failed to close store");
        }

        tracing::info!("orchestrator stopped");
        drained
    }
}

/// Pull jobs from the store and feed them to the processor.
async fn poll_loop(
    store: Arc<dyn JobStore>,
    processor: Arc<Processor>,
    queues: Vec<String>,
    poll_interval: Duration,
    cancel: CancellationToken,
) {
    tracing::info!(queues = ?queues, "poll loop started");

    loop {
        if cancel.is_cancelled() {
            break;
        }

        match store.poll(&queues).await {
            Ok(Some(job)) => match processor.submit(job).await {
                Ok(()) => {}
                Err(DraymanError::Shutdown) | Err(DraymanError::Cancelled) => break,
                Err(e) => tracing::warn!(error = %e, "failed to submit job"),
            },
            Ok(None) => {
                tokio::time::sleep(poll_interval).await;
            }
            // An undecodable payload is already consumed; there is no jid
            // to retry under, so it is dropped.
            Err(DraymanError::Serialization(e)) => {
                tracing::error!(error = %e, "dropping undecodable job payload");
            }
            Err(e) => {
                tracing::warn!(error = %e, "polling failed");
                tokio::time::sleep(POLL_ERROR_BACKOFF).await;
            }
        }
    }

    tracing::info!("poll loop stopped");
}

/// Resolve when an interrupt or terminate signal arrives.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let sigterm = signal(SignalKind::terminate());
        let sigint = signal(SignalKind::interrupt());
        match (sigterm, sigint) {
            (Ok(mut sigterm), Ok(mut sigint)) => {
                tokio::select! {
                    _ = sigterm.recv() => tracing::info!("SIGTERM received"),
                    _ = sigint.recv() => tracing::info!("SIGINT received"),
                }
            }
            _ => {
                tracing::error!("failed to install signal handlers, falling back to ctrl-c");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.ok();
        tracing::info!("ctrl-c received");
    }
}
