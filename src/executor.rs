//! Executor client: transport selection and circuit breaking.

use async_trait::async_trait;

use crate::breaker::CircuitBreaker;
use crate::config::{SidecarConfig, SidecarProtocol};
use crate::error::{DraymanError, Result};
use crate::job::{ExecutionReport, JobPayload};

pub mod grpc;
pub mod http;

/// A client capable of running jobs on the execution sidecar.
#[async_trait]
pub trait Executor: Send + Sync {
    /// Run one job and return the sidecar's report.
    ///
    /// An `Err` is a transport problem; a report with `status = failure`
    /// is a normal return and feeds the job-level retry policy.
    async fn execute(&self, job: &JobPayload) -> Result<ExecutionReport>;

    /// Probe the sidecar's health endpoint.
    async fn health(&self) -> Result<()>;
}

/// Breaker-guarded executor client over the configured transport.
///
/// Every call passes through the circuit breaker; when the breaker is open
/// the sidecar is not contacted at all and `execute` fails with
/// [`DraymanError::CircuitOpen`].
pub struct SidecarClient {
    transport: Box<dyn Executor>,
    breaker: CircuitBreaker,
}

impl SidecarClient {
    /// Build a client for the configured transport with default breaker
    /// thresholds.
    pub fn connect(config: &SidecarConfig) -> Result<Self> {
        let transport: Box<dyn Executor> = match config.protocol {
            SidecarProtocol::Http => Box::new(http::HttpTransport::new(config)?),
            SidecarProtocol::Grpc => Box::new(grpc::GrpcTransport::new(config)?),
        };
        Ok(Self::with_transport(transport, CircuitBreaker::default()))
    }

    /// Build a client around an explicit transport and breaker.
    pub fn with_transport(transport: Box<dyn Executor>, breaker: CircuitBreaker) -> Self {
        Self { transport, breaker }
    }

    /// The breaker guarding this client.
    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }
}

#[async_trait]
impl Executor for SidecarClient {
    async fn execute(&self, job: &JobPayload) -> Result<ExecutionReport> {
        if !self.breaker.allow_request() {
            return Err(DraymanError::CircuitOpen);
        }
        match self.transport.execute(job).await {
            Ok(report) => {
                // A failure *report* still means the transport is healthy.
                self.breaker.record_success();
                Ok(report)
            }
            Err(e) => {
                self.breaker.record_failure();
                Err(e)
            }
        }
    }

    async fn health(&self) -> Result<()> {
        self.transport.health().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::breaker::BreakerState;
    use crate::job::ExecutionStatus;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    struct FlakyTransport {
        calls: Arc<AtomicUsize>,
        fail: bool,
    }

    #[async_trait]
    impl Executor for FlakyTransport {
        async fn execute(&self, _job: &JobPayload) -> Result<ExecutionReport> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(DraymanError::ExecutorUnavailable {
                    attempts: 4,
                    last_error: "status 500".to_string(),
                })
            } else {
                Ok(ExecutionReport {
                    status: ExecutionStatus::Success,
                    result: None,
                    execution_time: 0.01,
                    error_message: None,
                })
            }
        }

        async fn health(&self) -> Result<()> {
            Ok(())
        }
    }

    fn job() -> JobPayload {
        JobPayload::new("TestJob", vec![], "default")
    }

    #[tokio::test]
    async fn test_open_breaker_short_circuits() {
        let calls = Arc::new(AtomicUsize::new(0));
        let transport = Box::new(FlakyTransport {
            calls: Arc::clone(&calls),
            fail: true,
        });
        let client = SidecarClient::with_transport(
            transport,
            CircuitBreaker::new(2, Duration::from_secs(30)),
        );

        for _ in 0..2 {
            assert!(client.execute(&job()).await.is_err());
        }
        assert_eq!(client.breaker().state(), BreakerState::Open);

        // Third call fails fast without reaching the transport.
        let err = client.execute(&job()).await.unwrap_err();
        assert!(matches!(err, DraymanError::CircuitOpen));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_success_keeps_breaker_closed() {
        let transport = Box::new(FlakyTransport {
            calls: Arc::new(AtomicUsize::new(0)),
            fail: false,
        });
        let client = SidecarClient::with_transport(
            transport,
            CircuitBreaker::new(2, Duration::from_secs(30)),
        );

        let report = client.execute(&job()).await.unwrap();
        assert_eq!(report.status, ExecutionStatus::Success);
        assert_eq!(client.breaker().state(), BreakerState::Closed);
    }
}
