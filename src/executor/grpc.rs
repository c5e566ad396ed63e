//! gRPC transport for the execution sidecar.
//!
//! Message types and the unary client are written by hand against prost
//! and `tonic::client::Grpc`, so no protoc or build-time codegen is
//! involved. The wire contract mirrors the sidecar's `JobExecution`
//! service.

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

use crate::config::SidecarConfig;
use crate::error::{DraymanError, Result};
use crate::executor::Executor;
use crate::job::{ExecutionReport, ExecutionStatus, JobPayload};

use self::job_execution_client::JobExecutionClient;

/// Deadline for health probes.
const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

/// Execute request message.
#[derive(Clone, PartialEq, prost::Message)]
pub struct JobRequest {
    #[prost(string, tag = "1")]
    pub class: String,
    #[prost(string, tag = "2")]
    pub jid: String,
    #[prost(string, tag = "3")]
    pub queue: String,
    /// Arguments projected to strings; see [`coerce_arg`].
    #[prost(string, repeated, tag = "4")]
    pub args: Vec<String>,
    #[prost(double, tag = "5")]
    pub created_at: f64,
    #[prost(double, tag = "6")]
    pub enqueued_at: f64,
}

/// Execute response message.
#[derive(Clone, PartialEq, prost::Message)]
pub struct JobResponse {
    #[prost(string, tag = "1")]
    pub status: String,
    #[prost(string, tag = "2")]
    pub jid: String,
    #[prost(double, tag = "3")]
    pub execution_time: f64,
    #[prost(string, tag = "4")]
    pub error_message: String,
}

/// Health check request message.
#[derive(Clone, PartialEq, prost::Message)]
pub struct HealthRequest {}

/// Health check response message.
#[derive(Clone, PartialEq, prost::Message)]
pub struct HealthResponse {
    #[prost(string, tag = "1")]
    pub status: String,
    #[prost(bool, tag = "2")]
    pub rails_loaded: bool,
}

impl From<&JobPayload> for JobRequest {
    fn from(job: &JobPayload) -> Self {
        Self {
            class: job.class.clone(),
            jid: job.jid.clone(),
            queue: job.queue.clone(),
            args: job.args.iter().map(coerce_arg).collect(),
            created_at: job.created_at,
            enqueued_at: job.enqueued_at,
        }
    }
}

/// Project one JSON argument onto the string-typed wire field.
///
/// Strings pass through, numbers use their shortest decimal form, booleans
/// become `true`/`false`, null becomes the empty string, and composite
/// values are carried as compact JSON. The projection is lossy; callers
/// needing full fidelity use the HTTP transport.
fn coerce_arg(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        composite => composite.to_string(),
    }
}

/// Hand-rolled unary client for the `JobExecution` service.
pub mod job_execution_client {
    use super::{HealthRequest, HealthResponse, JobRequest, JobResponse};
    use tonic::codegen::*;

    #[derive(Debug, Clone)]
    pub struct JobExecutionClient<T> {
        inner: tonic::client::Grpc<T>,
    }

    impl JobExecutionClient<tonic::transport::Channel> {
        pub fn new(channel: tonic::transport::Channel) -> Self {
            Self {
                inner: tonic::client::Grpc::new(channel),
            }
        }
    }

    impl<T> JobExecutionClient<T>
    where
        T: tonic::client::GrpcService<tonic::body::BoxBody>,
        T::Error: Into<StdError> + std::fmt::Debug,
        T::ResponseBody: Body<Data = Bytes> + std::marker::Send + 'static,
        <T::ResponseBody as Body>::Error: Into<StdError> + std::marker::Send,
    {
        pub async fn execute_job(
            &mut self,
            request: impl tonic::IntoRequest<JobRequest>,
        ) -> std::result::Result<tonic::Response<JobResponse>, tonic::Status> {
            self.inner.ready().await.map_err(|e| {
                tonic::Status::unknown(format!("service not ready: {:?}", e))
            })?;
            let codec = tonic::codec::ProstCodec::default();
            let path =
                http::uri::PathAndQuery::from_static("/jobexecution.JobExecution/ExecuteJob");
            let mut req = request.into_request();
            req.extensions_mut()
                .insert(GrpcMethod::new("jobexecution.JobExecution", "ExecuteJob"));
            self.inner.unary(req, path, codec).await
        }

        pub async fn health_check(
            &mut self,
            request: impl tonic::IntoRequest<HealthRequest>,
        ) -> std::result::Result<tonic::Response<HealthResponse>, tonic::Status> {
            self.inner.ready().await.map_err(|e| {
                tonic::Status::unknown(format!("service not ready: {:?}", e))
            })?;
            let codec = tonic::codec::ProstCodec::default();
            let path =
                http::uri::PathAndQuery::from_static("/jobexecution.JobExecution/HealthCheck");
            let mut req = request.into_request();
            req.extensions_mut()
                .insert(GrpcMethod::new("jobexecution.JobExecution", "HealthCheck"));
            self.inner.unary(req, path, codec).await
        }
    }
}

/// Executes jobs over the sidecar's gRPC service.
pub struct GrpcTransport {
    client: JobExecutionClient<tonic::transport::Channel>,
    timeout: Duration,
}

impl GrpcTransport {
    /// Build the transport from sidecar configuration.
    ///
    /// The channel connects lazily; endpoint problems surface on the first
    /// call rather than at construction.
    pub fn new(config: &SidecarConfig) -> Result<Self> {
        let endpoint = tonic::transport::Endpoint::from_shared(config.url.clone())?;
        let channel = endpoint.connect_lazy();
        Ok(Self {
            client: JobExecutionClient::new(channel),
            timeout: config.timeout,
        })
    }
}

#[async_trait]
impl Executor for GrpcTransport {
    async fn execute(&self, job: &JobPayload) -> Result<ExecutionReport> {
        let request = JobRequest::from(job);
        let mut client = self.client.clone();

        let response = tokio::time::timeout(self.timeout, client.execute_job(request))
            .await
            .map_err(|_| DraymanError::ExecutorTimeout(self.timeout))??;
        let response = response.into_inner();

        let status = if response.status == "success" {
            ExecutionStatus::Success
        } else {
            ExecutionStatus::Failure
        };
        Ok(ExecutionReport {
            status,
            result: None,
            execution_time: response.execution_time,
            error_message: if response.error_message.is_empty() {
                None
            } else {
                Some(response.error_message)
            },
        })
    }

    async fn health(&self) -> Result<()> {
        let mut client = self.client.clone();
        let response = tokio::time::timeout(HEALTH_TIMEOUT, client.health_check(HealthRequest {}))
            .await
            .map_err(|_| DraymanError::ExecutorTimeout(HEALTH_TIMEOUT))??;
        let response = response.into_inner();

        if response.status != "ok" || !response.rails_loaded {
            return Err(DraymanError::Unhealthy(format!(
                "status={} rails_loaded={}",
                response.status, response.rails_loaded
            )));
        }
        Ok(())
    }
}
