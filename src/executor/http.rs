//! HTTP transport for the execution sidecar.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use crate::config::SidecarConfig;
use crate::error::{DraymanError, Result};
use crate::executor::Executor;
use crate::job::{ExecutionReport, JobPayload};

/// Extra attempts after the first request fails with a retryable error.
const TRANSPORT_RETRIES: u32 = 3;
/// Deadline for health probes.
const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Deserialize)]
struct HealthReport {
    status: String,
    #[serde(default)]
    rails_loaded: bool,
}

/// Executes jobs via `POST <base><execute_path>` with JSON bodies.
///
/// Connection failures and 5xx responses are retried up to three extra
/// times with `attempt^2 * 100ms` backoff; 4xx responses are returned
/// immediately as non-retryable errors.
pub struct HttpTransport {
    execute_url: String,
    health_url: String,
    client: reqwest::Client,
}

impl HttpTransport {
    /// Build the transport from sidecar configuration.
    pub fn new(config: &SidecarConfig) -> Result<Self> {
        let base = config.url.trim_end_matches('/');
        let path = if config.execute_path.starts_with('/') {
            config.execute_path.clone()
        } else {
            format!("/{}", config.execute_path)
        };
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;

        Ok(Self {
            execute_url: format!("{}{}", base, path),
            health_url: format!("{}/health", base),
            client,
        })
    }
}

#[async_trait]
impl Executor for HttpTransport {
    async fn execute(&self, job: &JobPayload) -> Result<ExecutionReport> {
        let mut last_error = String::new();

        for attempt in 0..=TRANSPORT_RETRIES {
            if attempt > 0 {
                let backoff = Duration::from_millis(u64::from(attempt * attempt) * 100);
                tokio::time::sleep(backoff).await;
            }

            let response = match self.client.post(&self.execute_url).json(job).send().await {
                Ok(response) => response,
                Err(e) => {
                    last_error = e.to_string();
                    tracing::debug!(
                        jid = %job.jid,
                        attempt = attempt + 1,
                        error = %e,
                        "execute request failed"
                    );
                    continue;
                }
            };

            let status = response.status();
            if status.is_server_error() {
                last_error = format!("server error: status {}", status.as_u16());
                tracing::debug!(jid = %job.jid, attempt = attempt + 1, status = status.as_u16(), "execute returned server error");
                continue;
            }
            if status.is_client_error() {
                return Err(DraymanError::ExecutorRejected(status.as_u16()));
            }

            return Ok(response.json::<ExecutionReport>().await?);
        }

        Err(DraymanError::ExecutorUnavailable {
            attempts: TRANSPORT_RETRIES + 1,
            last_error,
        })
    }

    async fn health(&self) -> Result<()> {
        let response = self
            .client
            .get(&self.health_url)
            .timeout(HEALTH_TIMEOUT)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(DraymanError::Unhealthy(format!(
                "health endpoint returned status {}",
                status.as_u16()
            )));
        }

        let report: HealthReport = response.json().await?;
        if report.status != "ok" || !report.rails_loaded {
            return Err(DraymanError::Unhealthy(format!(
                "status={} rails_loaded={}",
                report.status, report.rails_loaded
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::ExecutionStatus;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn http_response(status_line: &str, body: &str) -> String {
        format!(
            "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status_line,
            body.len(),
            body
        )
    }

    /// Serve one canned response per accepted connection, counting hits.
    async fn spawn_stub(responses: Vec<String>) -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let hits_inner = Arc::clone(&hits);

        tokio::spawn(async move {
            for response in responses {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };
                hits_inner.fetch_add(1, Ordering::SeqCst);
                let mut buf = [0u8; 8192];
                let _ = socket.read(&mut buf).await;
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });

        (format!("http://{}", addr), hits)
    }

    fn transport_for(url: &str, timeout: Duration) -> HttpTransport {
        let config = SidecarConfig {
            url: url.to_string(),
            timeout,
            ..SidecarConfig::default()
        };
        HttpTransport::new(&config).unwrap()
    }

    fn job() -> JobPayload {
        JobPayload::new("TestJob", vec![serde_json::json!("arg1")], "default")
    }

    #[test]
    fn test_url_joining() {
        let mut config = SidecarConfig {
            url: "http://sidecar:3000/".to_string(),
            ..SidecarConfig::default()
        };
        config.execute_path = "jobs/execute".to_string();
        let transport = HttpTransport::new(&config).unwrap();
        assert_eq!(transport.execute_url, "http://sidecar:3000/jobs/execute");
        assert_eq!(transport.health_url, "http://sidecar:3000/health");
    }

    #[tokio::test]
    async fn test_execute_success() {
        let body = r#"{"status":"success","result":"done","execution_time":1.23}"#;
        let (url, hits) = spawn_stub(vec![http_response("200 OK", body)]).await;

        let transport = transport_for(&url, Duration::from_secs(5));
        let report = transport.execute(&job()).await.unwrap();

        assert_eq!(report.status, ExecutionStatus::Success);
        assert_eq!(report.execution_time, 1.23);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_execute_failure_report_is_not_an_error() {
        let body = r#"{"status":"failure","execution_time":0.5,"error_message":"job blew up"}"#;
        let (url, hits) = spawn_stub(vec![http_response("200 OK", body)]).await;

        let transport = transport_for(&url, Duration::from_secs(5));
        let report = transport.execute(&job()).await.unwrap();

        assert_eq!(report.status, ExecutionStatus::Failure);
        assert_eq!(report.error_message.as_deref(), Some("job blew up"));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_execute_retries_server_errors_then_succeeds() {
        let ok = r#"{"status":"success","execution_time":0.1}"#;
        let (url, hits) = spawn_stub(vec![
            http_response("500 Internal Server Error", "boom"),
            http_response("500 Internal Server Error", "boom"),
            http_response("200 OK", ok),
        ])
        .await;

        let transport = transport_for(&url, Duration::from_secs(5));
        let report = transport.execute(&job()).await.unwrap();

        assert_eq!(report.status, ExecutionStatus::Success);
        assert_eq!(hits.load(Ordering::SeqCst), 3, "expected exactly 3 requests");
    }

    #[tokio::test]
    async fn test_execute_exhausts_retries() {
        let (url, hits) = spawn_stub(vec![
            http_response("500 Internal Server Error", "boom"),
            http_response("500 Internal Server Error", "boom"),
            http_response("500 Internal Server Error", "boom"),
            http_response("500 Internal Server Error", "boom"),
        ])
        .await;

        let transport = transport_for(&url, Duration::from_secs(5));
        let err = transport.execute(&job()).await.unwrap_err();

        assert!(matches!(
            err,
            DraymanError::ExecutorUnavailable { attempts: 4, .. }
        ));
        assert_eq!(hits.load(Ordering::SeqCst), 4, "1 initial + 3 retries");
    }

    #[tokio::test]
    async fn test_execute_does_not_retry_client_errors() {
        let (url, hits) = spawn_stub(vec![
            http_response("400 Bad Request", "bad"),
            http_response("400 Bad Request", "bad"),
        ])
        .await;

        let transport = transport_for(&url, Duration::from_secs(5));
        let err = transport.execute(&job()).await.unwrap_err();

        assert!(matches!(err, DraymanError::ExecutorRejected(400)));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_execute_times_out() {
        // Accept connections but never answer.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let transport = transport_for(&format!("http://{}", addr), Duration::from_millis(100));
        let err = transport.execute(&job()).await.unwrap_err();
        assert!(matches!(err, DraymanError::ExecutorUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_health_ok() {
        let body = r#"{"status":"ok","rails_loaded":true}"#;
        let (url, _) = spawn_stub(vec![http_response("200 OK", body)]).await;

        let transport = transport_for(&url, Duration::from_secs(5));
        transport.health().await.unwrap();
    }

    #[tokio::test]
    async fn test_health_rejects_unloaded_runtime() {
        let body = r#"{"status":"ok","rails_loaded":false}"#;
        let (url, _) = spawn_stub(vec![http_response("200 OK", body)]).await;

        let transport = transport_for(&url, Duration::from_secs(5));
        let err = transport.health().await.unwrap_err();
        assert!(matches!(err, DraymanError::Unhealthy(_)));
    }

    #[tokio::test]
    async fn test_health_connection_refused() {
        // Bind then drop to get an address nothing listens on.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let transport = transport_for(&format!("http://{}", addr), Duration::from_secs(1));
        assert!(transport.health().await.is_err());
    }
}
