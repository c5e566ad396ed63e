//! Error types for the drayman orchestrator.

use thiserror::Error;

/// The main error type for the drayman crate.
#[derive(Error, Debug)]
pub enum DraymanError {
    /// Redis connection or operation error.
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// JSON serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP transport error talking to the execution sidecar.
    #[error("http transport error: {0}")]
    Http(#[from] reqwest::Error),

    /// gRPC channel could not be established.
    #[error("grpc transport error: {0}")]
    GrpcTransport(#[from] tonic::transport::Error),

    /// gRPC call failed.
    #[error("grpc call failed: {0}")]
    Grpc(#[from] tonic::Status),

    /// The sidecar rejected the request; not retryable at the transport level.
    #[error("executor rejected request: status {0}")]
    ExecutorRejected(u16),

    /// Transport retries against the sidecar were exhausted.
    #[error("executor unavailable after {attempts} attempts: {last_error}")]
    ExecutorUnavailable { attempts: u32, last_error: String },

    /// The per-request deadline elapsed before the sidecar answered.
    #[error("executor request timed out after {0:?}")]
    ExecutorTimeout(std::time::Duration),

    /// The circuit breaker is open; the sidecar was not contacted.
    #[error("circuit breaker is open")]
    CircuitOpen,

    /// The sidecar answered its health check but reported itself unhealthy.
    #[error("executor unhealthy: {0}")]
    Unhealthy(String),

    /// Submission rejected because the processor is shutting down.
    #[error("processor is shutting down")]
    Shutdown,

    /// Admission was cancelled while waiting for a slot.
    #[error("admission cancelled")]
    Cancelled,

    /// In-flight work did not drain before the shutdown deadline.
    #[error("shutdown timeout exceeded")]
    ShutdownTimeout,

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Configuration file could not be read.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file could not be parsed.
    #[error("config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),
}

impl DraymanError {
    /// Short classification written into a failed record's `error_class`.
    pub fn error_class(&self) -> &'static str {
        match self {
            DraymanError::Redis(_) => "RedisError",
            DraymanError::Serialization(_) => "SerializationError",
            DraymanError::Http(_) => "HttpTransportError",
            DraymanError::GrpcTransport(_) | DraymanError::Grpc(_) => "GrpcTransportError",
            DraymanError::ExecutorRejected(_) => "ExecutorRejected",
            DraymanError::ExecutorUnavailable { .. } => "ExecutorUnavailable",
            DraymanError::ExecutorTimeout(_) => "ExecutorTimeout",
            DraymanError::CircuitOpen => "CircuitOpen",
            DraymanError::Unhealthy(_) => "ExecutorUnhealthy",
            DraymanError::Shutdown => "Shutdown",
            DraymanError::Cancelled => "Cancelled",
            DraymanError::ShutdownTimeout => "ShutdownTimeout",
            DraymanError::Config(_) | DraymanError::ConfigParse(_) => "ConfigError",
            DraymanError::Io(_) => "IoError",
        }
    }
}

/// Result type alias using DraymanError.
pub type Result<T> = std::result::Result<T, DraymanError>;
