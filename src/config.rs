//! Configuration types and file/environment loading.

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::error::{DraymanError, Result};

/// Complete configuration for the orchestrator.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub redis: RedisConfig,
    pub sidecar: SidecarConfig,
    pub worker: WorkerConfig,
    pub retry: RetryConfig,
}

/// Shared-store connection settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RedisConfig {
    /// Redis endpoint URL.
    pub url: String,
    /// Password override; applied on top of the URL when set.
    pub password: Option<String>,
    /// Database index override.
    pub db: i64,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379".to_string(),
            password: None,
            db: 0,
        }
    }
}

/// Which transport the executor client speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SidecarProtocol {
    Http,
    Grpc,
}

/// Execution sidecar connection settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SidecarConfig {
    /// Sidecar endpoint URL.
    pub url: String,
    /// Transport selection.
    pub protocol: SidecarProtocol,
    /// Per-request deadline, in fractional seconds.
    #[serde(with = "secs_serde")]
    pub timeout: Duration,
    /// HTTP execute path. Deployments fed by the legacy producer use
    /// `/jobs/execute`.
    pub execute_path: String,
}

impl Default for SidecarConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:3000".to_string(),
            protocol: SidecarProtocol::Http,
            timeout: Duration::from_secs(30),
            execute_path: "/execute".to_string(),
        }
    }
}

/// Worker behavior settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WorkerConfig {
    /// Maximum jobs in flight at once.
    pub concurrency: usize,
    /// Queues to drain, highest priority first.
    pub queues: Vec<String>,
    /// Idle sleep after an empty poll, in fractional seconds.
    #[serde(with = "secs_serde")]
    pub poll_interval: Duration,
    /// Interval between scheduled-set promotion sweeps, in fractional seconds.
    #[serde(with = "secs_serde")]
    pub promote_interval: Duration,
    /// Graceful-drain deadline on shutdown, in fractional seconds.
    #[serde(with = "secs_serde")]
    pub shutdown_timeout: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: 10,
            queues: vec!["default".to_string()],
            poll_interval: Duration::from_millis(500),
            promote_interval: Duration::from_secs(5),
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

/// Job-level retry policy settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetryConfig {
    /// Attempts before a job is moved to the dead set.
    pub max_attempts: u32,
    /// First-retry delay, in fractional seconds.
    #[serde(with = "secs_serde")]
    pub base_delay: Duration,
    /// Backoff ceiling, in fractional seconds.
    #[serde(with = "secs_serde")]
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 25,
            base_delay: Duration::from_secs(15),
            max_delay: Duration::from_secs(24 * 60 * 60),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file, then apply environment overrides.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let mut config: Config = toml::from_str(&content)?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from an optional path.
    ///
    /// An explicit path must exist; with `None`, a missing default file
    /// falls back to built-in defaults plus environment overrides.
    pub fn load(path: Option<&str>) -> Result<Self> {
        match path {
            Some(p) => Self::from_file(p),
            None => {
                let default_path = "config/config.toml";
                if Path::new(default_path).exists() {
                    Self::from_file(default_path)
                } else {
                    let mut config = Config::default();
                    config.apply_env_overrides()?;
                    config.validate()?;
                    Ok(config)
                }
            }
        }
    }

    /// Apply environment variable overrides.
    ///
    /// Recognized: `REDIS_URL`, `SIDECAR_URL`, `SIDECAR_PROTOCOL`.
    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(url) = std::env::var("REDIS_URL") {
            self.redis.url = url;
        }
        if let Ok(url) = std::env::var("SIDECAR_URL") {
            self.sidecar.url = url;
        }
        if let Ok(protocol) = std::env::var("SIDECAR_PROTOCOL") {
            self.sidecar.protocol = match protocol.to_lowercase().as_str() {
                "http" => SidecarProtocol::Http,
                "grpc" => SidecarProtocol::Grpc,
                other => {
                    return Err(DraymanError::Config(format!(
                        "invalid SIDECAR_PROTOCOL value: {}",
                        other
                    )))
                }
            };
        }
        Ok(())
    }

    /// Validate configuration settings.
    pub fn validate(&self) -> Result<()> {
        if self.worker.queues.is_empty() {
            return Err(DraymanError::Config(
                "worker.queues must name at least one queue".to_string(),
            ));
        }
        if self.worker.queues.iter().any(|q| q.is_empty()) {
            return Err(DraymanError::Config(
                "worker.queues must not contain empty names".to_string(),
            ));
        }
        if self.retry.max_delay < self.retry.base_delay {
            return Err(DraymanError::Config(
                "retry.max_delay must be >= retry.base_delay".to_string(),
            ));
        }
        Ok(())
    }
}

/// Serde helper reading durations as fractional seconds.
mod secs_serde {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = f64::deserialize(deserializer)?;
        if !secs.is_finite() || secs < 0.0 {
            return Err(serde::de::Error::custom(format!(
                "duration must be a non-negative number of seconds, got {}",
                secs
            )));
        }
        Ok(Duration::from_secs_f64(secs))
    }
}
