//! # drayman - Sidekiq-compatible job orchestrator
//!
//! A worker that drains Sidekiq-format job queues from Redis and dispatches
//! each job to an execution sidecar over HTTP or gRPC, with retries,
//! a dead set, and graceful shutdown.
//!
//! ## Features
//!
//! - **Wire compatibility**: consumes the JSON job records an existing
//!   producer left-pushes onto `queue:<name>` lists
//! - **Bounded concurrency**: a semaphore caps in-flight jobs and doubles
//!   as the backpressure valve for the poll loop
//! - **Resilient dispatch**: per-request timeouts, bounded transport
//!   retries with backoff, and a circuit breaker around the sidecar
//! - **Automatic retries**: failed jobs return via the `schedule` sorted
//!   set with exponential backoff and jitter
//! - **Dead set**: jobs that exhaust their retry budget land in a capped
//!   `dead` sorted set
//! - **Graceful shutdown**: SIGINT/SIGTERM drain in-flight work under a
//!   deadline
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use drayman::{Config, Orchestrator};
//!
//! #[tokio::main]
//! async fn main() -> drayman::Result<()> {
//!     let config = Config::load(None)?;
//!     let orchestrator = Orchestrator::connect(config).await?;
//!     orchestrator.run().await
//! }
//! ```

pub mod breaker;
pub mod config;
pub mod error;
pub mod executor;
pub mod job;
pub mod processor;
pub mod retry;
pub mod scheduler;
pub mod semaphore;
pub mod store;
pub mod worker;

// Re-export main types
pub use breaker::{BreakerState, CircuitBreaker};
pub use config::{Config, RedisConfig, RetryConfig, SidecarConfig, SidecarProtocol, WorkerConfig};
pub use error::{DraymanError, Result};
pub use executor::{Executor, SidecarClient};
pub use job::{ExecutionReport, ExecutionStatus, JobPayload};
pub use processor::Processor;
pub use retry::{Decision, Outcome, RetryPolicy};
pub use scheduler::Scheduler;
pub use semaphore::Semaphore;
pub use store::redis::RedisStore;
pub use store::JobStore;
pub use worker::Orchestrator;
