//! Wire-format job record and sidecar execution report.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// A job record in the producer's wire format.
///
/// Producers left-push JSON-encoded records onto `queue:<name>` lists; the
/// orchestrator pops, executes, and on failure writes the record back into
/// the `schedule` or `dead` sorted set. Fields the orchestrator does not
/// know about are kept in `extra` so a retried record round-trips without
/// losing anything the producer put there.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobPayload {
    /// Identifier of the user logic to run.
    pub class: String,
    /// Ordered, heterogeneous arguments for the job class.
    pub args: Vec<Value>,
    /// Unique job identifier.
    pub jid: String,
    /// Logical queue the job was enqueued on.
    pub queue: String,
    /// Fractional epoch seconds at record creation.
    pub created_at: f64,
    /// Fractional epoch seconds at enqueue time.
    pub enqueued_at: f64,
    /// Attempts consumed so far; absent on the wire means zero.
    ///
    /// A non-zero value on a record that has never failed is a
    /// producer-set cap on attempts for this job.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub retry: u32,
    /// Epoch seconds of the most recent failed attempt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_at: Option<f64>,
    /// Error message from the most recent failed attempt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Classification of the most recent failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_class: Option<String>,
    /// Fields this crate does not model, preserved across round-trips.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn is_zero(n: &u32) -> bool {
    *n == 0
}

impl JobPayload {
    /// Create a fresh record for the given class and arguments.
    pub fn new(class: impl Into<String>, args: Vec<Value>, queue: impl Into<String>) -> Self {
        let now = epoch_seconds();
        Self {
            class: class.into(),
            args,
            jid: Uuid::new_v4().simple().to_string(),
            queue: queue.into(),
            created_at: now,
            enqueued_at: now,
            retry: 0,
            failed_at: None,
            error_message: None,
            error_class: None,
            extra: Map::new(),
        }
    }

    /// Serialize the record to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize a record from JSON.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Terminal status reported by the sidecar for one execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Success,
    Failure,
}

/// The sidecar's response to an execute request.
///
/// Transport-level problems (timeouts, 5xx, broken connections) are not
/// reports; they surface as executor-client errors instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub status: ExecutionStatus,
    /// Opaque result payload on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Wall-clock seconds the sidecar spent running the job.
    #[serde(default)]
    pub execution_time: f64,
    /// Present iff `status` is `failure`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// Current time as fractional epoch seconds.
pub(crate) fn epoch_seconds() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}
