use chrono::{DateTime, Utc};
use enact_core::config::QueueConfig;
use enact_core::Task;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Defines when a job runs again after a successful or exhausted run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Schedule {
    /// Run once, as soon as a worker is free.
    Once,

    /// Run now, then repeatedly with a fixed interval in seconds.
    Interval { every_secs: u64 },
}

/// Lifecycle state of a job.
///
/// `queued → running → {completed, failed}`. Interval jobs go back to
/// `queued` instead of reaching a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Waiting for its next_run time.
    Queued,
    /// Claimed by a worker holding a lease.
    Running,
    /// One-shot job finished successfully.
    Completed,
    /// One-shot job exhausted its attempts.
    Failed,
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "queued" => Ok(JobStatus::Queued),
            "running" => Ok(JobStatus::Running),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            other => Err(format!("unknown job status: {other}")),
        }
    }
}

/// A persisted job record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// UUID v4 string, primary key.
    pub id: String,
    /// Task kind, e.g. `fetch_stations`.
    pub kind: String,
    /// Task payload as submitted.
    pub payload: Value,
    pub schedule: Schedule,
    /// Set for interval jobs only; unique across the queue.
    pub dedup_key: Option<String>,
    pub status: JobStatus,
    /// Attempts used in the current run, including the one in progress.
    pub attempts: u32,
    pub max_attempts: u32,
    /// Runs that reached a terminal outcome (success or exhaustion).
    pub run_count: u32,
    pub next_run_at: Option<DateTime<Utc>>,
    pub lease_expires_at: Option<DateTime<Utc>>,
    pub worker_id: Option<String>,
    pub last_result: Option<Value>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Rebuild the typed task. Unknown kinds map to `Task::Unknown`.
    pub fn task(&self) -> enact_core::Result<Task> {
        Task::from_parts(&self.kind, self.payload.clone())
    }
}

/// Returned by submissions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobHandle {
    pub id: String,
    /// False when an identical recurring schedule already existed.
    pub created: bool,
}

/// Attempt budget, retry backoff and lease length for a queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueuePolicy {
    pub max_attempts: u32,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
    pub lease_secs: u64,
}

impl Default for QueuePolicy {
    fn default() -> Self {
        Self::from(&QueueConfig::default())
    }
}

impl From<&QueueConfig> for QueuePolicy {
    fn from(config: &QueueConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            backoff_base_ms: config.backoff_base_ms,
            backoff_max_ms: config.backoff_max_ms,
            lease_secs: config.lease_secs,
        }
    }
}

/// Job counts per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub queued: u64,
    pub running: u64,
    pub completed: u64,
    pub failed: u64,
}
