//! Queue-level outcome events and the observer interface that receives them.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::types::Job;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeState {
    Completed,
    Failed,
}

/// Terminal result of one job run, delivered to every [`QueueEvents`] observer.
///
/// A failed outcome is only produced once the attempt budget is spent;
/// retried attempts are not reported here.
#[derive(Debug, Clone, Serialize)]
pub struct JobOutcome {
    pub job_id: String,
    pub kind: String,
    pub attempts: u32,
    pub state: OutcomeState,
    /// Processor result, for completed runs.
    pub result: Option<Value>,
    /// Last failure reason, for failed runs.
    pub failed_reason: Option<String>,
    pub finished_at: DateTime<Utc>,
}

impl JobOutcome {
    pub fn completed(job: &Job, result: Value, at: DateTime<Utc>) -> Self {
        Self {
            job_id: job.id.clone(),
            kind: job.kind.clone(),
            attempts: job.attempts,
            state: OutcomeState::Completed,
            result: Some(result),
            failed_reason: None,
            finished_at: at,
        }
    }

    pub fn failed(job: &Job, reason: &str, at: DateTime<Utc>) -> Self {
        Self {
            job_id: job.id.clone(),
            kind: job.kind.clone(),
            attempts: job.attempts,
            state: OutcomeState::Failed,
            result: None,
            failed_reason: Some(reason.to_string()),
            finished_at: at,
        }
    }
}

/// Observer of job outcomes.
///
/// Called synchronously on the runtime task, once per outcome. Implementations
/// must not block and cannot fail; a panic is caught and logged by the runtime.
pub trait QueueEvents: Send + Sync {
    fn on_completed(&self, outcome: &JobOutcome);
    fn on_failed(&self, outcome: &JobOutcome);
}
