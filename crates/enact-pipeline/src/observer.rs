//! Job outcome accounting.

use prometheus::{Encoder, IntCounter, Registry, TextEncoder};
use tracing::{error, info};

use enact_queue::{JobOutcome, QueueEvents};

use crate::error::Result;

pub const JOB_SUCCESS_TOTAL: &str = "job_success_total";
pub const JOB_FAILURE_TOTAL: &str = "job_failure_total";

/// Outcome counters, registered on their own Prometheus registry.
///
/// Clones share the same counters.
#[derive(Clone)]
pub struct JobMetrics {
    registry: Registry,
    success: IntCounter,
    failure: IntCounter,
}

impl JobMetrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();
        let success = IntCounter::new(JOB_SUCCESS_TOTAL, "Jobs that completed successfully")?;
        let failure = IntCounter::new(JOB_FAILURE_TOTAL, "Jobs that failed after all attempts")?;
        registry.register(Box::new(success.clone()))?;
        registry.register(Box::new(failure.clone()))?;
        Ok(Self {
            registry,
            success,
            failure,
        })
    }

    pub fn successes(&self) -> u64 {
        self.success.get()
    }

    pub fn failures(&self) -> u64 {
        self.failure.get()
    }

    /// Prometheus text exposition of every registered metric.
    pub fn render(&self) -> Result<String> {
        let mut buf = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buf)?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }
}

/// Counts and logs terminal job outcomes.
#[derive(Clone)]
pub struct OutcomeObserver {
    metrics: JobMetrics,
}

impl OutcomeObserver {
    pub fn new(metrics: JobMetrics) -> Self {
        Self { metrics }
    }

    pub fn metrics(&self) -> &JobMetrics {
        &self.metrics
    }
}

impl QueueEvents for OutcomeObserver {
    fn on_completed(&self, outcome: &JobOutcome) {
        self.metrics.success.inc();
        let result = outcome
            .result
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_default();
        info!(
            job_id = %outcome.job_id,
            kind = %outcome.kind,
            attempts = outcome.attempts,
            "Job {} completed successfully. Result: {result}",
            outcome.job_id
        );
    }

    fn on_failed(&self, outcome: &JobOutcome) {
        self.metrics.failure.inc();
        let reason = outcome.failed_reason.as_deref().unwrap_or("unknown");
        error!(
            job_id = %outcome.job_id,
            kind = %outcome.kind,
            attempts = outcome.attempts,
            "Job {} failed. Reason: {reason}",
            outcome.job_id
        );
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use enact_core::Task;
    use enact_queue::{JobQueue, QueuePolicy};
    use serde_json::json;

    use super::*;

    fn claimed_job() -> enact_queue::Job {
        let queue = JobQueue::in_memory(QueuePolicy::default()).unwrap();
        queue
            .submit_once(&Task::fetch_stations(1.0, 2.0, 3.0).unwrap(), Utc::now())
            .unwrap();
        queue.claim_next("test", Utc::now()).unwrap().unwrap()
    }

    #[test]
    fn counts_each_outcome_once() {
        let observer = OutcomeObserver::new(JobMetrics::new().unwrap());
        let job = claimed_job();

        observer.on_completed(&JobOutcome::completed(&job, json!({"count": 3}), Utc::now()));
        observer.on_completed(&JobOutcome::completed(&job, json!({"count": 0}), Utc::now()));
        observer.on_failed(&JobOutcome::failed(&job, "upstream down", Utc::now()));

        assert_eq!(observer.metrics().successes(), 2);
        assert_eq!(observer.metrics().failures(), 1);
    }

    #[test]
    fn clones_share_counters() {
        let metrics = JobMetrics::new().unwrap();
        let observer = OutcomeObserver::new(metrics.clone());
        observer.on_failed(&JobOutcome::failed(&claimed_job(), "boom", Utc::now()));
        assert_eq!(metrics.failures(), 1);
    }

    #[test]
    fn render_exposes_both_counters() {
        let metrics = JobMetrics::new().unwrap();
        let observer = OutcomeObserver::new(metrics.clone());
        observer.on_completed(&JobOutcome::completed(&claimed_job(), json!({}), Utc::now()));

        let text = metrics.render().unwrap();
        assert!(text.contains("job_success_total 1"));
        assert!(text.contains("job_failure_total 0"));
    }
}
