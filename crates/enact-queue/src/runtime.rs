use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{
    error::Result,
    events::{JobOutcome, OutcomeState, QueueEvents},
    queue::{JobQueue, Settlement},
    types::Job,
};

/// Executes claimed jobs.
///
/// An `Err` fails the attempt; the queue decides whether to retry.
#[async_trait]
pub trait JobProcessor: Send + Sync + 'static {
    type Error: std::fmt::Display + Send;

    async fn process(&self, job: &Job) -> std::result::Result<Value, Self::Error>;
}

/// Result of one [`QueueRuntime::run_once`] pass that found work.
#[derive(Debug, Clone)]
pub enum RunReport {
    Completed(JobOutcome),
    Failed(Settlement),
}

/// Drives a [`JobQueue`]: claims due jobs, hands them to the processor,
/// settles the result and notifies observers.
///
/// One job is processed at a time per runtime. Several runtimes (in one or
/// more processes) may share a queue; claims never overlap.
pub struct QueueRuntime<P: JobProcessor> {
    queue: Arc<JobQueue>,
    processor: Arc<P>,
    observers: Vec<Arc<dyn QueueEvents>>,
    worker_id: String,
    poll_interval: Duration,
    retention: Option<Duration>,
}

impl<P: JobProcessor> QueueRuntime<P> {
    pub fn new(queue: Arc<JobQueue>, processor: Arc<P>) -> Self {
        Self {
            queue,
            processor,
            observers: Vec::new(),
            worker_id: format!("worker-{}", Uuid::new_v4()),
            poll_interval: Duration::from_secs(1),
            retention: None,
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn QueueEvents>) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Delete finished one-shot jobs older than `keep` on every poll.
    /// Without it they are kept forever.
    pub fn with_retention(mut self, keep: Duration) -> Self {
        self.retention = Some(keep);
        self
    }

    /// Main event loop. Drains due jobs every poll interval until `shutdown`
    /// broadcasts `true`. A job in progress is finished before shutting down.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(worker_id = %self.worker_id, "queue runtime started");

        let mut interval = tokio::time::interval(self.poll_interval);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.sweep();
                    loop {
                        match self.run_once().await {
                            Ok(Some(_)) => continue,
                            Ok(None) => break,
                            Err(e) => {
                                error!("queue runtime tick error: {e}");
                                break;
                            }
                        }
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!(worker_id = %self.worker_id, "queue runtime shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// Recover abandoned jobs, then claim and process at most one due job.
    /// `Ok(None)` when nothing was due.
    pub async fn run_once(&self) -> Result<Option<RunReport>> {
        for settlement in self.queue.requeue_expired(Utc::now())? {
            if let Settlement::Exhausted(outcome) = settlement {
                self.emit(&outcome);
            }
        }

        let Some(job) = self.queue.claim_next(&self.worker_id, Utc::now())? else {
            return Ok(None);
        };
        info!(job_id = %job.id, kind = %job.kind, attempt = job.attempts, "processing job");

        // Run on its own task so a panicking processor fails the attempt
        // instead of taking the runtime down.
        let processor = Arc::clone(&self.processor);
        let claimed = job.clone();
        let result = tokio::spawn(async move {
            processor
                .process(&claimed)
                .await
                .map_err(|e| e.to_string())
        })
        .await
        .unwrap_or_else(|e| Err(format!("worker panicked: {e}")));

        let report = match result {
            Ok(value) => {
                let outcome = self.queue.complete(&job, &value, Utc::now())?;
                self.emit(&outcome);
                RunReport::Completed(outcome)
            }
            Err(reason) => {
                let settlement = self.queue.fail(&job, &reason, Utc::now())?;
                if let Settlement::Exhausted(ref outcome) = settlement {
                    self.emit(outcome);
                }
                RunReport::Failed(settlement)
            }
        };
        Ok(Some(report))
    }

    /// Apply the retention window, if any. Errors are logged, never fatal.
    pub fn sweep(&self) {
        let Some(keep) = self.retention else {
            return;
        };
        let Some(cutoff) = chrono::Duration::from_std(keep)
            .ok()
            .and_then(|keep| Utc::now().checked_sub_signed(keep))
        else {
            return;
        };
        match self.queue.purge_finished(cutoff) {
            Ok(0) => {}
            Ok(n) => debug!(removed = n, "purged finished jobs"),
            Err(e) => warn!("purging finished jobs failed: {e}"),
        }
    }

    fn emit(&self, outcome: &JobOutcome) {
        for observer in &self.observers {
            let delivered = catch_unwind(AssertUnwindSafe(|| match outcome.state {
                OutcomeState::Completed => observer.on_completed(outcome),
                OutcomeState::Failed => observer.on_failed(outcome),
            }));
            if delivered.is_err() {
                warn!(job_id = %outcome.job_id, "queue observer panicked, outcome dropped for it");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    use enact_core::Task;
    use serde_json::json;

    use super::*;
    use crate::types::{JobStatus, QueuePolicy};

    fn queue(max_attempts: u32) -> Arc<JobQueue> {
        let policy = QueuePolicy {
            max_attempts,
            backoff_base_ms: 0,
            backoff_max_ms: 0,
            lease_secs: 60,
        };
        Arc::new(JobQueue::in_memory(policy).unwrap())
    }

    /// Fails the first `fail_first` calls, then returns `{"ok": true}`.
    struct Flaky {
        calls: AtomicU32,
        fail_first: u32,
    }

    impl Flaky {
        fn new(fail_first: u32) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicU32::new(0),
                fail_first,
            })
        }
    }

    #[async_trait]
    impl JobProcessor for Flaky {
        type Error = String;

        async fn process(&self, _job: &Job) -> std::result::Result<Value, String> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n <= self.fail_first {
                Err(format!("attempt {n} failed"))
            } else {
                Ok(json!({"ok": true}))
            }
        }
    }

    struct Panicky;

    #[async_trait]
    impl JobProcessor for Panicky {
        type Error = String;

        async fn process(&self, _job: &Job) -> std::result::Result<Value, String> {
            panic!("processor blew up");
        }
    }

    #[derive(Default)]
    struct Recorder {
        completed: Mutex<Vec<JobOutcome>>,
        failed: Mutex<Vec<JobOutcome>>,
    }

    impl QueueEvents for Recorder {
        fn on_completed(&self, outcome: &JobOutcome) {
            self.completed.lock().unwrap().push(outcome.clone());
        }
        fn on_failed(&self, outcome: &JobOutcome) {
            self.failed.lock().unwrap().push(outcome.clone());
        }
    }

    struct Exploding;

    impl QueueEvents for Exploding {
        fn on_completed(&self, _outcome: &JobOutcome) {
            panic!("observer bug");
        }
        fn on_failed(&self, _outcome: &JobOutcome) {
            panic!("observer bug");
        }
    }

    fn task() -> Task {
        Task::fetch_stations(48.8566, 2.3522, 50.0).unwrap()
    }

    #[tokio::test]
    async fn completes_one_shot_job_and_notifies() {
        let queue = queue(3);
        let recorder = Arc::new(Recorder::default());
        let runtime = QueueRuntime::new(queue.clone(), Flaky::new(0)).with_observer(recorder.clone());

        let handle = queue.submit_once(&task(), Utc::now()).unwrap();
        let report = runtime.run_once().await.unwrap().unwrap();
        assert!(matches!(report, RunReport::Completed(_)));

        let job = queue.get(&handle.id).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.last_result, Some(json!({"ok": true})));

        let completed = recorder.completed.lock().unwrap();
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].job_id, handle.id);
        assert!(recorder.failed.lock().unwrap().is_empty());

        // nothing left to do
        assert!(runtime.run_once().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn retries_until_success_without_failure_event() {
        let queue = queue(3);
        let recorder = Arc::new(Recorder::default());
        let runtime = QueueRuntime::new(queue.clone(), Flaky::new(2)).with_observer(recorder.clone());

        let handle = queue.submit_once(&task(), Utc::now()).unwrap();
        for _ in 0..3 {
            runtime.run_once().await.unwrap().unwrap();
        }

        let job = queue.get(&handle.id).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.attempts, 3);
        assert_eq!(recorder.completed.lock().unwrap().len(), 1);
        assert!(recorder.failed.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn exhausted_job_fails_once() {
        let queue = queue(2);
        let recorder = Arc::new(Recorder::default());
        let runtime =
            QueueRuntime::new(queue.clone(), Flaky::new(u32::MAX)).with_observer(recorder.clone());

        let handle = queue.submit_once(&task(), Utc::now()).unwrap();
        while runtime.run_once().await.unwrap().is_some() {}

        let job = queue.get(&handle.id).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.attempts, 2);
        assert_eq!(job.last_error.as_deref(), Some("attempt 2 failed"));

        let failed = recorder.failed.lock().unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].failed_reason.as_deref(), Some("attempt 2 failed"));
        assert!(recorder.completed.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn panicking_processor_fails_the_attempt() {
        let queue = queue(1);
        let recorder = Arc::new(Recorder::default());
        let runtime = QueueRuntime::new(queue.clone(), Arc::new(Panicky)).with_observer(recorder.clone());

        let handle = queue.submit_once(&task(), Utc::now()).unwrap();
        runtime.run_once().await.unwrap().unwrap();

        let job = queue.get(&handle.id).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.last_error.unwrap().starts_with("worker panicked"));
        assert_eq!(recorder.failed.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn panicking_observer_does_not_affect_queue_or_other_observers() {
        let queue = queue(3);
        let recorder = Arc::new(Recorder::default());
        let runtime = QueueRuntime::new(queue.clone(), Flaky::new(0))
            .with_observer(Arc::new(Exploding))
            .with_observer(recorder.clone());

        let handle = queue.submit_once(&task(), Utc::now()).unwrap();
        runtime.run_once().await.unwrap().unwrap();

        assert_eq!(
            queue.get(&handle.id).unwrap().unwrap().status,
            JobStatus::Completed
        );
        assert_eq!(recorder.completed.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn sweep_applies_retention_window() {
        let queue = queue(3);
        let handle = queue.submit_once(&task(), Utc::now()).unwrap();

        let keep_all = QueueRuntime::new(queue.clone(), Flaky::new(0));
        keep_all.run_once().await.unwrap().unwrap();
        keep_all.sweep();
        assert!(queue.get(&handle.id).unwrap().is_some());

        let purging = QueueRuntime::new(queue.clone(), Flaky::new(0))
            .with_retention(Duration::ZERO);
        tokio::time::sleep(Duration::from_millis(5)).await;
        purging.sweep();
        assert!(queue.get(&handle.id).unwrap().is_none());
    }

    #[tokio::test]
    async fn recurring_job_waits_for_next_tick() {
        let queue = queue(3);
        let runtime = QueueRuntime::new(queue.clone(), Flaky::new(0));

        let handle = queue.submit_repeating(&task(), 300, Utc::now()).unwrap();
        runtime.run_once().await.unwrap().unwrap();

        let job = queue.get(&handle.id).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(job.run_count, 1);
        assert!(job.next_run_at.unwrap() > Utc::now() + chrono::Duration::seconds(290));
        // not due again yet
        assert!(runtime.run_once().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn run_stops_on_shutdown() {
        let queue = queue(3);
        let recorder = Arc::new(Recorder::default());
        let runtime = QueueRuntime::new(queue.clone(), Flaky::new(0))
            .with_observer(recorder.clone())
            .with_poll_interval(Duration::from_millis(10));

        queue.submit_once(&task(), Utc::now()).unwrap();
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(runtime.run(rx));

        tokio::time::sleep(Duration::from_millis(100)).await;
        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("runtime did not stop")
            .unwrap();

        assert_eq!(recorder.completed.lock().unwrap().len(), 1);
    }
}
