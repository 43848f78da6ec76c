use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use enact_core::Task;
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, TransactionBehavior};
use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    db::init_db,
    error::{QueueError, Result},
    events::JobOutcome,
    schedule::{compute_next_run, retry_delay},
    types::{Job, JobHandle, JobStatus, QueuePolicy, QueueStats, Schedule},
};

/// Longest accepted repeat interval (one year).
const MAX_INTERVAL_SECS: u64 = 365 * 24 * 60 * 60;

const JOB_COLUMNS: &str = "id, kind, payload, schedule, dedup_key, status, attempts, max_attempts,
     run_count, next_run_ms, lease_expires_ms, worker_id, last_result, last_error,
     created_ms, updated_ms";

/// What happened to a job after a failed attempt.
#[derive(Debug, Clone)]
pub enum Settlement {
    /// Attempts remain; the job is queued again after a backoff.
    Retrying {
        job_id: String,
        attempt: u32,
        next_run_at: DateTime<Utc>,
    },
    /// Attempt budget spent. One-shot jobs are now `failed`; interval jobs are
    /// queued for their next tick with a fresh budget.
    Exhausted(JobOutcome),
}

/// Durable at-least-once job queue on SQLite.
///
/// A claim leases the job to one worker for `lease_secs`. If the worker never
/// reports back, [`JobQueue::requeue_expired`] puts the job back in the queue
/// (or fails it when no attempts are left), so a crash cannot lose work.
///
/// Every operation takes the current time explicitly; the runtime passes the
/// wall clock.
pub struct JobQueue {
    conn: Mutex<Connection>,
    policy: QueuePolicy,
}

impl JobQueue {
    pub fn new(conn: Connection, policy: QueuePolicy) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            policy,
        })
    }

    /// Open (or create) the queue database at `path`.
    pub fn open(path: &str, policy: QueuePolicy) -> Result<Self> {
        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                let _ = std::fs::create_dir_all(parent);
            }
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        Self::new(conn, policy)
    }

    /// Private, non-durable queue. Nothing survives the process.
    pub fn in_memory(policy: QueuePolicy) -> Result<Self> {
        Self::new(Connection::open_in_memory()?, policy)
    }

    /// Enqueue a single execution, due immediately.
    pub fn submit_once(&self, task: &Task, now: DateTime<Utc>) -> Result<JobHandle> {
        let conn = self.lock();
        let id = Uuid::new_v4().to_string();
        insert_job(&conn, &id, task, &Schedule::Once, None, self.policy.max_attempts, now)?;
        info!(job_id = %id, kind = task.kind(), "job submitted");
        Ok(JobHandle { id, created: true })
    }

    /// Enqueue a recurring schedule keyed by (kind, payload).
    ///
    /// The first run is due immediately. Submitting an identical task again
    /// returns the existing job with `created == false` and leaves its
    /// schedule untouched.
    pub fn submit_repeating(
        &self,
        task: &Task,
        every_secs: u64,
        now: DateTime<Utc>,
    ) -> Result<JobHandle> {
        if every_secs == 0 || every_secs > MAX_INTERVAL_SECS {
            return Err(QueueError::InvalidSchedule(format!(
                "interval must be between 1 and {MAX_INTERVAL_SECS} seconds, got {every_secs}"
            )));
        }
        let key = task.dedup_key()?;
        let conn = self.lock();

        if let Some(id) = find_by_dedup_key(&conn, &key)? {
            debug!(job_id = %id, %key, "recurring job already scheduled");
            return Ok(JobHandle { id, created: false });
        }

        let id = Uuid::new_v4().to_string();
        let schedule = Schedule::Interval { every_secs };
        let inserted = insert_job(
            &conn,
            &id,
            task,
            &schedule,
            Some(&key),
            self.policy.max_attempts,
            now,
        )?;
        if inserted == 0 {
            // another process inserted the same key between our read and write
            let id = find_by_dedup_key(&conn, &key)?.ok_or(QueueError::JobNotFound { id: key })?;
            return Ok(JobHandle { id, created: false });
        }

        info!(job_id = %id, kind = task.kind(), every_secs, "recurring job scheduled");
        Ok(JobHandle { id, created: true })
    }

    /// Lease the oldest due job to `worker_id`, moving it to `running` and
    /// counting the attempt. `None` when nothing is due.
    pub fn claim_next(&self, worker_id: &str, now: DateTime<Utc>) -> Result<Option<Job>> {
        let mut conn = self.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let now_ms = now.timestamp_millis();

        let id: Option<String> = tx
            .query_row(
                "SELECT id FROM jobs
                 WHERE status = 'queued' AND next_run_ms IS NOT NULL AND next_run_ms <= ?1
                 ORDER BY next_run_ms, created_ms
                 LIMIT 1",
                [now_ms],
                |row| row.get(0),
            )
            .optional()?;
        let Some(id) = id else {
            return Ok(None);
        };

        let lease_ms = now_ms.saturating_add(secs_to_ms(self.policy.lease_secs));
        tx.execute(
            "UPDATE jobs SET status = 'running', attempts = attempts + 1,
                worker_id = ?2, lease_expires_ms = ?3, updated_ms = ?4
             WHERE id = ?1 AND status = 'queued'",
            rusqlite::params![id, worker_id, lease_ms, now_ms],
        )?;
        let job = tx.query_row(
            &format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = ?1"),
            [&id],
            row_to_job,
        )?;
        tx.commit()?;

        debug!(job_id = %job.id, kind = %job.kind, attempt = job.attempts, %worker_id, "job claimed");
        Ok(Some(job))
    }

    /// Record a successful run of a claimed job.
    ///
    /// One-shot jobs become `completed`; interval jobs are queued for their
    /// next tick with a fresh attempt budget.
    pub fn complete(&self, job: &Job, result: &Value, now: DateTime<Utc>) -> Result<JobOutcome> {
        let conn = self.lock();
        let (status, next, attempts) = match compute_next_run(&job.schedule, now) {
            Some(next) => (JobStatus::Queued, Some(next), 0),
            None => (JobStatus::Completed, None, job.attempts),
        };
        let changed = conn.execute(
            "UPDATE jobs SET status = ?4, next_run_ms = ?5, attempts = ?6,
                run_count = run_count + 1, last_result = ?7, last_error = NULL,
                lease_expires_ms = NULL, worker_id = NULL, updated_ms = ?8
             WHERE id = ?1 AND status = 'running' AND worker_id IS ?2 AND attempts = ?3",
            rusqlite::params![
                job.id,
                job.worker_id,
                job.attempts,
                status.to_string(),
                next.map(|t| t.timestamp_millis()),
                attempts,
                serde_json::to_string(result)?,
                now.timestamp_millis(),
            ],
        )?;
        if changed == 0 {
            return Err(QueueError::LeaseLost { id: job.id.clone() });
        }
        debug!(job_id = %job.id, next_status = %status, "job completed");
        Ok(JobOutcome::completed(job, result.clone(), now))
    }

    /// Record a failed attempt of a claimed job.
    pub fn fail(&self, job: &Job, reason: &str, now: DateTime<Utc>) -> Result<Settlement> {
        let conn = self.lock();
        settle_failure(&conn, &self.policy, job, reason, now)
    }

    /// Recover jobs whose worker disappeared: every `running` job with an
    /// expired lease is treated as a failed attempt.
    pub fn requeue_expired(&self, now: DateTime<Utc>) -> Result<Vec<Settlement>> {
        let mut conn = self.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let expired: Vec<Job> = {
            let mut stmt = tx.prepare(&format!(
                "SELECT {JOB_COLUMNS} FROM jobs
                 WHERE status = 'running' AND lease_expires_ms IS NOT NULL
                   AND lease_expires_ms <= ?1"
            ))?;
            let rows = stmt
                .query_map([now.timestamp_millis()], row_to_job)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows
        };

        let mut settled = Vec::with_capacity(expired.len());
        for job in &expired {
            warn!(
                job_id = %job.id,
                worker_id = job.worker_id.as_deref().unwrap_or("-"),
                attempt = job.attempts,
                "lease expired, job abandoned by its worker"
            );
            settled.push(settle_failure(
                &tx,
                &self.policy,
                job,
                "lease expired before the worker reported a result",
                now,
            )?);
        }
        tx.commit()?;
        Ok(settled)
    }

    /// Delete one-shot jobs that reached `completed` or `failed` before
    /// `before`. Recurring schedules are never removed. Returns the number of
    /// rows deleted.
    pub fn purge_finished(&self, before: DateTime<Utc>) -> Result<usize> {
        let conn = self.lock();
        let n = conn.execute(
            "DELETE FROM jobs
             WHERE dedup_key IS NULL AND status IN ('completed', 'failed')
               AND updated_ms < ?1",
            [before.timestamp_millis()],
        )?;
        Ok(n)
    }

    pub fn get(&self, id: &str) -> Result<Option<Job>> {
        let conn = self.lock();
        let job = conn
            .query_row(
                &format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = ?1"),
                [id],
                row_to_job,
            )
            .optional()?;
        Ok(job)
    }

    /// Return all known jobs ordered by creation time.
    pub fn list_jobs(&self) -> Result<Vec<Job>> {
        self.query_jobs("ORDER BY created_ms")
    }

    /// Recurring schedules currently registered, one per dedup key.
    pub fn active_schedules(&self) -> Result<Vec<Job>> {
        self.query_jobs("WHERE dedup_key IS NOT NULL ORDER BY created_ms")
    }

    pub fn stats(&self) -> Result<QueueStats> {
        let conn = self.lock();
        let mut stmt = conn.prepare("SELECT status, COUNT(*) FROM jobs GROUP BY status")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;

        let mut stats = QueueStats::default();
        for row in rows {
            let (status, n) = row?;
            let n = n as u64;
            match status.parse::<JobStatus>() {
                Ok(JobStatus::Queued) => stats.queued = n,
                Ok(JobStatus::Running) => stats.running = n,
                Ok(JobStatus::Completed) => stats.completed = n,
                Ok(JobStatus::Failed) => stats.failed = n,
                Err(e) => warn!("stats: {e}"),
            }
        }
        Ok(stats)
    }

    // --- private helpers ---------------------------------------------------

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn query_jobs(&self, tail: &str) -> Result<Vec<Job>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!("SELECT {JOB_COLUMNS} FROM jobs {tail}"))?;
        let jobs = stmt
            .query_map([], row_to_job)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(jobs)
    }
}

fn insert_job(
    conn: &Connection,
    id: &str,
    task: &Task,
    schedule: &Schedule,
    dedup_key: Option<&str>,
    max_attempts: u32,
    now: DateTime<Utc>,
) -> Result<usize> {
    let now_ms = now.timestamp_millis();
    let n = conn.execute(
        "INSERT OR IGNORE INTO jobs
         (id, kind, payload, schedule, dedup_key, status, attempts, max_attempts,
          run_count, next_run_ms, created_ms, updated_ms)
         VALUES (?1, ?2, ?3, ?4, ?5, 'queued', 0, ?6, 0, ?7, ?7, ?7)",
        rusqlite::params![
            id,
            task.kind(),
            serde_json::to_string(&task.payload()?)?,
            serde_json::to_string(schedule)?,
            dedup_key,
            max_attempts,
            now_ms,
        ],
    )?;
    Ok(n)
}

fn find_by_dedup_key(conn: &Connection, key: &str) -> Result<Option<String>> {
    let id = conn
        .query_row("SELECT id FROM jobs WHERE dedup_key = ?1", [key], |row| {
            row.get(0)
        })
        .optional()?;
    Ok(id)
}

/// Shared by explicit failures and lease expiry.
fn settle_failure(
    conn: &Connection,
    policy: &QueuePolicy,
    job: &Job,
    reason: &str,
    now: DateTime<Utc>,
) -> Result<Settlement> {
    let (settlement, status, next, attempts) = if job.attempts < job.max_attempts {
        let next = now + retry_delay(job.attempts, policy.backoff_base_ms, policy.backoff_max_ms);
        warn!(
            job_id = %job.id,
            attempt = job.attempts,
            max_attempts = job.max_attempts,
            %reason,
            "job attempt failed, retrying"
        );
        let settlement = Settlement::Retrying {
            job_id: job.id.clone(),
            attempt: job.attempts,
            next_run_at: next,
        };
        (settlement, JobStatus::Queued, Some(next), job.attempts)
    } else {
        let outcome = JobOutcome::failed(job, reason, now);
        match compute_next_run(&job.schedule, now) {
            Some(next) => (Settlement::Exhausted(outcome), JobStatus::Queued, Some(next), 0),
            None => (Settlement::Exhausted(outcome), JobStatus::Failed, None, job.attempts),
        }
    };

    let run_finished = matches!(settlement, Settlement::Exhausted(_));
    let changed = conn.execute(
        "UPDATE jobs SET status = ?4, next_run_ms = ?5, attempts = ?6,
            run_count = run_count + ?7, last_error = ?8,
            lease_expires_ms = NULL, worker_id = NULL, updated_ms = ?9
         WHERE id = ?1 AND status = 'running' AND worker_id IS ?2 AND attempts = ?3",
        rusqlite::params![
            job.id,
            job.worker_id,
            job.attempts,
            status.to_string(),
            next.map(|t| t.timestamp_millis()),
            attempts,
            u32::from(run_finished),
            reason,
            now.timestamp_millis(),
        ],
    )?;
    if changed == 0 {
        return Err(QueueError::LeaseLost { id: job.id.clone() });
    }
    Ok(settlement)
}

fn secs_to_ms(secs: u64) -> i64 {
    i64::try_from(secs.saturating_mul(1000)).unwrap_or(i64::MAX)
}

fn ms_to_time(ms: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms)
}

fn row_to_job(row: &rusqlite::Row<'_>) -> rusqlite::Result<Job> {
    let payload: String = row.get(2)?;
    let schedule: String = row.get(3)?;
    let status: String = row.get(5)?;
    let last_result: Option<String> = row.get(12)?;
    let created_ms: i64 = row.get(14)?;
    let updated_ms: i64 = row.get(15)?;

    Ok(Job {
        id: row.get(0)?,
        kind: row.get(1)?,
        payload: serde_json::from_str(&payload).map_err(|e| conversion_error(2, e))?,
        schedule: serde_json::from_str(&schedule).map_err(|e| conversion_error(3, e))?,
        dedup_key: row.get(4)?,
        status: status
            .parse()
            .map_err(|e: String| conversion_error(5, e))?,
        attempts: row.get(6)?,
        max_attempts: row.get(7)?,
        run_count: row.get(8)?,
        next_run_at: row.get::<_, Option<i64>>(9)?.and_then(ms_to_time),
        lease_expires_at: row.get::<_, Option<i64>>(10)?.and_then(ms_to_time),
        worker_id: row.get(11)?,
        last_result: last_result
            .map(|s| serde_json::from_str(&s))
            .transpose()
            .map_err(|e| conversion_error(12, e))?,
        last_error: row.get(13)?,
        created_at: ms_to_time(created_ms).unwrap_or_default(),
        updated_at: ms_to_time(updated_ms).unwrap_or_default(),
    })
}

fn conversion_error(
    idx: usize,
    e: impl Into<Box<dyn std::error::Error + Send + Sync>>,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, e.into())
}
