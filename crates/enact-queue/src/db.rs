use rusqlite::Connection;

use crate::error::Result;

/// Initialise the queue schema in `conn`.
///
/// Creates the `jobs` table (idempotent). Times are Unix milliseconds so
/// due-time comparisons are plain integer comparisons.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS jobs (
            id                TEXT    NOT NULL PRIMARY KEY,
            kind              TEXT    NOT NULL,
            payload           TEXT    NOT NULL,   -- JSON task payload
            schedule          TEXT    NOT NULL,   -- JSON-encoded Schedule enum
            dedup_key         TEXT,               -- interval jobs only
            status            TEXT    NOT NULL DEFAULT 'queued',
            attempts          INTEGER NOT NULL DEFAULT 0,
            max_attempts      INTEGER NOT NULL,
            run_count         INTEGER NOT NULL DEFAULT 0,
            next_run_ms       INTEGER,
            lease_expires_ms  INTEGER,
            worker_id         TEXT,
            last_result       TEXT,
            last_error        TEXT,
            created_ms        INTEGER NOT NULL,
            updated_ms        INTEGER NOT NULL
        ) STRICT;

        -- One recurring schedule per (kind, payload).
        CREATE UNIQUE INDEX IF NOT EXISTS idx_jobs_dedup_key
            ON jobs (dedup_key) WHERE dedup_key IS NOT NULL;

        -- Claim query: WHERE status = 'queued' AND next_run_ms <= ? ORDER BY next_run_ms
        CREATE INDEX IF NOT EXISTS idx_jobs_due ON jobs (status, next_run_ms);
        ",
    )?;
    Ok(())
}
