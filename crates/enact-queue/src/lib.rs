//! `enact-queue` — durable job queue with SQLite persistence.
//!
//! # Overview
//!
//! Jobs are persisted to a SQLite `jobs` table. A [`runtime::QueueRuntime`]
//! polls the database, leases any job whose `next_run` has arrived, runs it
//! through a [`runtime::JobProcessor`] and settles the result: retry with
//! backoff, re-queue for the next interval, or finish.
//!
//! Delivery is at-least-once. A worker that dies mid-job leaves a lease
//! behind; once it expires the job is handed to the next claimant.
//!
//! # Schedule variants
//!
//! | Variant    | Behaviour                                               |
//! |------------|---------------------------------------------------------|
//! | `Once`     | Single run, due on submission                           |
//! | `Interval` | Run on submission, then every N seconds; deduplicated   |

pub mod db;
pub mod error;
pub mod events;
pub mod queue;
pub mod runtime;
pub mod schedule;
pub mod types;

pub use error::{QueueError, Result};
pub use events::{JobOutcome, OutcomeState, QueueEvents};
pub use queue::{JobQueue, Settlement};
pub use runtime::{JobProcessor, QueueRuntime, RunReport};
pub use types::{Job, JobHandle, JobStatus, QueuePolicy, QueueStats, Schedule};
