use thiserror::Error;

/// Errors that can occur within the queue subsystem.
#[derive(Debug, Error)]
pub enum QueueError {
    /// Underlying SQLite / rusqlite error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The task could not be turned into a storable kind/payload pair.
    #[error("Invalid task: {0}")]
    InvalidTask(#[from] enact_core::EnactError),

    /// The provided schedule definition is invalid.
    #[error("Invalid schedule: {0}")]
    InvalidSchedule(String),

    /// No job with the given ID exists in the store.
    #[error("Job not found: {id}")]
    JobNotFound { id: String },

    /// The job is no longer held by this claim (lease expired and the job was
    /// re-queued or re-claimed elsewhere).
    #[error("Lease lost for job {id}")]
    LeaseLost { id: String },
}

pub type Result<T> = std::result::Result<T, QueueError>;
