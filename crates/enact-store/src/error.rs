use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    /// Not connected (never connected, connect failed, or already released).
    #[error("tactical store unavailable: {0}")]
    Unavailable(String),

    /// The write reached the database and was rejected.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("station record has no identifier")]
    MissingIdentifier,

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;
