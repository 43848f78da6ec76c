use thiserror::Error;

#[derive(Debug, Error)]
pub enum EnactError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid payload for task {kind}: {reason}")]
    InvalidPayload { kind: String, reason: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, EnactError>;
