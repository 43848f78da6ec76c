use thiserror::Error;

/// Failures talking to the upstream search API.
///
/// None of these are retried here; retry belongs to the job queue.
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// Transport-level failure (connect, TLS, body read).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("request timed out after {secs}s")]
    Timeout { secs: u64 },

    /// Upstream answered with a non-2xx status.
    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    /// Body was not a JSON array of station records.
    #[error("malformed response: {0}")]
    Parse(String),
}

pub type Result<T> = std::result::Result<T, UpstreamError>;
