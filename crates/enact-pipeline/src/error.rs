use thiserror::Error;

/// Errors surfaced by the worker and the facade.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Upstream error: {0}")]
    Upstream(#[from] enact_ocm::UpstreamError),

    #[error("Store error: {0}")]
    Store(#[from] enact_store::StoreError),

    #[error("Queue error: {0}")]
    Queue(#[from] enact_queue::QueueError),

    #[error("Task error: {0}")]
    Task(#[from] enact_core::EnactError),

    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
