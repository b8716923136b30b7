// Error types for the job orchestration core

use thiserror::Error;

/// Result type alias for job orchestration operations
pub type Result<T> = std::result::Result<T, JobError>;

/// Errors that can occur in the job orchestration core
#[derive(Debug, Error)]
pub enum JobError {
    /// Malformed job payload on the work stream; the message is left
    /// un-acked so the broker redelivers it
    #[error("Failed to decode job: {0}")]
    Decode(String),

    /// No handler registered for the job's schema
    #[error("No handler registered for schema: {0}")]
    UnknownSchema(String),

    /// Publishing a job request failed
    #[error("Failed to queue job: {0}")]
    Queue(String),

    /// Broker connectivity or delivery error
    #[error("Broker error: {0}")]
    Broker(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl JobError {
    /// Create a decode error
    pub fn decode(msg: impl Into<String>) -> Self {
        JobError::Decode(msg.into())
    }

    /// Create a broker error
    pub fn broker(msg: impl Into<String>) -> Self {
        JobError::Broker(msg.into())
    }
}
