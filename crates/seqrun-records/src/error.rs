// Error types for record store calls

use thiserror::Error;

/// Result type alias for record store operations
pub type Result<T> = std::result::Result<T, RecordsError>;

/// Errors that can occur talking to the records app
#[derive(Debug, Error)]
pub enum RecordsError {
    /// Transport-level failure
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-2xx response after any retry
    #[error("HTTP {code}: {body}")]
    Status { code: u16, body: String },

    /// Authentication or token refresh failed
    #[error("Auth error: {0}")]
    Auth(String),

    /// Response body did not match the expected shape
    #[error("Failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    /// Local filesystem error during file transfer
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Server did not pass the initial health probe
    #[error("Server health check failed: {0}")]
    Unhealthy(String),
}

impl RecordsError {
    pub(crate) fn status(code: u16, body: impl Into<String>) -> Self {
        RecordsError::Status {
            code,
            body: body.into(),
        }
    }
}
