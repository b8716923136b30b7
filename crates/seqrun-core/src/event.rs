// Lifecycle event schema
//
// Events are append-only messages on the replayable event stream. Every
// event carries a type in dot notation, a human-readable message, an
// RFC 3339 timestamp and a typed metadata payload. The core emits one
// subtype: status events keyed by job id.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[cfg(feature = "openapi")]
use utoipa::ToSchema;

use crate::job::JobStatus;

// ============================================================================
// Event Type Constants
// ============================================================================

pub const JOB_STATUS: &str = "job.status";

// ============================================================================
// Event Envelope
// ============================================================================

/// Generic event envelope carried on the event stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event<T> {
    /// Event type in dot notation
    #[serde(rename = "type")]
    pub event_type: String,

    /// Human-readable description
    pub message: String,

    /// Emission time
    pub timestamp: DateTime<Utc>,

    /// Type-specific payload
    pub metadata: T,
}

impl<T> Event<T> {
    pub fn new(event_type: impl Into<String>, message: impl Into<String>, metadata: T) -> Self {
        Self {
            event_type: event_type.into(),
            message: message.into(),
            timestamp: Utc::now(),
            metadata,
        }
    }
}

/// Payload of a job lifecycle status event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct StatusEvent {
    /// Submission record id
    pub job_id: String,

    /// New lifecycle state
    pub status: JobStatus,
}

impl Event<StatusEvent> {
    /// Build a status event for one job.
    pub fn status(job_id: impl Into<String>, status: JobStatus, message: impl Into<String>) -> Self {
        Event::new(
            JOB_STATUS,
            message,
            StatusEvent {
                job_id: job_id.into(),
                status,
            },
        )
    }
}
