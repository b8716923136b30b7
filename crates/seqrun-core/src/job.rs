// Job envelope and lifecycle states
//
// A Job is created once at intake, serialized onto the work stream, and
// decoded once per delivery. It is never mutated in place; lifecycle
// progress is carried by status events, not by rewriting the job.

use serde::{Deserialize, Serialize};

#[cfg(feature = "openapi")]
use utoipa::ToSchema;

/// A unit of work on the work stream.
///
/// `id` is the submission record's primary key and the keyspace of the
/// job's event subjects. `schema` selects the registered handler;
/// `inputs` is handler-specific opaque JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct Job {
    /// Submission record id; stable identity of the job
    pub id: String,

    /// Handler-specific payload
    pub inputs: serde_json::Value,

    /// Handler selector
    pub schema: String,
}

impl Job {
    pub fn new(id: impl Into<String>, inputs: serde_json::Value, schema: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            inputs,
            schema: schema.into(),
        }
    }
}

/// Lifecycle states persisted on the submission record.
///
/// `created` is set by the intake hook before enqueue; the dispatch loop
/// emits `processing` and a terminal `completed` or `error`. `queued` is
/// legal but not emitted by this implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub enum JobStatus {
    Created,
    Queued,
    Processing,
    Completed,
    Error,
}

impl JobStatus {
    /// Terminal states admit no further transitions
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Error)
    }

    /// Whether `next` is a legal successor of `self`.
    ///
    /// The progression is advisory: consumers treat out-of-order
    /// observations (e.g. redelivery) as best-effort overwrites.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        match self {
            JobStatus::Created => matches!(
                next,
                JobStatus::Queued | JobStatus::Processing | JobStatus::Error
            ),
            JobStatus::Queued => matches!(next, JobStatus::Processing | JobStatus::Error),
            JobStatus::Processing => matches!(next, JobStatus::Completed | JobStatus::Error),
            JobStatus::Completed | JobStatus::Error => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Created => "created",
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Error => "error",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
