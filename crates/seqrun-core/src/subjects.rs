// Broker subject hierarchy
//
// Two streams, two subject spaces:
// - `jobs.request`            work stream, one subject, load-balanced fan-in
// - `jobs.events.status.<id>` event stream, status events per job
// - `jobs.events.<id>.>`      event stream, per-job event space

/// Work stream name (work-queue retention)
pub const WORK_STREAM: &str = "QUEUE";

/// Event stream name (limits retention, replayable)
pub const EVENT_STREAM: &str = "EVENTS";

/// Subject carrying job requests
pub const JOB_REQUEST: &str = "jobs.request";

/// Wildcard covering every event subject, used for stream provisioning
pub const JOB_EVENTS_WILDCARD: &str = "jobs.events.>";

/// Shared durable consumer name for the work stream
pub const REQUEST_CONSUMER: &str = "request-worker";

/// Durable consumer name of the status projector
pub const STATUS_CONSUMER: &str = "job-status-updater";

/// Event subject under the `jobs.events.` prefix.
///
/// The suffix is caller-chosen: `status.<jobId>` for status events,
/// `<jobId>.>` for a per-job replay subscription.
pub fn job_events(suffix: &str) -> String {
    format!("jobs.events.{suffix}")
}

/// Status event subject for one job
pub fn status_subject(job_id: &str) -> String {
    job_events(&format!("status.{job_id}"))
}

/// Filter matching every status event, used by the status projector
pub fn status_wildcard() -> String {
    job_events("status.*")
}

/// NATS-style subject match: `*` matches exactly one token, a trailing
/// `>` matches one or more remaining tokens.
pub fn matches(pattern: &str, subject: &str) -> bool {
    let mut pattern_tokens = pattern.split('.');
    let mut subject_tokens = subject.split('.');

    loop {
        match (pattern_tokens.next(), subject_tokens.next()) {
            (Some(">"), Some(_)) => return true,
            (Some("*"), Some(_)) => continue,
            (Some(p), Some(s)) if p == s => continue,
            (Some(_), Some(_)) => return false,
            (None, None) => return true,
            _ => return false,
        }
    }
}
