// Status projection
//
// A long-lived durable subscriber that mirrors lifecycle events into the
// submission record's status field. Projection is best-effort: a failed
// record save is logged and the event acked; redelivering would hit the
// same failure again, and the next status event overwrites anyway.

use seqrun_core::{subjects, Event, JobStatus, Result, StatusEvent};
use seqrun_mq::Handler;
use seqrun_records::RecordsClient;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::service::JobService;

/// Reflects status events into the `submissions` collection.
pub struct StatusProjector {
    jobs: JobService,
    records: Arc<RecordsClient>,
}

impl StatusProjector {
    pub fn new(jobs: JobService, records: Arc<RecordsClient>) -> Self {
        Self { jobs, records }
    }

    /// Run the projection loop. Blocks until `shutdown` flips or the
    /// subscription fails.
    pub async fn run(&self, shutdown: watch::Receiver<bool>) -> Result<()> {
        let records = self.records.clone();

        let handler: Handler = Arc::new(move |payload| {
            let records = records.clone();
            Box::pin(async move {
                if let Err(e) = project(&records, &payload).await {
                    warn!(error = %e, "Status projection failed, acking anyway");
                }
                // Always ack: projection is advisory
                Ok(())
            })
        });

        self.jobs
            .subscribe(
                shutdown,
                "status.*",
                subjects::STATUS_CONSUMER,
                handler,
            )
            .await
    }
}

async fn project(records: &RecordsClient, payload: &[u8]) -> anyhow::Result<()> {
    let event: Event<StatusEvent> = serde_json::from_slice(payload)?;
    let job_id = &event.metadata.job_id;
    let status = event.metadata.status;

    let submission = records.view_record("submissions", job_id).await?;

    // Progression is advisory: out-of-order observations (redelivery,
    // cross-subject races) are logged and written regardless.
    if let Some(current) = submission["status"]
        .as_str()
        .and_then(|s| serde_json::from_value::<JobStatus>(json!(s)).ok())
    {
        if current != status && !current.can_transition_to(status) {
            warn!(
                job_id = %job_id,
                from = %current,
                to = %status,
                "Out-of-order status transition"
            );
        }
    }

    let mut patch = serde_json::Map::new();
    patch.insert("status".to_string(), json!(status));
    records.update_record("submissions", job_id, &patch).await?;

    debug!(job_id = %job_id, status = %status, "Submission status updated");
    Ok(())
}
