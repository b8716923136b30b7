// Job queueing and dispatch
//
// One JobService instance serves both roles: the API side calls `queue`,
// the worker side registers handlers and calls `process`. Construction
// provisions both broker streams, so whichever process starts first
// creates them and later starters find them in place.

use anyhow::anyhow;
use async_trait::async_trait;
use seqrun_core::{subjects, Event, Job, JobStatus, Result};
use seqrun_mq::{AckPolicy, DeliverPolicy, Handler, MessageQueue, StreamSpec, SubscribeConfig};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{watch, Semaphore};
use tracing::{error, info, warn};

/// A handler for one job schema.
///
/// Returning `Err` marks the job failed: the service emits a terminal
/// `error` event and acks the delivery; there is no job-level retry.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, inputs: &serde_json::Value) -> anyhow::Result<()>;
}

/// Job queueing, dispatch and event plumbing.
///
/// Cloning is cheap; all clones share the broker connection and handler
/// registry. Register handlers before calling `process`; the registry
/// is read-only afterwards.
#[derive(Clone)]
pub struct JobService {
    mq: Arc<dyn MessageQueue>,
    handlers: HashMap<String, Arc<dyn JobHandler>>,
}

impl JobService {
    /// Create the service and provision the work and event streams.
    pub async fn new(mq: Arc<dyn MessageQueue>) -> Result<Self> {
        mq.ensure_stream(StreamSpec::work()).await?;
        mq.ensure_stream(StreamSpec::events()).await?;

        Ok(Self {
            mq,
            handlers: HashMap::new(),
        })
    }

    /// Install a handler for one schema. Process-local; not exposed on
    /// the wire.
    pub fn register_handler(&mut self, schema: &str, handler: Arc<dyn JobHandler>) {
        self.handlers.insert(schema.to_string(), handler);
    }

    /// Serialize a job and publish it to the work stream. No status
    /// event is emitted here; the intake hook already set `created`.
    pub async fn queue(&self, id: &str, inputs: serde_json::Value, schema: &str) -> Result<()> {
        let job = Job::new(id, inputs, schema);
        let payload = serde_json::to_vec(&job)
            .map_err(|e| seqrun_core::JobError::Queue(format!("failed to serialize job: {e}")))?;

        self.mq.publish(subjects::JOB_REQUEST, payload).await?;

        info!(job_id = %id, schema = %schema, "Job queued");
        Ok(())
    }

    /// Consume the work stream under the shared consumer name and
    /// dispatch deliveries to registered handlers, at most
    /// `max_concurrency` at a time. Blocks until `shutdown` flips or the
    /// subscription fails.
    pub async fn process(
        &self,
        shutdown: watch::Receiver<bool>,
        max_concurrency: usize,
    ) -> Result<()> {
        let semaphore = Arc::new(Semaphore::new(max_concurrency));
        let service = self.clone();

        let dispatch_semaphore = semaphore.clone();
        let handler: Handler = Arc::new(move |payload| {
            let service = service.clone();
            let semaphore = dispatch_semaphore.clone();
            Box::pin(async move { service.dispatch(payload, semaphore).await })
        });

        info!(max_concurrency, "Starting job dispatch loop");

        let result = self
            .mq
            .subscribe(
                subjects::WORK_STREAM,
                subjects::JOB_REQUEST,
                subjects::REQUEST_CONSUMER,
                shutdown,
                handler,
            )
            .await;

        // Drain: pending dispatches fail their acquire (and stay
        // un-acked for redelivery); in-flight handlers run to completion
        // and return their permits.
        semaphore.close();
        while semaphore.available_permits() < max_concurrency {
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        }

        result
    }

    /// Durable subscription under `jobs.events.<suffix>`.
    pub async fn subscribe(
        &self,
        shutdown: watch::Receiver<bool>,
        suffix: &str,
        consumer_name: &str,
        on_message: Handler,
    ) -> Result<()> {
        let config = SubscribeConfig {
            stream: subjects::EVENT_STREAM.to_string(),
            filter_subject: subjects::job_events(suffix),
            durable_name: Some(consumer_name.to_string()),
            deliver_policy: DeliverPolicy::All,
            ack_policy: AckPolicy::Explicit,
        };
        self.mq
            .subscribe_with_config(config, shutdown, on_message)
            .await
    }

    /// Ephemeral deliver-all subscription under `jobs.events.<suffix>`:
    /// a late joiner first receives every retained event in publication
    /// order, then tails new ones.
    pub async fn replay_subscribe(
        &self,
        shutdown: watch::Receiver<bool>,
        suffix: &str,
        on_message: Handler,
    ) -> Result<()> {
        let config = SubscribeConfig {
            stream: subjects::EVENT_STREAM.to_string(),
            filter_subject: subjects::job_events(suffix),
            durable_name: None,
            deliver_policy: DeliverPolicy::All,
            ack_policy: AckPolicy::Explicit,
        };
        self.mq
            .subscribe_with_config(config, shutdown, on_message)
            .await
    }

    /// Handle one work-stream delivery.
    ///
    /// Ack contract: a decode failure returns `Err` so the broker
    /// redelivers (poison messages end in the broker's dead-letter
    /// handling); everything else returns `Ok` after emitting a
    /// terminal event.
    async fn dispatch(&self, payload: Vec<u8>, semaphore: Arc<Semaphore>) -> anyhow::Result<()> {
        let job: Job = match serde_json::from_slice(&payload) {
            Ok(job) => job,
            Err(e) => {
                error!(error = %e, "Failed to decode job, leaving delivery un-acked");
                return Err(seqrun_core::JobError::decode(e.to_string()).into());
            }
        };

        let Some(handler) = self.handlers.get(&job.schema) else {
            warn!(job_id = %job.id, schema = %job.schema, "No handler for schema");
            let err = seqrun_core::JobError::UnknownSchema(job.schema.clone());
            self.emit_status(&job.id, JobStatus::Error, err.to_string())
                .await;
            // Redelivery will not help an unknown schema
            return Ok(());
        };

        // Acquired before the handler starts, released when the job is
        // done; this is the per-worker concurrency ceiling.
        let _permit = semaphore
            .acquire_owned()
            .await
            .map_err(|e| anyhow!("semaphore closed: {e}"))?;

        self.emit_status(
            &job.id,
            JobStatus::Processing,
            format!("job {} is processing", job.id),
        )
        .await;

        match handler.handle(&job.inputs).await {
            Ok(()) => {
                info!(job_id = %job.id, "Job completed");
                self.emit_status(
                    &job.id,
                    JobStatus::Completed,
                    format!("job {} completed", job.id),
                )
                .await;
            }
            Err(e) => {
                error!(job_id = %job.id, error = %e, "Job failed");
                self.emit_status(&job.id, JobStatus::Error, format!("job {} failed: {e:#}", job.id))
                    .await;
            }
        }

        Ok(())
    }

    /// Publish a status event for one job. Emission failures are logged
    /// and swallowed: the event bus is advisory and a publish failure
    /// must not turn a finished job into a redelivery.
    pub async fn emit_status(&self, job_id: &str, status: JobStatus, message: impl Into<String>) {
        let event = Event::status(job_id, status, message);
        let payload = match serde_json::to_vec(&event) {
            Ok(payload) => payload,
            Err(e) => {
                error!(job_id = %job_id, error = %e, "Failed to serialize status event");
                return;
            }
        };

        if let Err(e) = self
            .mq
            .publish(&subjects::status_subject(job_id), payload)
            .await
        {
            error!(job_id = %job_id, status = %status, error = %e, "Failed to publish status event");
        }
    }
}
