// Job event streaming HTTP route (SSE)
//
// A late-joining client first receives every event already retained for
// its job, in publication order, then tails new ones. The ephemeral
// broker consumer lives exactly as long as the client connection.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::sse::{Event as SseEvent, KeepAlive, Sse},
    routing::get,
    Router,
};
use futures::Stream;
use seqrun_jobs::JobService;
use seqrun_mq::Handler;
use std::{convert::Infallible, sync::Arc};
use tokio::sync::{mpsc, watch};
use tokio_stream::{wrappers::ReceiverStream, StreamExt};
use tracing::{debug, error};

/// App state for the event-stream routes
#[derive(Clone)]
pub struct AppState {
    pub jobs: JobService,
}

/// Create the job event-stream routes.
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/jobs/subscribe/:job_id", get(subscribe_job))
        .route("/jobs/subscribe", get(missing_job_id))
        .route("/jobs/subscribe/", get(missing_job_id))
        .with_state(state)
}

async fn missing_job_id() -> StatusCode {
    StatusCode::BAD_REQUEST
}

/// GET /jobs/subscribe/{job_id} - replay and tail one job's events
#[utoipa::path(
    get,
    path = "/jobs/subscribe/{job_id}",
    params(
        ("job_id" = String, Path, description = "Submission record id")
    ),
    responses(
        (status = 200, description = "Job event stream", content_type = "text/event-stream"),
        (status = 400, description = "Missing job id")
    ),
    tag = "jobs"
)]
pub async fn subscribe_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<SseEvent, Infallible>>>, StatusCode> {
    if job_id.is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }

    debug!(job_id = %job_id, "SSE client connected");

    let (tx, rx) = mpsc::channel::<SseEvent>(64);
    let jobs = state.jobs.clone();
    let suffix = format!("{job_id}.>");

    tokio::spawn(async move {
        // The subscription lives until the client goes away or the
        // broker side fails; dropping the receiver ends it
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);

        let frame_tx = tx.clone();
        let handler: Handler = Arc::new(move |payload| {
            let frame_tx = frame_tx.clone();
            Box::pin(async move {
                let frame = SseEvent::default().data(String::from_utf8_lossy(&payload).into_owned());
                let _ = frame_tx.send(frame).await;
                Ok(())
            })
        });

        tokio::select! {
            result = jobs.replay_subscribe(shutdown_rx, &suffix, handler) => {
                if let Err(e) = result {
                    error!(job_id = %job_id, error = %e, "Event subscription failed");
                    let frame = SseEvent::default().event("error").data(e.to_string());
                    let _ = tx.send(frame).await;
                }
            }
            _ = tx.closed() => {
                debug!(job_id = %job_id, "SSE client disconnected");
            }
        }
    });

    let stream = ReceiverStream::new(rx).map(Ok::<_, Infallible>);
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
