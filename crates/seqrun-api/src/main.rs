// Seqrun API server
//
// Serves the job event-stream endpoint and runs the status projector.
// Record CRUD and authentication stay in the external records app; this
// process only carries the job-facing surface.

use anyhow::{Context, Result};
use axum::{routing::get, Json, Router};
use seqrun_api::sse;
use seqrun_core::Config;
use seqrun_jobs::{JobService, StatusProjector};
use seqrun_mq::JetStreamQueue;
use seqrun_records::RecordsClient;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::watch;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(sse::subscribe_job),
    components(schemas(seqrun_core::Job, seqrun_core::JobStatus)),
    tags(
        (name = "jobs", description = "Job lifecycle event streaming")
    ),
    info(
        title = "Seqrun API",
        version = "0.1.0",
        description = "Job event streaming for the seqrun platform",
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    )
)]
struct ApiDoc;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!(
                    "seqrun_api={level},seqrun_jobs={level},tower_http=debug",
                    level = config.logging.level.as_filter()
                )
                .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("seqrun-api starting...");

    let mq = Arc::new(
        JetStreamQueue::connect(&config.mq.url())
            .await
            .context("failed to connect to broker")?,
    );
    let jobs = JobService::new(mq.clone())
        .await
        .context("failed to initialize job service")?;

    let records = Arc::new(RecordsClient::new(&config.api.url(), None));
    records
        .set_auth_credentials(
            "users",
            &config.api.default_admin_email(),
            &config.api.default_admin_password(),
        )
        .await;

    // Status projection runs for the life of the server
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    let projector = StatusProjector::new(jobs.clone(), records.clone());
    tokio::spawn(async move {
        if let Err(e) = projector.run(shutdown_rx).await {
            tracing::error!(error = %e, "Status projector stopped");
        }
    });

    let sse_state = sse::AppState { jobs };

    let app = Router::new()
        .route("/health", get(health))
        .merge(sse::routes(sse_state))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http());

    let addr = "0.0.0.0:9000";
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("failed to bind to address")?;
    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app).await.context("server error")?;

    Ok(())
}
