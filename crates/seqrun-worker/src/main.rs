// Seqrun worker
//
// Wires the broker, the records client and the job service together,
// registers the workflow handler and runs the dispatch loop until
// interrupted. In-flight jobs finish before the process exits; restart
// policy after a subscription failure belongs to the deployment.

use anyhow::{Context, Result};
use seqrun_core::Config;
use seqrun_jobs::JobService;
use seqrun_mq::JetStreamQueue;
use seqrun_records::RecordsClient;
use seqrun_worker::WorkflowHandler;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Concurrent workflow handlers per worker process
const MAX_CONCURRENCY: usize = 2;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("seqrun_worker={level},seqrun_jobs={level},seqrun_mq={level}",
                    level = config.logging.level.as_filter())
                .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("seqrun-worker starting...");

    // Broker connectivity failure at startup is fatal
    let mq = Arc::new(
        JetStreamQueue::connect(&config.mq.url())
            .await
            .context("failed to connect to broker")?,
    );

    let records = Arc::new(RecordsClient::new(&config.api.url(), None));
    records
        .set_auth_credentials(
            "users",
            &config.api.default_admin_email(),
            &config.api.default_admin_password(),
        )
        .await;

    let mut jobs = JobService::new(mq.clone())
        .await
        .context("failed to initialize job service")?;
    jobs.register_handler(
        "workflow",
        Arc::new(WorkflowHandler::new(config.clone(), records)),
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        wait_for_signal().await;
        tracing::info!("Shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    match jobs.process(shutdown_rx, MAX_CONCURRENCY).await {
        Ok(()) => {
            tracing::info!("Worker stopped");
            Ok(())
        }
        Err(e) => {
            tracing::error!(error = %e, "Dispatch loop failed");
            // Give log shippers and the broker a moment before exit;
            // whether to restart is the deployment's call
            tokio::time::sleep(Duration::from_secs(2)).await;
            Err(e.into())
        }
    }
}

async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut terminate =
            signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = terminate.recv() => {}
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
