// Workflow job handler
//
// The one registered handler (schema "workflow"). Any step failure
// surfaces as a handler error - the job service turns it into a
// terminal error event - after the workspace has been cleaned up.

use anyhow::{Context, Result};
use async_trait::async_trait;
use seqrun_core::{subjects, Config, WorkflowInputs};
use seqrun_jobs::JobHandler;
use seqrun_records::RecordsClient;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::engine::{engine_command, EngineConfig};
use crate::ingest;
use crate::paths::WorkflowPaths;
use crate::runner::ProcessRunner;
use crate::staging;

/// Executes workflow jobs end to end.
pub struct WorkflowHandler {
    config: Config,
    records: Arc<RecordsClient>,
    runner: ProcessRunner,
    /// Base workflows directory; defaults to `<cwd>/pb_data/workflows`
    base_dir: Option<PathBuf>,
}

impl WorkflowHandler {
    pub fn new(config: Config, records: Arc<RecordsClient>) -> Self {
        Self {
            config,
            records,
            runner: ProcessRunner::new(),
            base_dir: None,
        }
    }

    /// Override the base workflows directory (used by tests).
    pub fn with_base_dir(mut self, base_dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(base_dir.into());
        self
    }

    fn paths_for(&self, inputs: &WorkflowInputs) -> Result<WorkflowPaths> {
        let base = match &self.base_dir {
            Some(base) => base.clone(),
            None => WorkflowPaths::default_base()?,
        };
        Ok(WorkflowPaths::for_job(&base, &inputs.job_id, &inputs.name))
    }

    /// The pipeline proper: engine config, input staging, execution,
    /// ingestion. Workspace lifetime is managed by the caller.
    async fn execute(&self, paths: &WorkflowPaths, inputs: &WorkflowInputs) -> Result<()> {
        debug!(job_id = %inputs.job_id, "Generating engine config");
        let engine_config = EngineConfig::detect()
            .with_events(self.config.mq.url(), subjects::job_events(&inputs.job_id))
            .write_to_temp()
            .context("failed to generate engine config")?;

        debug!(job_id = %inputs.job_id, "Staging inputs");
        let params_file = staging::prepare_params_file(&self.records, inputs, &paths.inputs_dir)
            .await
            .context("failed to prepare inputs")?;

        info!(job_id = %inputs.job_id, repository = %inputs.repository, "Executing workflow");
        let spec = engine_command(
            paths,
            &inputs.repository,
            engine_config.path(),
            params_file.path(),
            &self.config.nxf.plugins_test_repository(),
        );
        self.runner
            .run(&spec)
            .await
            .context("workflow execution failed")?;

        debug!(job_id = %inputs.job_id, "Storing results");
        ingest::store_results(
            &self.records,
            &inputs.user_id,
            &inputs.job_id,
            &paths.results_dir,
        )
        .await
        .context("failed to store results")?;

        Ok(())
    }

    /// Streamed variant: returns a bounded channel of engine log lines
    /// that closes on exit. Ingestion and cleanup run after the stream
    /// drains; callers must consume the channel to keep the engine's
    /// output flowing.
    pub async fn run_with_logs(&self, inputs: WorkflowInputs) -> Result<mpsc::Receiver<String>> {
        let paths = self.paths_for(&inputs)?;
        paths.prepare().await.context("failed to prepare workspace")?;

        let engine_config = EngineConfig::detect()
            .with_events(self.config.mq.url(), subjects::job_events(&inputs.job_id))
            .write_to_temp()
            .context("failed to generate engine config")?;
        let params_file = staging::prepare_params_file(&self.records, &inputs, &paths.inputs_dir)
            .await
            .context("failed to prepare inputs")?;

        let spec = engine_command(
            &paths,
            &inputs.repository,
            engine_config.path(),
            params_file.path(),
            &self.config.nxf.plugins_test_repository(),
        );
        let mut engine_rx = self.runner.run_streamed(&spec).await?;

        let (tx, rx) = mpsc::channel(64);
        let records = self.records.clone();
        tokio::spawn(async move {
            // Temp files live until the engine exits
            let _engine_config = engine_config;
            let _params_file = params_file;

            while let Some(line) = engine_rx.recv().await {
                // A departed subscriber doesn't stop the run
                let _ = tx.send(line).await;
            }

            if let Err(e) =
                ingest::store_results(&records, &inputs.user_id, &inputs.job_id, &paths.results_dir)
                    .await
            {
                error!(job_id = %inputs.job_id, error = %e, "Failed to store results");
            }
            paths.cleanup().await;
        });

        Ok(rx)
    }
}

#[async_trait]
impl JobHandler for WorkflowHandler {
    async fn handle(&self, inputs: &serde_json::Value) -> Result<()> {
        let inputs: WorkflowInputs = serde_json::from_value(inputs.clone())
            .context("failed to decode workflow inputs")?;

        let paths = self.paths_for(&inputs)?;
        paths.prepare().await.context("failed to prepare workspace")?;

        let result = self.execute(&paths, &inputs).await;

        // Success or failure, the workspace goes away; the engine log
        // under logs/ is the only artifact left on disk
        paths.cleanup().await;

        result
    }
}
