// Per-job workspace layout
//
// Everything a job touches lives under <base>/<jobId> except the engine
// log, which goes to <base>/logs/<jobId>.log so it survives workspace
// cleanup. The workspace is exclusive to one handler invocation and
// removed when it returns; reruns of the same job id are not supported.

use std::path::{Path, PathBuf};
use tracing::warn;

/// Derived filesystem paths for one workflow invocation.
#[derive(Debug, Clone)]
pub struct WorkflowPaths {
    /// Shared workflows directory, also the engine's working directory
    pub base_dir: PathBuf,
    /// Per-job workspace, removed on exit
    pub job_dir: PathBuf,
    /// Staged input files, one subdirectory per file-valued input key
    pub inputs_dir: PathBuf,
    /// Engine-owned state (home, work, temp, cache) for this job
    pub nxf_dir: PathBuf,
    /// Engine log file
    pub log_path: PathBuf,
    /// Engine output directory, walked during ingestion
    pub results_dir: PathBuf,
}

impl WorkflowPaths {
    /// Derive the workspace for one job under `base_dir`.
    pub fn for_job(base_dir: &Path, job_id: &str, run_name: &str) -> Self {
        let job_dir = base_dir.join(job_id);
        Self {
            base_dir: base_dir.to_path_buf(),
            inputs_dir: job_dir.join("inputs"),
            nxf_dir: job_dir.join("nxf"),
            log_path: base_dir.join("logs").join(format!("{job_id}.log")),
            results_dir: job_dir.join(format!("{run_name}_results")),
            job_dir,
        }
    }

    /// The default base: `<cwd>/pb_data/workflows`.
    pub fn default_base() -> std::io::Result<PathBuf> {
        Ok(std::env::current_dir()?.join("pb_data").join("workflows"))
    }

    /// Create the directories a job needs before staging begins.
    pub async fn prepare(&self) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.job_dir).await?;
        tokio::fs::create_dir_all(&self.inputs_dir).await?;
        if let Some(logs_dir) = self.log_path.parent() {
            tokio::fs::create_dir_all(logs_dir).await?;
        }
        Ok(())
    }

    /// Remove the per-job workspace. Failures are logged, not
    /// propagated: cleanup runs on error paths where the original
    /// failure is the one worth surfacing.
    pub async fn cleanup(&self) {
        if let Err(e) = tokio::fs::remove_dir_all(&self.job_dir).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(job_dir = %self.job_dir.display(), error = %e, "Failed to remove job workspace");
            }
        }
    }
}
