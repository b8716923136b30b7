// Engine configuration and invocation
//
// The workflow engine is launched from the shared base directory with a
// generated config capping it to the host's resources, and with every
// piece of engine-owned state (home, assets, plugins, work, temp, cache)
// redirected under the per-job workspace. When broker wiring is present
// the config also loads the engine's messaging plugin, so the engine
// publishes its own lifecycle events under the job's event subject.

use anyhow::{Context, Result};
use std::io::Write;
use std::path::Path;
use sysinfo::System;
use tempfile::NamedTempFile;

use crate::paths::WorkflowPaths;
use crate::runner::CommandSpec;

const GIB: u64 = 1024 * 1024 * 1024;

/// Engine-side event types forwarded to the broker
const ENGINE_EVENTS: [&str; 5] = [
    "workflow.start",
    "workflow.error",
    "workflow.complete",
    "process.start",
    "process.complete",
];

/// Broker wiring rendered into the engine config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineEvents {
    /// Broker endpoint the engine's messaging plugin connects to
    pub broker_url: String,
    /// Per-job subject prefix; the plugin publishes its event types
    /// beneath it
    pub subject: String,
}

/// Host resource limits and broker wiring rendered into the engine
/// config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub max_cpus: usize,
    pub max_memory_gb: u64,
    pub events: Option<EngineEvents>,
}

impl EngineConfig {
    /// Infer limits from the host: logical CPU count and currently
    /// available memory in whole GB.
    pub fn detect() -> Self {
        let max_cpus = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);

        let mut system = System::new();
        system.refresh_memory();
        let max_memory_gb = (system.available_memory() / GIB).max(1);

        Self {
            max_cpus,
            max_memory_gb,
            events: None,
        }
    }

    /// Wire the engine's messaging plugin to the broker so it publishes
    /// lifecycle events under `subject`.
    pub fn with_events(mut self, broker_url: impl Into<String>, subject: impl Into<String>) -> Self {
        self.events = Some(EngineEvents {
            broker_url: broker_url.into(),
            subject: subject.into(),
        });
        self
    }

    /// Render the engine config file contents.
    pub fn render(&self) -> String {
        let memory = format!("{}.GB", self.max_memory_gb);
        let mut rendered = format!(
            "process {{\n    \
                 resourceLimits = [ cpus: {cpus}, memory: '{memory}' ]\n\
             }}\n\
             \n\
             executor {{\n    \
                 cpus = {cpus}\n    \
                 memory = '{memory}'\n\
             }}\n",
            cpus = self.max_cpus,
        );

        if let Some(events) = &self.events {
            let event_list = ENGINE_EVENTS
                .iter()
                .map(|event| format!("'{event}'"))
                .collect::<Vec<_>>()
                .join(", ");
            rendered.push_str(&format!(
                "\n\
                 plugins {{\n    \
                     id 'nf-nats'\n\
                 }}\n\
                 \n\
                 nats {{\n    \
                     enabled = true\n    \
                     url = '{url}'\n    \
                     subject = '{subject}'\n    \
                     jetstream = false\n    \
                     events = [{event_list}]\n\
                 }}\n",
                url = events.broker_url,
                subject = events.subject,
            ));
        }

        rendered
    }

    /// Write the rendered config to a unique temporary file. The file is
    /// deleted when the returned handle drops.
    pub fn write_to_temp(&self) -> Result<NamedTempFile> {
        let mut file = tempfile::Builder::new()
            .prefix("nextflow-")
            .suffix(".config")
            .tempfile()
            .context("failed to create engine config file")?;
        file.write_all(self.render().as_bytes())
            .context("failed to write engine config")?;
        file.flush().context("failed to flush engine config")?;
        Ok(file)
    }
}

/// Assemble the engine invocation for one job.
pub fn engine_command(
    paths: &WorkflowPaths,
    repository: &str,
    config_path: &Path,
    params_path: &Path,
    plugins_test_repository: &str,
) -> CommandSpec {
    let nxf = &paths.nxf_dir;

    let mut spec = CommandSpec::new(paths.base_dir.join("nextflow"))
        .args([
            "-log".to_string(),
            paths.log_path.display().to_string(),
            "run".to_string(),
            repository.to_string(),
            // Always pull the latest revision of the workflow
            "-latest".to_string(),
            "-c".to_string(),
            config_path.display().to_string(),
            "-params-file".to_string(),
            params_path.display().to_string(),
            "--outdir".to_string(),
            paths.results_dir.display().to_string(),
        ])
        .working_dir(&paths.base_dir)
        .env("NXF_HOME", nxf.display().to_string())
        .env("NXF_ASSETS", nxf.join("assets").display().to_string())
        .env("NXF_PLUGINS_DIR", nxf.join("plugins").display().to_string())
        .env("NXF_WORK", nxf.join("work").display().to_string())
        .env("NXF_TEMP", nxf.join("tmp").display().to_string())
        .env("NXF_CACHE_DIR", nxf.join("cache").display().to_string());

    if !plugins_test_repository.is_empty() {
        spec = spec.env("NXF_PLUGINS_TEST_REPOSITORY", plugins_test_repository);
    }

    spec
}
