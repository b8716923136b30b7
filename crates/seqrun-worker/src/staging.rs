// Input staging
//
// File-valued inputs arrive as lists of data-record ids. Each referenced
// blob is downloaded with a scoped token into a per-key subdirectory of
// the job's inputs directory, the list is replaced by that directory's
// absolute path, and the mutated map is written to a temporary params
// file handed to the engine.

use anyhow::{anyhow, Context, Result};
use seqrun_core::WorkflowInputs;
use seqrun_records::{DownloadOptions, RecordsClient};
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::debug;

/// Spaces become underscores; nothing else is transformed.
pub fn sanitize_file_name(name: &str) -> String {
    name.replace(' ', "_")
}

/// Stage file inputs and write the engine params file. The returned
/// handle owns the temp file; it is deleted on drop.
pub async fn prepare_params_file(
    records: &RecordsClient,
    inputs: &WorkflowInputs,
    inputs_dir: &Path,
) -> Result<NamedTempFile> {
    let mut staged = inputs.inputs.clone();

    for (key, value) in staged.iter_mut() {
        if !inputs.is_file_input(key) {
            continue;
        }

        let ids = value
            .as_array()
            .ok_or_else(|| anyhow!("input {key} must be a list of record ids"))?
            .clone();

        let key_dir = inputs_dir.join(key);
        tokio::fs::create_dir_all(&key_dir)
            .await
            .with_context(|| format!("failed to create staging dir for input {key}"))?;

        for id in &ids {
            let id = id
                .as_str()
                .ok_or_else(|| anyhow!("record id in input {key} is not a string"))?;

            let record = records
                .view_record("data", id)
                .await
                .with_context(|| format!("failed to fetch record {id}"))?;

            let file_name = record["file"]
                .as_str()
                .filter(|name| !name.is_empty())
                .ok_or_else(|| anyhow!("missing file name in record {id}"))?;

            let dest = key_dir.join(sanitize_file_name(file_name));
            records
                .download_file(
                    "data",
                    id,
                    file_name,
                    &dest,
                    &DownloadOptions {
                        with_token: true,
                        ..Default::default()
                    },
                )
                .await
                .with_context(|| format!("failed to download file {file_name}"))?;

            debug!(record = %id, dest = %dest.display(), "Staged input file");
        }

        let absolute = tokio::fs::canonicalize(&key_dir)
            .await
            .with_context(|| format!("failed to resolve staging dir for input {key}"))?;
        *value = serde_json::Value::String(absolute.display().to_string());
    }

    let mut file = tempfile::Builder::new()
        .prefix("seqrun_params_")
        .suffix(".json")
        .tempfile()
        .context("failed to create params file")?;
    file.write_all(&serde_json::to_vec(&staged).context("failed to serialize params")?)
        .context("failed to write params file")?;
    file.flush().context("failed to flush params file")?;

    Ok(file)
}
