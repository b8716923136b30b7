// Results ingestion
//
// The engine's output directory is walked top-down so every entry's
// containing directory already has a record when the entry is visited.
// Folders carry metadata only; files also upload their blob. After the
// walk, the submission's outputs field points at the tree root. Partial
// records from a mid-walk failure are not rolled back.

use anyhow::{anyhow, Context, Result};
use seqrun_records::{FileAttachment, RecordsClient};
use serde_json::json;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Walk `results_dir` and persist it as a record tree, then point the
/// submission's `outputs` field at the root record. An empty results
/// directory creates no records and leaves `outputs` unchanged.
pub async fn store_results(
    records: &RecordsClient,
    user_id: &str,
    submission_id: &str,
    results_dir: &Path,
) -> Result<()> {
    let root_record_id = ingest_tree(records, user_id, submission_id, results_dir).await?;

    let Some(root_record_id) = root_record_id else {
        info!(submission = %submission_id, "No results to ingest");
        return Ok(());
    };

    let mut patch = serde_json::Map::new();
    patch.insert("outputs".to_string(), json!(root_record_id));
    records
        .update_record("submissions", submission_id, &patch)
        .await
        .context("failed to update submission outputs")?;

    info!(submission = %submission_id, root = %root_record_id, "Results ingested");
    Ok(())
}

/// Create one `data` record per entry under `results_dir` (the root
/// itself is skipped) and return the id of the first first-level entry,
/// which roots the tree.
async fn ingest_tree(
    records: &RecordsClient,
    user_id: &str,
    submission_id: &str,
    results_dir: &Path,
) -> Result<Option<String>> {
    if !results_dir.is_dir() {
        return Ok(None);
    }

    // Directory path -> record id, so children can reference their parent
    let mut parent_ids: HashMap<PathBuf, String> = HashMap::new();
    let mut root_record_id: Option<String> = None;

    let mut pending = vec![results_dir.to_path_buf()];
    while let Some(dir) = pending.pop() {
        let mut entries = Vec::new();
        let mut reader = tokio::fs::read_dir(&dir)
            .await
            .with_context(|| format!("failed to read {}", dir.display()))?;
        while let Some(entry) = reader.next_entry().await? {
            entries.push(entry.path());
        }
        // Deterministic order within a directory
        entries.sort();

        for path in entries {
            let relative_path = path
                .strip_prefix(results_dir)
                .context("entry escaped the results dir")?
                .to_string_lossy()
                .to_string();
            let name = path
                .file_name()
                .map(|name| name.to_string_lossy().to_string())
                .ok_or_else(|| anyhow!("entry without a file name: {}", path.display()))?;
            let parent_id = path
                .parent()
                .and_then(|parent| parent_ids.get(parent))
                .cloned()
                .unwrap_or_default();

            let record_id = if path.is_dir() {
                let id = create_folder_record(
                    records,
                    user_id,
                    submission_id,
                    &relative_path,
                    &name,
                    &parent_id,
                )
                .await?;
                parent_ids.insert(path.clone(), id.clone());
                pending.push(path.clone());
                id
            } else {
                let size = tokio::fs::metadata(&path).await?.len();
                let bytes = tokio::fs::read(&path)
                    .await
                    .with_context(|| format!("failed to read {}", path.display()))?;
                create_file_record(
                    records,
                    user_id,
                    submission_id,
                    &relative_path,
                    &name,
                    &parent_id,
                    size,
                    bytes,
                )
                .await?
            };

            if root_record_id.is_none() && path.parent() == Some(results_dir) {
                root_record_id = Some(record_id);
            }

            debug!(path = %relative_path, "Ingested results entry");
        }
    }

    Ok(root_record_id)
}

async fn create_folder_record(
    records: &RecordsClient,
    user_id: &str,
    submission_id: &str,
    relative_path: &str,
    name: &str,
    parent_id: &str,
) -> Result<String> {
    let mut fields = serde_json::Map::new();
    fields.insert("name".to_string(), json!(name));
    fields.insert("relativePath".to_string(), json!(relative_path));
    fields.insert("type".to_string(), json!("folder"));
    fields.insert("user".to_string(), json!(user_id));
    fields.insert("submission".to_string(), json!(submission_id));
    fields.insert("parent".to_string(), json!(parent_id));

    let record = records
        .create_record("data", &fields)
        .await
        .with_context(|| format!("failed to create folder record for {relative_path}"))?;
    record_id(&record, relative_path)
}

#[allow(clippy::too_many_arguments)]
async fn create_file_record(
    records: &RecordsClient,
    user_id: &str,
    submission_id: &str,
    relative_path: &str,
    name: &str,
    parent_id: &str,
    size: u64,
    bytes: Vec<u8>,
) -> Result<String> {
    let mut fields = serde_json::Map::new();
    fields.insert("name".to_string(), json!(name));
    fields.insert("relativePath".to_string(), json!(relative_path));
    fields.insert("type".to_string(), json!("file"));
    fields.insert("size".to_string(), json!(size));
    fields.insert("user".to_string(), json!(user_id));
    fields.insert("submission".to_string(), json!(submission_id));
    fields.insert("parent".to_string(), json!(parent_id));

    let files = vec![FileAttachment {
        field: "file".to_string(),
        file_name: name.to_string(),
        bytes,
    }];

    let record = records
        .create_record_with_files("data", &fields, &files)
        .await
        .with_context(|| format!("failed to create file record for {relative_path}"))?;
    record_id(&record, relative_path)
}

fn record_id(record: &serde_json::Value, relative_path: &str) -> Result<String> {
    record["id"]
        .as_str()
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .ok_or_else(|| anyhow!("record for {relative_path} did not return an id"))
}
