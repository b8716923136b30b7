// Submission intake
//
// Two hooks the records app invokes around submission creation: the
// request hook stamps the initial lifecycle state, the success hook
// builds the workflow inputs and enqueues the job. Admin-created
// submissions bypass intake entirely.

use anyhow::{anyhow, Context, Result};
use seqrun_core::{JobStatus, WorkflowInputs};
use seqrun_jobs::JobService;
use seqrun_records::RecordsClient;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

/// Who is creating the record.
#[derive(Debug, Clone)]
pub struct AuthContext {
    /// Auth record id of the caller
    pub user_id: String,
    /// Admins bypass intake
    pub is_admin: bool,
}

/// Record-creation hooks for the `submissions` collection.
pub struct IntakeHook {
    jobs: JobService,
    records: Arc<RecordsClient>,
}

impl IntakeHook {
    pub fn new(jobs: JobService, records: Arc<RecordsClient>) -> Self {
        Self { jobs, records }
    }

    /// Before the record is persisted: initialize its status. Runs for
    /// every caller, admin or not.
    pub fn on_create_request(&self, fields: &mut serde_json::Map<String, Value>) {
        fields.insert("status".to_string(), json!(JobStatus::Created));
    }

    /// After the record is persisted: resolve the referenced workflow,
    /// assemble the job inputs and enqueue. Errors propagate to the
    /// record-create pipeline; the record itself is not rolled back.
    pub async fn on_create_success(&self, auth: &AuthContext, record: &Value) -> Result<()> {
        if auth.is_admin {
            return Ok(());
        }

        let submission_id = record["id"]
            .as_str()
            .ok_or_else(|| anyhow!("submission record has no id"))?;
        let name = record["name"].as_str().unwrap_or_default().to_string();
        let params = json_field(record, "params")?
            .as_object()
            .cloned()
            .unwrap_or_default();

        let workflow_id = record["workflow"]
            .as_str()
            .ok_or_else(|| anyhow!("submission {submission_id} references no workflow"))?;
        let workflow = self
            .records
            .view_record("workflows", workflow_id)
            .await
            .context("failed to fetch workflow record")?;

        let repository = workflow["repository"]
            .as_str()
            .ok_or_else(|| anyhow!("workflow {workflow_id} has no repository"))?
            .to_string();
        let schema = json_field(&workflow, "schema")?;

        let inputs = WorkflowInputs {
            name,
            repository,
            schema,
            inputs: params,
            job_id: submission_id.to_string(),
            user_id: auth.user_id.clone(),
        };

        self.jobs
            .queue(submission_id, serde_json::to_value(&inputs)?, "workflow")
            .await
            .context("failed to queue job")?;

        info!(job_id = %submission_id, "Job successfully queued");
        Ok(())
    }
}

/// JSON fields may arrive inline or as an encoded string, depending on
/// how the records app serialized them.
fn json_field(record: &Value, key: &str) -> Result<Value> {
    match &record[key] {
        Value::String(raw) if !raw.is_empty() => {
            serde_json::from_str(raw).with_context(|| format!("field {key} is not valid JSON"))
        }
        Value::Null => Ok(json!({})),
        other => Ok(other.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_field_accepts_inline_and_encoded_values() {
        let record = json!({
            "inline": {"a": 1},
            "encoded": "{\"b\": 2}",
            "empty": ""
        });

        assert_eq!(json_field(&record, "inline").unwrap()["a"], 1);
        assert_eq!(json_field(&record, "encoded").unwrap()["b"], 2);
        assert_eq!(json_field(&record, "missing").unwrap(), json!({}));
        assert_eq!(json_field(&record, "empty").unwrap(), json!(""));
    }
}
