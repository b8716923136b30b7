// Workflow job payload
//
// WorkflowInputs is the one concrete job schema ("workflow"): built by the
// intake hook from the submission record and the referenced workflows
// record, decoded again by the workflow handler on the worker.

use serde::{Deserialize, Serialize};

/// Inputs of a workflow job.
///
/// `schema` is a JSON-Schema fragment describing `inputs`; keys whose
/// schema carries `format: "file-path"` hold lists of `data` record ids
/// that the worker stages to local files before execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowInputs {
    /// Submission display name, used for the results directory
    pub name: String,

    /// Workflow repository identifier handed to the engine
    pub repository: String,

    /// JSON-Schema fragment describing `inputs`
    pub schema: serde_json::Value,

    /// User-supplied parameter map
    pub inputs: serde_json::Map<String, serde_json::Value>,

    /// Submission record id (same value as the job id)
    pub job_id: String,

    /// Submitting user's record id
    pub user_id: String,
}

impl WorkflowInputs {
    /// Whether `key` is declared as a file input by the schema fragment
    /// (`properties.<key>.format == "file-path"`).
    pub fn is_file_input(&self, key: &str) -> bool {
        self.schema
            .get("properties")
            .and_then(|p| p.get(key))
            .and_then(|f| f.get("format"))
            .and_then(|f| f.as_str())
            .is_some_and(|format| format == "file-path")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> WorkflowInputs {
        serde_json::from_value(serde_json::json!({
            "name": "run-a",
            "repository": "example/taxprofiler",
            "schema": {
                "properties": {
                    "reads": {"type": "array", "format": "file-path"},
                    "label": {"type": "string"}
                }
            },
            "inputs": {"reads": ["rec1", "rec2"], "label": "batch-7"},
            "jobId": "sub42",
            "userId": "user9"
        }))
        .unwrap()
    }

    #[test]
    fn decodes_camel_case_wire_names() {
        let inputs = sample();
        assert_eq!(inputs.job_id, "sub42");
        assert_eq!(inputs.user_id, "user9");
    }

    #[test]
    fn file_inputs_are_detected_from_the_schema_fragment() {
        let inputs = sample();
        assert!(inputs.is_file_input("reads"));
        assert!(!inputs.is_file_input("label"));
        assert!(!inputs.is_file_input("missing"));
    }

    #[test]
    fn schema_without_properties_marks_nothing_as_file() {
        let mut inputs = sample();
        inputs.schema = serde_json::json!({});
        assert!(!inputs.is_file_input("reads"));
    }
}
