// Integration tests for the workflow pipeline
//
// The records app is mocked; the engine is a stub shell script dropped
// into the base workflows directory. Together they exercise staging,
// execution, ingestion and workspace hygiene end to end.

use std::path::Path;
use std::sync::Arc;

use seqrun_core::{Config, WorkflowInputs};
use seqrun_jobs::JobHandler;
use seqrun_records::RecordsClient;
use seqrun_worker::WorkflowHandler;
use serde_json::json;
use wiremock::matchers::{header, method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn mock_health(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/api/health"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"code": 200, "message": "ok"})),
        )
        .mount(server)
        .await;
}

fn workflow_inputs(server_inputs: serde_json::Value, schema: serde_json::Value) -> WorkflowInputs {
    serde_json::from_value(json!({
        "name": "run-a",
        "repository": "example/taxprofiler",
        "schema": schema,
        "inputs": server_inputs,
        "jobId": "sub1",
        "userId": "user1"
    }))
    .unwrap()
}

/// Drop a stub engine into `base_dir` that prints a couple of log lines
/// and writes one report file into the directory passed via --outdir.
#[cfg(unix)]
fn install_stub_engine(base_dir: &Path) {
    use std::os::unix::fs::PermissionsExt;

    let script = r#"#!/bin/sh
outdir=""
prev=""
for arg in "$@"; do
    if [ "$prev" = "--outdir" ]; then outdir="$arg"; fi
    prev="$arg"
done
echo "launching workflow"
mkdir -p "$outdir/report"
printf 'workflow ran\n' > "$outdir/report/out.txt"
echo "workflow finished"
"#;

    let engine = base_dir.join("nextflow");
    std::fs::write(&engine, script).unwrap();
    std::fs::set_permissions(&engine, std::fs::Permissions::from_mode(0o755)).unwrap();
}

#[tokio::test]
async fn test_staging_downloads_inputs_and_rewrites_params() {
    let server = MockServer::start().await;
    mock_health(&server).await;

    Mock::given(method("GET"))
        .and(path("/api/collections/data/records/rec1"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"id": "rec1", "file": "my reads.fastq"})),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/files/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"token": "scoped"})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/api/files/data/rec1/.*$"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"@r1\nACGT\n".to_vec()))
        .mount(&server)
        .await;

    let records = RecordsClient::new(&server.uri(), None);
    let inputs = workflow_inputs(
        json!({"reads": ["rec1"], "label": "batch-7"}),
        json!({"properties": {"reads": {"format": "file-path"}}}),
    );

    let dir = tempfile::tempdir().unwrap();
    let inputs_dir = dir.path().join("inputs");

    let params_file = seqrun_worker::prepare_params_file(&records, &inputs, &inputs_dir)
        .await
        .unwrap();

    // Blob landed under <inputsDir>/<key>/ with spaces sanitized
    let staged = inputs_dir.join("reads").join("my_reads.fastq");
    assert_eq!(std::fs::read_to_string(&staged).unwrap(), "@r1\nACGT\n");

    // The params file replaces the id list with the absolute dir path
    let params: serde_json::Value =
        serde_json::from_slice(&std::fs::read(params_file.path()).unwrap()).unwrap();
    let reads_dir = params["reads"].as_str().unwrap();
    assert!(Path::new(reads_dir).is_absolute());
    assert!(reads_dir.ends_with("/reads"));
    assert_eq!(params["label"], "batch-7");
}

#[tokio::test]
async fn test_ingestion_builds_record_tree_and_patches_outputs() {
    let server = MockServer::start().await;
    mock_health(&server).await;

    // Folder creation is plain JSON, file creation is multipart
    Mock::given(method("POST"))
        .and(path("/api/collections/data/records"))
        .and(header("content-type", "application/json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "folder1"})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/collections/data/records"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "file1"})))
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/api/collections/submissions/records/sub1"))
        .and(wiremock::matchers::body_json(json!({"outputs": "folder1"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "sub1"})))
        .expect(1)
        .mount(&server)
        .await;

    let results = tempfile::tempdir().unwrap();
    std::fs::create_dir(results.path().join("report")).unwrap();
    std::fs::write(results.path().join("report").join("out.txt"), "workflow ran\n").unwrap();

    let records = RecordsClient::new(&server.uri(), None);
    seqrun_worker::store_results(&records, "user1", "sub1", results.path())
        .await
        .unwrap();

    let requests = server.received_requests().await.unwrap();

    // The folder record roots the tree
    let folder_create = requests
        .iter()
        .find(|r| {
            r.method.to_string() == "POST"
                && r.url.path() == "/api/collections/data/records"
                && r.headers
                    .get("content-type")
                    .is_some_and(|v| v.to_str().unwrap_or_default() == "application/json")
        })
        .expect("no folder record created");
    let folder_body: serde_json::Value = serde_json::from_slice(&folder_create.body).unwrap();
    assert_eq!(folder_body["relativePath"], "report");
    assert_eq!(folder_body["type"], "folder");
    assert_eq!(folder_body["parent"], "");
    assert_eq!(folder_body["submission"], "sub1");

    // The file record hangs off the folder and carries the blob
    let file_create = requests
        .iter()
        .find(|r| {
            r.method.to_string() == "POST"
                && r.url.path() == "/api/collections/data/records"
                && r.headers
                    .get("content-type")
                    .is_some_and(|v| v.to_str().unwrap_or_default().starts_with("multipart"))
        })
        .expect("no file record created");
    let file_body = String::from_utf8_lossy(&file_create.body);
    assert!(file_body.contains("workflow ran"));
    assert!(file_body.contains("folder1"));
    assert!(file_body.contains("report/out.txt"));
}

#[tokio::test]
async fn test_ingestion_of_empty_results_leaves_outputs_unchanged() {
    let server = MockServer::start().await;
    mock_health(&server).await;

    let results = tempfile::tempdir().unwrap();
    let records = RecordsClient::new(&server.uri(), None);
    seqrun_worker::store_results(&records, "user1", "sub1", results.path())
        .await
        .unwrap();

    let requests = server.received_requests().await.unwrap();
    assert!(
        !requests.iter().any(|r| r.method.to_string() != "GET"),
        "empty results must not create records or patch the submission"
    );
}

#[cfg(unix)]
#[tokio::test]
async fn test_handler_happy_path_ingests_and_cleans_workspace() {
    let server = MockServer::start().await;
    mock_health(&server).await;

    Mock::given(method("POST"))
        .and(path("/api/collections/data/records"))
        .and(header("content-type", "application/json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "folder1"})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/collections/data/records"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "file1"})))
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/api/collections/submissions/records/sub1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "sub1"})))
        .expect(1)
        .mount(&server)
        .await;

    let base = tempfile::tempdir().unwrap();
    install_stub_engine(base.path());

    let records = Arc::new(RecordsClient::new(&server.uri(), None));
    let handler =
        WorkflowHandler::new(Config::default(), records).with_base_dir(base.path());

    let inputs = workflow_inputs(json!({"label": "batch-7"}), json!({"properties": {}}));
    let payload = serde_json::to_value(&inputs).unwrap();

    handler.handle(&payload).await.unwrap();

    // The workspace is gone; the engine log directory survives
    assert!(!base.path().join("sub1").exists());
}

#[cfg(unix)]
#[tokio::test]
async fn test_run_with_logs_streams_engine_output_then_ingests() {
    let server = MockServer::start().await;
    mock_health(&server).await;

    Mock::given(method("POST"))
        .and(path("/api/collections/data/records"))
        .and(header("content-type", "application/json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "folder1"})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/collections/data/records"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "file1"})))
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/api/collections/submissions/records/sub1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "sub1"})))
        .expect(1)
        .mount(&server)
        .await;

    let base = tempfile::tempdir().unwrap();
    install_stub_engine(base.path());

    let records = Arc::new(RecordsClient::new(&server.uri(), None));
    let handler =
        WorkflowHandler::new(Config::default(), records).with_base_dir(base.path());

    let inputs = workflow_inputs(json!({"label": "batch-7"}), json!({"properties": {}}));
    let mut logs = handler.run_with_logs(inputs).await.unwrap();

    // The channel carries the engine's output and closes on exit
    let mut lines = Vec::new();
    while let Some(line) = logs.recv().await {
        lines.push(line);
    }
    assert!(lines.iter().any(|l| l.contains("launching workflow")));
    assert!(lines.iter().any(|l| l.contains("workflow finished")));

    // Ingestion and cleanup run after the stream drains
    for _ in 0..500 {
        let patched = server
            .received_requests()
            .await
            .unwrap()
            .iter()
            .any(|r| r.method.to_string() == "PATCH");
        if patched && !base.path().join("sub1").exists() {
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    panic!("results were not ingested or the workspace survived");
}

#[tokio::test]
async fn test_handler_missing_input_record_fails_and_cleans_workspace() {
    let server = MockServer::start().await;
    mock_health(&server).await;

    Mock::given(method("GET"))
        .and(path("/api/collections/data/records/missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let base = tempfile::tempdir().unwrap();

    let records = Arc::new(RecordsClient::new(&server.uri(), None));
    let handler =
        WorkflowHandler::new(Config::default(), records).with_base_dir(base.path());

    let inputs = workflow_inputs(
        json!({"reads": ["missing"]}),
        json!({"properties": {"reads": {"format": "file-path"}}}),
    );
    let payload = serde_json::to_value(&inputs).unwrap();

    let err = handler.handle(&payload).await.unwrap_err();
    assert!(format!("{err:#}").contains("missing"));

    // Partial staging directories are removed with the workspace
    assert!(!base.path().join("sub1").exists());
}
