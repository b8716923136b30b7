// Integration tests for the records client
//
// These run against a local mock of the records app and cover the
// request contract: one-time health probe, token storage, the single
// 401 refresh-and-retry, multipart creation and scoped downloads.

use std::time::Duration;

use seqrun_records::{DownloadOptions, FileAttachment, RecordsClient, RecordsError};
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path, query_param};
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

#[tokio::test]
async fn test_health_probe_runs_once() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/health"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"code": 200, "message": "ok"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/collections/data/records/rec1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "rec1"})))
        .expect(2)
        .mount(&server)
        .await;

    let client = RecordsClient::new(&server.uri(), None);
    client.view_record("data", "rec1").await.unwrap();
    client.view_record("data", "rec1").await.unwrap();
}

#[tokio::test]
async fn test_unhealthy_server_fails_after_bounded_retries() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/health"))
        .respond_with(ResponseTemplate::new(503))
        .expect(2)
        .mount(&server)
        .await;

    let client = RecordsClient::new(&server.uri(), None)
        .with_health_retry(2, Duration::from_millis(10));

    let err = client.view_record("data", "rec1").await.unwrap_err();
    assert!(matches!(err, RecordsError::Unhealthy(_)));
}

#[tokio::test]
async fn test_auth_with_password_stores_token() {
    let server = MockServer::start().await;
    mock_health(&server).await;

    Mock::given(method("POST"))
        .and(path("/api/collections/users/auth-with-password"))
        .and(body_json(json!({"identity": "svc@local", "password": "hunter2"})))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"token": "tok1", "record": {"id": "u1"}})),
        )
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/collections/submissions/records/s1"))
        .and(header("authorization", "Bearer tok1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "s1"})))
        .mount(&server)
        .await;

    let client = RecordsClient::new(&server.uri(), None);
    let auth = client
        .auth_with_password("users", "svc@local", "hunter2")
        .await
        .unwrap();
    assert_eq!(auth.token, "tok1");

    // Subsequent requests carry the stored token
    let record = client.view_record("submissions", "s1").await.unwrap();
    assert_eq!(record["id"], "s1");
}

#[tokio::test]
async fn test_expired_token_refreshes_and_retries_once() {
    let server = MockServer::start().await;
    mock_health(&server).await;

    Mock::given(method("GET"))
        .and(path("/api/collections/data/records/rec1"))
        .and(header("authorization", "Bearer stale"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/collections/users/auth-refresh"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"token": "fresh", "record": {}})),
        )
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/collections/data/records/rec1"))
        .and(header("authorization", "Bearer fresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "rec1"})))
        .expect(1)
        .mount(&server)
        .await;

    let client = RecordsClient::new(&server.uri(), Some("stale".to_string()));
    client
        .set_auth_credentials("users", "svc@local", "hunter2")
        .await;

    let record = client.view_record("data", "rec1").await.unwrap();
    assert_eq!(record["id"], "rec1");
}

#[tokio::test]
async fn test_refresh_failure_falls_back_to_password_login() {
    let server = MockServer::start().await;
    mock_health(&server).await;

    Mock::given(method("GET"))
        .and(path("/api/collections/data/records/rec1"))
        .and(header("authorization", "Bearer stale"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/collections/users/auth-refresh"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/collections/users/auth-with-password"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"token": "fresh", "record": {}})),
        )
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/collections/data/records/rec1"))
        .and(header("authorization", "Bearer fresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "rec1"})))
        .mount(&server)
        .await;

    let client = RecordsClient::new(&server.uri(), Some("stale".to_string()));
    client
        .set_auth_credentials("users", "svc@local", "hunter2")
        .await;

    let record = client.view_record("data", "rec1").await.unwrap();
    assert_eq!(record["id"], "rec1");
}

#[tokio::test]
async fn test_create_record_with_files_sends_multipart() {
    let server = MockServer::start().await;
    mock_health(&server).await;

    Mock::given(method("POST"))
        .and(path("/api/collections/data/records"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "d1"})))
        .mount(&server)
        .await;

    let client = RecordsClient::new(&server.uri(), None);

    let mut fields = serde_json::Map::new();
    fields.insert("name".to_string(), json!("out.txt"));
    fields.insert("type".to_string(), json!("file"));
    fields.insert("size".to_string(), json!(4));

    let files = vec![FileAttachment {
        field: "file".to_string(),
        file_name: "out.txt".to_string(),
        bytes: b"ACGT".to_vec(),
    }];

    let record = client
        .create_record_with_files("data", &fields, &files)
        .await
        .unwrap();
    assert_eq!(record["id"], "d1");

    // The create went over as multipart with the blob embedded
    let requests = server.received_requests().await.unwrap();
    let create = requests
        .iter()
        .find(|r| r.url.path() == "/api/collections/data/records")
        .unwrap();
    let content_type = create.headers.get("content-type").unwrap().to_str().unwrap();
    assert!(content_type.starts_with("multipart/form-data"));
    let body = String::from_utf8_lossy(&create.body);
    assert!(body.contains("ACGT"));
    assert!(body.contains("out.txt"));
}

#[tokio::test]
async fn test_batch_runs_operations_in_one_round_trip() {
    let server = MockServer::start().await;
    mock_health(&server).await;

    Mock::given(method("POST"))
        .and(path("/api/batch"))
        .and(body_json(json!({
            "requests": [
                {"method": "POST", "url": "/api/collections/data/records", "body": {"name": "a"}},
                {"method": "DELETE", "url": "/api/collections/data/records/old"}
            ]
        })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!([{"id": "d1"}, {"status": 204}])),
        )
        .mount(&server)
        .await;

    let client = RecordsClient::new(&server.uri(), None);
    let results = client
        .batch(&[
            seqrun_records::BatchRequest {
                method: "POST".to_string(),
                url: "/api/collections/data/records".to_string(),
                body: Some(json!({"name": "a"})),
            },
            seqrun_records::BatchRequest {
                method: "DELETE".to_string(),
                url: "/api/collections/data/records/old".to_string(),
                body: None,
            },
        ])
        .await
        .unwrap();

    assert_eq!(results.len(), 2);
    assert_eq!(results[0]["id"], "d1");
}

#[tokio::test]
async fn test_download_file_uses_scoped_token() {
    let server = MockServer::start().await;
    mock_health(&server).await;

    Mock::given(method("POST"))
        .and(path("/api/files/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"token": "scoped"})))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/files/data/rec1/reads.fastq"))
        .and(query_param("token", "scoped"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"@read1\nACGT\n".to_vec()))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("inputs").join("reads.fastq");

    let client = RecordsClient::new(&server.uri(), None);
    client
        .download_file(
            "data",
            "rec1",
            "reads.fastq",
            &dest,
            &DownloadOptions {
                with_token: true,
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let contents = std::fs::read_to_string(&dest).unwrap();
    assert_eq!(contents, "@read1\nACGT\n");
}
