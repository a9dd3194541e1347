//! End-to-end tests for the highlights-pipeline binary
//!
//! The binary runs with `--dry-run` so nothing reaches AWS; the highlights
//! API is a mock server.

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::json;
use wiremock::{
    matchers::{method, path, query_param},
    Mock, MockServer, ResponseTemplate,
};

fn pipeline_cmd(api_base: &str) -> Command {
    let mut cmd = Command::cargo_bin("highlights-pipeline").unwrap();
    cmd.env_clear()
        .env("RAPIDAPI_KEY", "test-key")
        .env("S3_BUCKET_NAME", "highlights-test")
        .env("HIGHLIGHTS_API_URL", format!("{}/basketball/highlights", api_base))
        .env("LOG_FORMAT", "json")
        .arg("--dry-run")
        .arg("--ingest-only")
        .arg("--date")
        .arg("2024-05-01")
        .arg("--retry-delay")
        .arg("0");
    cmd
}

#[tokio::test]
async fn test_dry_run_ingestion_succeeds() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/basketball/highlights"))
        .and(query_param("date", "2024-05-01"))
        .and(query_param("leagueName", "NBA"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"id": "abc"}, {"url": "http://x/y"}]
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    pipeline_cmd(&mock_server.uri())
        .arg("--league")
        .arg("NBA")
        .assert()
        .success()
        .stdout(predicate::str::contains("Pipeline complete"));
}

#[tokio::test]
async fn test_empty_response_still_succeeds() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/basketball/highlights"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
        .expect(1)
        .mount(&mock_server)
        .await;

    pipeline_cmd(&mock_server.uri())
        .assert()
        .success()
        .stdout(predicate::str::contains("No highlights fetched"));
}

#[tokio::test]
async fn test_api_failure_exhausts_retries() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/basketball/highlights"))
        .respond_with(ResponseTemplate::new(503))
        .expect(2)
        .mount(&mock_server)
        .await;

    pipeline_cmd(&mock_server.uri())
        .arg("--retries")
        .arg("2")
        .assert()
        .failure()
        .stdout(predicate::str::contains("Pipeline failed"));
}

#[test]
fn test_missing_api_key_fails() {
    let mut cmd = Command::cargo_bin("highlights-pipeline").unwrap();
    cmd.env_clear()
        .env("S3_BUCKET_NAME", "highlights-test")
        .arg("--dry-run")
        .assert()
        .failure()
        .stderr(predicate::str::contains("RAPIDAPI_KEY"));
}

#[test]
fn test_invalid_date_rejected() {
    let mut cmd = Command::cargo_bin("highlights-pipeline").unwrap();
    cmd.env_clear()
        .env("RAPIDAPI_KEY", "test-key")
        .env("S3_BUCKET_NAME", "highlights-test")
        .arg("--dry-run")
        .arg("--date")
        .arg("05/01/2024")
        .assert()
        .failure()
        .stderr(predicate::str::contains("HIGHLIGHTS_DATE"));
}
