//! Integration tests for the /webhooks HTTP endpoints.

use lakegate_core::rules::{CommitMetadataRule, FormatRule};
use lakegate_core::{Engine, EngineConfig, MemoryStore, Rule, RuleSet};
use lakegate_webhook::{Config, WebhookHandler, handle_webhook_request};
use http_body_util::BodyExt;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

const PRE_MERGE: &str = r#"{
    "event_type": "pre-merge",
    "event_time": "2024-01-05T10:00:00Z",
    "action_name": "validate",
    "hook_id": "check",
    "repository_id": "lake",
    "branch_id": "main",
    "source_ref": "etl",
    "commit_message": "daily load",
    "committer": "airflow"
}"#;

/// `etl` adds one CSV and one Parquet object under `production/`.
async fn setup_handler() -> WebhookHandler {
    let store = Arc::new(MemoryStore::new());
    store.create_ref("lake", "main").await;
    store.copy_ref("lake", "main", "etl").await;
    store.put_object("lake", "etl", "production/data.csv", b"a,b\n".to_vec()).await;
    store.put_object("lake", "etl", "production/data.parquet", b"PAR1".to_vec()).await;

    let mut policies = BTreeMap::new();
    policies.insert(
        "production".to_string(),
        RuleSet::new(vec![
            Rule::Format(FormatRule::new(["parquet", "csv"], "production/")),
            Rule::CommitMetadata(CommitMetadataRule::new(["job_id"], "production/")),
        ])
        .unwrap(),
    );

    let engine = Engine::new(store, EngineConfig::default());
    WebhookHandler::with_config(
        engine,
        Config {
            policies,
            ..Config::default()
        },
    )
}

/// Extract response body bytes from a Full<Bytes> response.
async fn body_bytes(resp: hyper::Response<http_body_util::Full<bytes::Bytes>>) -> Vec<u8> {
    resp.into_body().collect().await.unwrap().to_bytes().to_vec()
}

async fn body_json(resp: hyper::Response<http_body_util::Full<bytes::Bytes>>) -> Value {
    serde_json::from_slice(&body_bytes(resp).await).unwrap()
}

#[tokio::test]
async fn test_format_rejection() {
    let handler = setup_handler().await;

    let resp = handle_webhook_request(
        "/webhooks/format",
        "POST",
        PRE_MERGE.as_bytes(),
        "allow=parquet&allow=orc&prefix=production/",
        &handler,
    )
    .await;

    assert_eq!(resp.status(), 400);
    let body = body_json(resp).await;
    assert_eq!(body["accepted"], false);
    assert_eq!(body["errors"][0]["path"], "production/data.csv");
    assert!(body["message"].as_str().unwrap().contains("data.csv"));
    assert_eq!(body["errors"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_format_accepted() {
    let handler = setup_handler().await;

    let resp = handle_webhook_request(
        "/webhooks/format",
        "POST",
        PRE_MERGE.as_bytes(),
        "allow=parquet,csv&prefix=production/",
        &handler,
    )
    .await;

    assert_eq!(resp.status(), 200);
    let body = body_json(resp).await;
    assert_eq!(body["accepted"], true);
    assert!(body["errors"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_missing_option_is_unprocessable() {
    let handler = setup_handler().await;

    let resp = handle_webhook_request("/webhooks/format", "POST", PRE_MERGE.as_bytes(), "prefix=x/", &handler)
        .await;
    assert_eq!(resp.status(), 422);
    let body = body_json(resp).await;
    assert!(body["error"].as_str().unwrap().contains("configuration error"));

    let resp = handle_webhook_request(
        "/webhooks/dirty_check",
        "POST",
        PRE_MERGE.as_bytes(),
        "prefix=a/&prefix=b/",
        &handler,
    )
    .await;
    assert_eq!(resp.status(), 422);
}

#[tokio::test]
async fn test_unsupported_event_is_unprocessable() {
    let handler = setup_handler().await;
    let body = PRE_MERGE.replace("pre-merge", "post-create-branch");

    let resp = handle_webhook_request("/webhooks/dirty_check", "POST", body.as_bytes(), "", &handler).await;
    assert_eq!(resp.status(), 422);
}

#[tokio::test]
async fn test_invalid_payload() {
    let handler = setup_handler().await;

    let resp = handle_webhook_request("/webhooks/format", "POST", b"{not json", "allow=parquet", &handler).await;
    assert_eq!(resp.status(), 400);
    let body = body_json(resp).await;
    assert!(body["error"].as_str().unwrap().starts_with("invalid hook payload"));
}

#[tokio::test]
async fn test_policy_endpoint() {
    let handler = setup_handler().await;

    let resp = handle_webhook_request("/webhooks/policy/production", "POST", PRE_MERGE.as_bytes(), "", &handler)
        .await;
    assert_eq!(resp.status(), 400);
    let body = body_json(resp).await;
    // format passes, metadata is missing
    assert_eq!(body["errors"].as_array().unwrap().len(), 1);
    assert_eq!(body["errors"][0]["rule"], "commit_metadata");

    let with_metadata = PRE_MERGE.replace(
        r#""committer": "airflow""#,
        r#""committer": "airflow", "commit_metadata": {"job_id": "42"}"#,
    );
    let resp = handle_webhook_request(
        "/webhooks/policy/production",
        "POST",
        with_metadata.as_bytes(),
        "",
        &handler,
    )
    .await;
    assert_eq!(resp.status(), 200);

    let resp = handle_webhook_request(
        "/webhooks/policy/production",
        "POST",
        PRE_MERGE.as_bytes(),
        "prefix=x/",
        &handler,
    )
    .await;
    assert_eq!(resp.status(), 422);

    let resp = handle_webhook_request("/webhooks/policy/unknown", "POST", PRE_MERGE.as_bytes(), "", &handler)
        .await;
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn test_routing() {
    let handler = setup_handler().await;

    let resp = handle_webhook_request("/healthz", "GET", &[], "", &handler).await;
    assert_eq!(resp.status(), 200);
    assert_eq!(body_bytes(resp).await, b"ok");

    let resp = handle_webhook_request("/", "GET", &[], "", &handler).await;
    assert_eq!(resp.status(), 200);
    let usage = String::from_utf8(body_bytes(resp).await).unwrap();
    assert!(usage.contains("/webhooks/dirty_check"));

    let resp = handle_webhook_request("/webhooks/nope", "POST", PRE_MERGE.as_bytes(), "", &handler).await;
    assert_eq!(resp.status(), 404);

    let resp = handle_webhook_request("/webhooks/format", "GET", &[], "", &handler).await;
    assert_eq!(resp.status(), 405);
}
