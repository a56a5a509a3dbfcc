//! POST /config and POST /config/{key} integration tests

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use axum_test::TestServer;
use cfgsrv_web::{ServerConfig, create_router};
use http::StatusCode;
use serde_json::{Value, json};
use tempfile::TempDir;

fn create_test_server(files: &[(&str, &str)]) -> (TempDir, TestServer) {
    let dir = tempfile::tempdir().expect("Failed to create value directory");
    for (name, contents) in files {
        std::fs::write(dir.path().join(name), contents).expect("Failed to write value");
    }

    let config = ServerConfig {
        config_dir: dir.path().to_path_buf(),
        ..ServerConfig::default()
    };
    let server = TestServer::new(create_router(&config)).expect("Failed to create test server");
    (dir, server)
}

#[tokio::test]
async fn test_query_selects_matching_field() {
    let (_dir, server) = create_test_server(&[("test", r#"{"foo": "bar"}"#)]);

    let response = server.post("/config").json(&json!({"query": "foo"})).await;

    assert_eq!(response.status_code(), StatusCode::OK);
    let body: Value = response.json();
    assert_eq!(body, json!({"test": "bar"}));
}

#[tokio::test]
async fn test_query_defaults_to_everything() {
    let (_dir, server) = create_test_server(&[
        ("a", r#"{"x": 1}"#),
        ("b", r#"{"y": {"z": true}}"#),
    ]);

    let response = server.post("/config").json(&json!({})).await;

    assert_eq!(response.status_code(), StatusCode::OK);
    let body: Value = response.json();
    assert_eq!(body, json!({"a": [1], "b": [{"z": true}]}));
}

#[tokio::test]
async fn test_query_skips_unparsable_files() {
    let (_dir, server) = create_test_server(&[
        ("good", r#"{"foo": 1}"#),
        ("bad", "something: not json"),
    ]);

    let response = server.post("/config").json(&json!({"query": "foo"})).await;

    assert_eq!(response.status_code(), StatusCode::OK);
    let body: Value = response.json();
    assert_eq!(body, json!({"good": 1}));
}

#[tokio::test]
async fn test_query_without_matches_is_empty_object() {
    let (_dir, server) = create_test_server(&[("test", r#"{"foo": "bar"}"#)]);

    let response = server.post("/config").json(&json!({"query": "missing"})).await;

    assert_eq!(response.status_code(), StatusCode::OK);
    let body: Value = response.json();
    assert_eq!(body, json!({}));
}

#[tokio::test]
async fn test_query_rejects_bad_expression() {
    let (_dir, server) = create_test_server(&[("test", "{}")]);

    let response = server.post("/config").json(&json!({"query": "foo[?"})).await;

    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_query_rejects_malformed_body() {
    let (_dir, server) = create_test_server(&[]);

    let response = server
        .post("/config")
        .content_type("application/json")
        .text("{not json")
        .await;

    assert!(response.status_code().is_client_error());
}

#[tokio::test]
async fn test_query_single_key() {
    let (_dir, server) = create_test_server(&[
        ("db", r#"{"host": "db.local", "port": 5432}"#),
        ("cache", r#"{"host": "cache.local"}"#),
    ]);

    let response = server.post("/config/db").json(&json!({"query": "port"})).await;

    assert_eq!(response.status_code(), StatusCode::OK);
    let body: Value = response.json();
    assert_eq!(body, json!({"db": 5432}));
}

#[tokio::test]
async fn test_query_single_key_errors() {
    let (_dir, server) = create_test_server(&[("broken", "nope")]);

    let response = server.post("/config/missing").json(&json!({"query": "*"})).await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);

    let response = server.post("/config/broken").json(&json!({"query": "*"})).await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
}
