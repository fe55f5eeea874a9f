//! Integration tests for the HTTP API.
//!
//! Requests go through the real router with `tower::ServiceExt::oneshot`;
//! the notebook behind it is the scripted fake server.

mod support;

use std::path::PathBuf;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use notebook_proxy::api::{router, AppState, NO_NOTEBOOK_MESSAGE};
use notebook_proxy::mcp::NotebookClient;
use serde_json::{json, Value};
use tower::ServiceExt;

use support::{
    echo_server, initialize_result, query_text, test_config, tool_name, tool_text, FakeNotebook,
    Reply, NLT_LISTING,
};

const RATIOS: &str = r#"{
    "company": "Acme Lift Co.",
    "asOf": "December 31, 2024",
    "solvencyRatios": [
        {"name": "Current Ratio", "value": 1.8, "status": "good"},
        {"name": "Quick Ratio", "value": 0.7, "status": "warning"}
    ],
    "safetyRatios": [{"name": "Debt to Equity", "value": 3.1, "status": "danger"}],
    "profitabilityRatios": [{"name": "ROA", "value": 0.12, "status": "excellent"}],
    "assetManagementRatios": []
}"#;

fn app(fake: &Arc<FakeNotebook>, data_dir: Option<PathBuf>) -> Router {
    let client = Arc::new(NotebookClient::with_launcher(
        test_config(5),
        Arc::clone(fake) as _,
    ));
    router(AppState::new(client, data_dir))
}

fn post_json(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("build request")
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .body(Body::empty())
        .expect("build request")
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.expect("response");
    let status = response.status();
    let body = response
        .into_body()
        .collect()
        .await
        .expect("read body")
        .to_bytes();
    let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, json)
}

fn data_dir_with_ratios() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("dynamic_ratios.json"), RATIOS).unwrap();
    dir
}

// =============================================================================
// Chat
// =============================================================================

#[tokio::test]
async fn test_chat_answers_from_notebook() {
    let fake = echo_server(NLT_LISTING);
    let (status, body) = send(
        app(&fake, None),
        post_json("/api/chat", r#"{"message":"What is the quick ratio?"}"#),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({
            "success": true,
            "role": "system",
            "content": "answer to What is the quick ratio?"
        })
    );
}

#[tokio::test]
async fn test_ask_route_is_an_alias() {
    let fake = echo_server(NLT_LISTING);
    let (status, body) = send(app(&fake, None), post_json("/ask", r#"{"message":"hi"}"#)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["content"], "answer to hi");
}

#[tokio::test]
async fn test_chat_without_notebook() {
    let fake = echo_server("No notebooks found.");
    let (status, body) = send(app(&fake, None), post_json("/api/chat", r#"{"message":"hi"}"#)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], false);
    assert_eq!(body["role"], "system");
    assert_eq!(body["content"], NO_NOTEBOOK_MESSAGE);
}

#[tokio::test]
async fn test_chat_malformed_body() {
    let fake = echo_server(NLT_LISTING);

    let (status, body) = send(app(&fake, None), post_json("/api/chat", "{not json")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert!(body["error"].is_string());

    let (status, _) = send(app(&fake, None), post_json("/api/chat", r#"{"text":"hi"}"#)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(app(&fake, None), post_json("/api/chat", r#"{"message":"  "}"#)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Nothing reached the notebook.
    assert_eq!(fake.launches(), 0);
}

#[tokio::test]
async fn test_chat_tool_failure_is_500() {
    let fake = FakeNotebook::new(|method, params| match (method, tool_name(params)) {
        ("initialize", _) => Reply::Result(initialize_result()),
        ("tools/call", "notebook_list") => Reply::Result(tool_text(NLT_LISTING)),
        _ => Reply::Error(-32000, "upstream unavailable".to_string()),
    });
    let (status, body) = send(app(&fake, None), post_json("/api/chat", r#"{"message":"hi"}"#)).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["success"], false);
    assert!(body["error"]
        .as_str()
        .is_some_and(|e| e.contains("upstream unavailable")));
}

// =============================================================================
// Status and Notebook Control
// =============================================================================

#[tokio::test]
async fn test_status_before_and_after_start() {
    let fake = echo_server(NLT_LISTING);
    let app = app(&fake, None);

    let (status, body) = send(app.clone(), get("/api/status")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["state"], "not_started");
    assert_eq!(body["notebookId"], Value::Null);

    send(app.clone(), post_json("/api/chat", r#"{"message":"hi"}"#)).await;

    let (_, body) = send(app, get("/api/status")).await;
    assert_eq!(body["state"], "ready");
    assert_eq!(body["notebookId"], "abc");
    assert_eq!(body["pid"], 1001);
}

#[tokio::test]
async fn test_rediscover_and_restart() {
    let fake = echo_server(NLT_LISTING);
    let app = app(&fake, None);

    let (status, body) = send(app.clone(), post_json("/api/notebook/rediscover", "")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"success": true, "notebookId": "abc"}));

    let (status, body) = send(app, post_json("/api/notebook/restart", "")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["status"]["state"], "ready");
    assert_eq!(fake.launches(), 2);
}

#[tokio::test]
async fn test_health() {
    let fake = echo_server(NLT_LISTING);
    let response = app(&fake, None).oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&body[..], b"ok");
}

// =============================================================================
// Financial Ratios
// =============================================================================

#[tokio::test]
async fn test_financial_ratios_from_file() {
    let fake = echo_server(NLT_LISTING);
    let dir = data_dir_with_ratios();

    let (status, body) = send(
        app(&fake, Some(dir.path().to_path_buf())),
        get("/api/financial-ratios"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["company"], "Acme Lift Co.");
    assert_eq!(body["data"]["solvencyRatios"][1]["value"], 0.7);
}

#[tokio::test]
async fn test_financial_ratios_missing() {
    let fake = echo_server(NLT_LISTING);
    let dir = tempfile::tempdir().unwrap();

    let (status, body) = send(
        app(&fake, Some(dir.path().to_path_buf())),
        get("/api/financial-ratios"),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);

    let (status, _) = send(app(&fake, None), get("/api/financial-ratios")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_financial_ratios_unreadable() {
    let fake = echo_server(NLT_LISTING);
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("dynamic_ratios.json"), "{ broken").unwrap();

    let (status, body) = send(
        app(&fake, Some(dir.path().to_path_buf())),
        get("/api/financial-ratios"),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["success"], false);
}

// =============================================================================
// Executive Summary
// =============================================================================

#[tokio::test]
async fn test_summary_generated_by_notebook() {
    let fake = echo_server(NLT_LISTING);
    let dir = data_dir_with_ratios();

    let (status, body) = send(
        app(&fake, Some(dir.path().to_path_buf())),
        post_json("/api/executive-summary/generate", r#"{"language":"es"}"#),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["generated"], true);
    assert_eq!(body["source"], "notebooklm");
    assert_eq!(body["language"], "es");
    assert!(body["generatedAt"].is_string());

    let queries = fake.tool_calls("notebook_query");
    assert_eq!(queries.len(), 1);
    let prompt = queries[0]["query"].as_str().unwrap();
    assert!(prompt.starts_with("[IDIOMA: ESPAÑOL]"));
    assert!(prompt.contains("Financial Ratios for Acme Lift Co. as of December 31, 2024:"));
}

#[tokio::test]
async fn test_summary_defaults_to_english() {
    let fake = FakeNotebook::new(|method, params| match (method, tool_name(params)) {
        ("initialize", _) => Reply::Result(initialize_result()),
        ("tools/call", "notebook_list") => Reply::Result(tool_text(NLT_LISTING)),
        _ if query_text(params).starts_with("[LANGUAGE: ENGLISH]") => {
            Reply::Result(tool_text(r###"{"text":"## Executive Summary"}"###))
        }
        _ => Reply::Result(tool_text("wrong language")),
    });

    let (status, body) = send(
        app(&fake, None),
        post_json("/api/executive-summary/generate", ""),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["language"], "en");
    assert_eq!(body["content"], "## Executive Summary");
}

#[tokio::test]
async fn test_summary_fallback_without_notebook() {
    let fake = echo_server("nothing to see here");
    let dir = data_dir_with_ratios();

    let (status, body) = send(
        app(&fake, Some(dir.path().to_path_buf())),
        post_json("/api/executive-summary/generate", r#"{"language":"en"}"#),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["generated"], false);
    assert_eq!(body["source"], "fallback");
    assert!(body.get("generatedAt").is_none());

    let content = body["content"].as_str().unwrap();
    assert!(content.contains("**2** ratios in good standing"));
    assert!(content.contains("**1** ratios with warnings"));
    assert!(content.contains("**1** critical ratios"));
    assert!(content.contains("**4** total ratios evaluated"));
    assert!(fake.tool_calls("notebook_query").is_empty());
}

#[tokio::test]
async fn test_summary_malformed_body() {
    let fake = echo_server(NLT_LISTING);
    let (status, body) = send(
        app(&fake, None),
        post_json("/api/executive-summary/generate", "[1, 2"),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
}
