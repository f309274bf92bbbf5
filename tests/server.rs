//! HTTP API tests.
//!
//! The router is served on an ephemeral port with disabled collaborators,
//! so every query degrades to the "insufficient information" answer. That
//! is enough to check the wire contract.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};

use knowledge_router::config::Config;
use knowledge_router::orchestrator::Orchestrator;
use knowledge_router::server::{router, AppState};
use knowledge_router::tasks::InMemoryTaskStore;
use knowledge_router::traits::Collaborators;

// ─── Helpers ────────────────────────────────────────────────────────

async fn spawn_server() -> String {
    let orchestrator = Orchestrator::new(&Config::minimal(), Collaborators::disabled());
    let state = AppState::new(Arc::new(orchestrator), Arc::new(InMemoryTaskStore::new()));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router(state)).await.unwrap();
    });
    format!("http://{}", addr)
}

// ─── Tests ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_health() {
    let base = spawn_server().await;
    let body: Value = reqwest::get(format!("{}/health", base))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_ask_returns_envelope() {
    let base = spawn_server().await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{}/ask", base))
        .json(&json!({"query": "explain the login issue", "history": []}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(body["query"], "explain the login issue");
    assert_eq!(body["routing_decision"], "ai_studio_default");
    assert_eq!(body["retrieval_errors"][0]["source"], "aistudio_default");
    assert!(body["result"]["answer"]
        .as_str()
        .unwrap()
        .starts_with("I'm sorry"));
}

#[tokio::test]
async fn test_ask_rejects_empty_query() {
    let base = spawn_server().await;
    let resp = reqwest::Client::new()
        .post(format!("{}/ask", base))
        .json(&json!({"query": "   "}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "bad_request");
    assert_eq!(body["error"]["message"], "query must not be empty");
}

#[tokio::test]
async fn test_task_lifecycle() {
    let base = spawn_server().await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{}/tasks", base))
        .json(&json!({"query": "how do I reset my vpn token"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 202);
    let created: Value = resp.json().await.unwrap();
    let task_id = created["task_id"].as_str().unwrap().to_string();

    let mut record = Value::Null;
    for _ in 0..50 {
        record = client
            .get(format!("{}/tasks/{}", base, task_id))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        if record["status"] == "completed" {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(record["status"], "completed");
    assert_eq!(record["query"], "how do I reset my vpn token");
    assert_eq!(record["envelope"]["query"], "how do I reset my vpn token");

    let list: Value = client
        .get(format!("{}/tasks", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(list["tasks"].as_array().unwrap().len(), 1);
    assert_eq!(list["tasks"][0]["id"], task_id.as_str());
}

#[tokio::test]
async fn test_unknown_task_is_not_found() {
    let base = spawn_server().await;
    let resp = reqwest::get(format!("{}/tasks/does-not-exist", base)).await.unwrap();
    assert_eq!(resp.status(), 404);

    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "not_found");
}
