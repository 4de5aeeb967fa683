mod helpers;

use std::sync::Arc;

use helpers::{build_assistant, temp_databases, KeywordEmbedder, ScriptedGenerator};
use pos_assistant::db::Databases;
use pos_assistant::server::router;
use serde_json::{json, Value};
use tempfile::TempDir;

async fn spawn_server(dbs: Databases, generator: Arc<ScriptedGenerator>) -> String {
    let assistant = Arc::new(build_assistant(dbs, KeywordEmbedder::new(), generator));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router(assistant, 5)).await.unwrap();
    });
    format!("http://{addr}")
}

async fn started() -> (TempDir, Databases, String) {
    let (tmp, dbs) = temp_databases();
    let base = spawn_server(dbs.clone(), ScriptedGenerator::always("Hello from the assistant.")).await;
    (tmp, dbs, base)
}

#[tokio::test]
async fn health_reports_service() {
    let (_tmp, _dbs, base) = started().await;

    let body: Value = reqwest::get(format!("{base}/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(body, json!({ "status": "healthy", "service": "pos-assistant" }));
}

#[tokio::test]
async fn chat_returns_answer() {
    let (_tmp, _dbs, base) = started().await;

    let resp = reqwest::Client::new()
        .post(format!("{base}/assistant/chat"))
        .json(&json!({ "sellerId": 9, "message": "hello", "customerId": 1 }))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body, json!({ "answer": "Hello from the assistant." }));
}

#[tokio::test]
async fn chat_with_broken_store_is_500() {
    let (tmp, dbs) = temp_databases();
    let blocker = tmp.path().join("blocker");
    std::fs::write(&blocker, b"x").unwrap();
    let broken = Databases::new(blocker.join("assistant.db"), dbs.store.clone());
    let base = spawn_server(broken, ScriptedGenerator::always("unused")).await;

    let resp = reqwest::Client::new()
        .post(format!("{base}/assistant/chat"))
        .json(&json!({ "sellerId": 9, "message": "hello" }))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 500);
    let body: Value = resp.json().await.unwrap();
    assert!(body["detail"].as_str().unwrap().contains("store unavailable"));
}

#[tokio::test]
async fn malformed_chat_body_is_rejected() {
    let (_tmp, _dbs, base) = started().await;

    let resp = reqwest::Client::new()
        .post(format!("{base}/assistant/chat"))
        .json(&json!({ "message": "no seller" }))
        .send()
        .await
        .unwrap();

    assert!(resp.status().is_client_error());
}

#[tokio::test]
async fn sync_then_recommend() {
    let (_tmp, _dbs, base) = started().await;
    let client = reqwest::Client::new();

    let sync: Value = client
        .post(format!("{base}/assistant/sync"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(sync["status"], "ok");
    assert_eq!(sync["customers"], 3);
    assert_eq!(sync["products"], 6);
    assert_eq!(sync["embedded"], 6);
    assert_eq!(sync["detail"], "3 customers and 6 products synchronized.");

    let forced: Value = client
        .post(format!("{base}/assistant/sync"))
        .json(&json!({ "force": true }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(forced["embedded"], 6);

    let recs: Value = client
        .post(format!("{base}/assistant/recommend"))
        .json(&json!({ "customerId": 1, "limit": 2 }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(recs["customerId"], 1);
    let list = recs["recommendations"].as_array().unwrap();
    assert_eq!(list.len(), 2);
    for rec in list {
        assert_eq!(rec["reason"], "embedding similarity");
        assert_ne!(rec["productId"], 1);
        assert_ne!(rec["productId"], 2);
    }
}

#[tokio::test]
async fn recommend_without_body_uses_best_sellers() {
    let (_tmp, _dbs, base) = started().await;

    let recs: Value = reqwest::Client::new()
        .post(format!("{base}/assistant/recommend"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(recs["customerId"], Value::Null);
    let ids: Vec<i64> = recs["recommendations"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["productId"].as_i64().unwrap())
        .collect();
    assert_eq!(ids, vec![6, 1, 5, 2, 4]);
}
