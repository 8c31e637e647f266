//! HTTP server contract, served on an ephemeral port.

mod common;

use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::{json, Value};

use common::{notice_agreement, offline_pipeline, test_config};
use lexrag::server::router;

async fn spawn_server() -> String {
    let pipeline = Arc::new(offline_pipeline(test_config()));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router(pipeline)).await.unwrap();
    });
    format!("http://{}", addr)
}

async fn ingest_agreement(client: &reqwest::Client, base: &str) -> Value {
    let resp = client
        .post(format!("{}/ingest", base))
        .json(&json!({
            "documents": [{
                "filename": "agreement.pdf",
                "content_base64": STANDARD.encode(notice_agreement()),
            }]
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    resp.json().await.unwrap()
}

#[tokio::test]
async fn health_reports_version() {
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
async fn ingest_then_answer() {
    let base = spawn_server().await;
    let client = reqwest::Client::new();

    let report = ingest_agreement(&client, &base).await;
    assert_eq!(report["documents_processed"], 1);

    let resp = client
        .post(format!("{}/answer", base))
        .json(&json!({ "query": "What is the notice period?", "k": 2 }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let answer: Value = resp.json().await.unwrap();
    assert_eq!(answer["status"], "grounded");
    assert!(answer["answer_text"].as_str().unwrap().contains("30 days"));
    assert!(answer["retrieval_scores"].as_array().unwrap().len() <= 2);

    let docs: Value = client
        .get(format!("{}/documents", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let listed = docs["documents"].as_array().unwrap();
    assert_eq!(listed.len(), 1);
    let id = listed[0]["document_id"].as_str().unwrap().to_string();

    let deleted: Value = client
        .delete(format!("{}/documents/{}", base, id))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(deleted["deleted"], report["chunks_indexed"]);
}

#[tokio::test]
async fn empty_query_is_bad_request() {
    let base = spawn_server().await;
    let resp = reqwest::Client::new()
        .post(format!("{}/answer", base))
        .json(&json!({ "query": "   " }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "bad_request");
}

#[tokio::test]
async fn invalid_base64_is_bad_request() {
    let base = spawn_server().await;
    let resp = reqwest::Client::new()
        .post(format!("{}/ingest", base))
        .json(&json!({
            "documents": [{ "filename": "a.pdf", "content_base64": "@@not base64@@" }]
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn corrupted_upload_is_reported_in_body() {
    let base = spawn_server().await;
    let resp = reqwest::Client::new()
        .post(format!("{}/ingest", base))
        .json(&json!({
            "documents": [{
                "filename": "broken.pdf",
                "content_base64": STANDARD.encode(b"%PDF-1.7 truncated"),
            }]
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let report: Value = resp.json().await.unwrap();
    assert_eq!(report["chunks_indexed"], 0);
    assert!(report["documents"][0]["error"].is_string());
}
