//! End-to-end tests for the status endpoints

mod common;

use common::{EngineBehavior, TestClient, TestServer, TestServerOptions};
use reqwest::StatusCode;

#[tokio::test]
async fn test_home_reports_uptime_and_session() {
    let server = TestServer::spawn().await;
    let client = TestClient::new(server.base_url.clone());

    let stats: serde_json::Value = client.home().await.json().await.unwrap();
    assert!(stats["uptime"].as_str().unwrap().starts_with("0d "));
    assert!(stats["session_token"].is_null());

    let client = TestClient::authenticated(server.base_url.clone()).await;
    let stats: serde_json::Value = client.home().await.json().await.unwrap();
    assert_eq!(stats["session_token"].as_str().unwrap().len(), 64);
}

#[tokio::test]
async fn test_health_with_available_engine() {
    let server = TestServer::spawn().await;
    let client = TestClient::new(server.base_url.clone());

    let response = client.health().await;
    assert_eq!(response.status(), StatusCode::OK);

    let health: serde_json::Value = response.json().await.unwrap();
    assert_eq!(health["status"], "ok");
    assert_eq!(health["service"], "audio-humanizer");
    assert_eq!(health["engine"], "available");
    assert!(health["version"].as_str().is_some());
}

#[tokio::test]
async fn test_health_follows_engine_state() {
    let server = TestServer::spawn_with(TestServerOptions {
        engine_behavior: EngineBehavior::Offline,
        ..Default::default()
    })
    .await;
    let client = TestClient::new(server.base_url.clone());

    let health: serde_json::Value = client.health().await.json().await.unwrap();
    assert_eq!(health["engine"], "unavailable");

    // No caching in tests: the next probe sees the change.
    server.engine.set_behavior(EngineBehavior::Enhance);
    let health: serde_json::Value = client.health().await.json().await.unwrap();
    assert_eq!(health["engine"], "available");
}
