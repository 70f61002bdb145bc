//! Health Check API Tests

use axum::http::StatusCode;
use serde_json::Value;

use crate::common::TestApp;

#[tokio::test]
async fn test_health_check_returns_ok() {
    let app = TestApp::new();
    let server = app.server();

    let response = server.get("/health").await;

    response.assert_status_ok();
    let json: Value = response.json();
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_liveness_probe() {
    let app = TestApp::new();
    let server = app.server();

    let response = server.get("/health/live").await;

    response.assert_status_ok();
    assert_eq!(response.json::<Value>()["status"], "alive");
}

#[tokio::test]
async fn test_readiness_omits_unconfigured_stores() {
    let app = TestApp::new();
    let server = app.server();

    let response = server.get("/health/ready").await;

    response.assert_status_ok();
    let json: Value = response.json();
    assert_eq!(json["status"], "healthy");
    assert!(json["checks"].get("database").is_none());
    assert!(json["checks"].get("redis").is_none());
    assert_eq!(json["checks"]["gateway"]["connections"], 0);
    assert_eq!(json["checks"]["gateway"]["identified"], 0);
}

#[tokio::test]
async fn test_readiness_fails_while_gateway_closes() {
    let app = TestApp::new();
    let server = app.server();

    app.state
        .bus()
        .close(chat_gateway::presentation::websocket::CloseCode::Normal)
        .await;

    let response = server.get("/health/ready").await;

    response.assert_status(StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(response.json::<Value>()["status"], "unhealthy");
}

#[tokio::test]
async fn test_metrics_endpoint_serves_prometheus_text() {
    let app = TestApp::new();
    let server = app.server();

    let response = server.get("/metrics").await;

    response.assert_status_ok();
    assert!(response
        .header("content-type")
        .to_str()
        .unwrap()
        .starts_with("text/plain"));
}
