//! Access Token API Tests

use axum::http::{header::AUTHORIZATION, HeaderValue, StatusCode};
use serde_json::{json, Value};

use crate::common::{TestApp, TEST_APP_ID};

fn bearer(token: &str) -> HeaderValue {
    HeaderValue::from_str(&format!("Bearer {token}")).unwrap()
}

#[tokio::test]
async fn test_current_token_describes_grant() {
    let app = TestApp::new();
    app.add_user(42, vec![]);
    let token = app.issue_token(42, &["identify", "messages.read"]).await;
    let server = app.server();

    let response = server
        .get("/api/v0/tokens/@current")
        .add_header(AUTHORIZATION, bearer(&token))
        .await;

    response.assert_status_ok();
    assert_eq!(
        response.json::<Value>(),
        json!({
            "user_id": "42",
            "app_id": TEST_APP_ID.to_string(),
            "scope": ["identify", "messages.read"],
        })
    );
}

#[tokio::test]
async fn test_missing_authorization_is_rejected() {
    let app = TestApp::new();
    let server = app.server();

    let response = server.get("/api/v0/tokens/@current").await;

    response.assert_status(StatusCode::UNAUTHORIZED);
    assert_eq!(response.json::<Value>()["code"], 10003);
}

#[tokio::test]
async fn test_garbage_token_is_rejected() {
    let app = TestApp::new();
    let server = app.server();

    let response = server
        .get("/api/v0/tokens/@current")
        .add_header(AUTHORIZATION, bearer("not.a.token"))
        .await;

    response.assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_token_of_unknown_user_is_rejected() {
    let app = TestApp::new();
    app.add_user(42, vec![]);
    let token = app.issue_token(42, &[]).await;
    app.users.remove_user(42);
    let server = app.server();

    let response = server
        .get("/api/v0/tokens/@current")
        .add_header(AUTHORIZATION, bearer(&token))
        .await;

    response.assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_rotated_secret_invalidates_token() {
    let app = TestApp::new();
    app.add_user(7, vec![]);
    let token = app.issue_token(7, &[]).await;
    app.users.set_secret(7, b"rotated".to_vec());
    let server = app.server();

    let response = server
        .get("/api/v0/tokens/@current")
        .add_header(AUTHORIZATION, bearer(&token))
        .await;

    response.assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_revoke_current_token() {
    let app = TestApp::new();
    app.add_user(42, vec![]);
    let token = app.issue_token(42, &[]).await;
    let server = app.server();
    assert_eq!(app.records.len(), 1);

    let response = server
        .delete("/api/v0/tokens/@current")
        .add_header(AUTHORIZATION, bearer(&token))
        .await;
    response.assert_status(StatusCode::NO_CONTENT);
    assert!(app.records.is_empty());

    // The revoked token no longer authenticates
    let response = server
        .get("/api/v0/tokens/@current")
        .add_header(AUTHORIZATION, bearer(&token))
        .await;
    response.assert_status(StatusCode::UNAUTHORIZED);
}
