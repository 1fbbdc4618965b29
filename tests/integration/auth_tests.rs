//! Session integration tests.
//!
//! Tests verify:
//! - The session cookie attributes
//! - `/me` with valid, missing, forged, and expired sessions
//! - Logout clears the cookie
//! - Account routes are also served under `/auth`

use std::time::Duration;

use axum::http::{Method, StatusCode};
use chrono::Utc;
use serde_json::json;

use neurodetect::SessionSigner;

use super::test_utils::{
    body_json, cookie_from, get_request, get_with_cookie, json_request, set_cookie_header,
    TestApp, TEST_SECRET,
};

// =============================================================================
// Session Cookie
// =============================================================================

#[tokio::test]
async fn test_session_cookie_attributes() {
    let app = TestApp::new();
    app.login_verified_user("a@example.com", "pw123456").await;

    let response = app
        .send(json_request(
            Method::POST,
            "/login",
            json!({"email": "a@example.com", "password": "pw123456"}),
        ))
        .await;

    let header = set_cookie_header(&response);
    assert!(header.contains("HttpOnly"));
    assert!(header.contains("Path=/"));
    assert!(header.contains("SameSite=Lax"));
    assert!(header.contains("Max-Age=3600"));
    assert!(!header.contains("Secure"));
}

// =============================================================================
// Current User
// =============================================================================

#[tokio::test]
async fn test_me_with_valid_session() {
    let app = TestApp::new();
    let cookie = app.login_verified_user("a@example.com", "pw123456").await;

    let response = app.send(get_with_cookie("/me", &cookie)).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["user_id"], 1);
    assert_eq!(body["username"], "tester");
    assert_eq!(body["email"], "a@example.com");
    assert_eq!(body["is_verified"], true);
    assert!(body.get("hashed_password").is_none());
}

#[tokio::test]
async fn test_me_without_session() {
    let app = TestApp::new();

    let response = app.send(get_request("/me")).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["error"], "missing_session");
}

#[tokio::test]
async fn test_me_with_forged_session() {
    let app = TestApp::new();
    app.login_verified_user("a@example.com", "pw123456").await;

    let forger = SessionSigner::new("not-the-server-secret-0123456789ab", Duration::from_secs(60));
    let cookie = format!("access_token_cookie={}", forger.issue("a@example.com"));

    let response = app.send(get_with_cookie("/me", &cookie)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_me_with_expired_session() {
    let app = TestApp::new();
    app.login_verified_user("a@example.com", "pw123456").await;

    let signer = SessionSigner::new(TEST_SECRET, Duration::from_secs(60));
    let token = signer.issue_with_expiry("a@example.com", Utc::now().timestamp() - 10);
    let cookie = format!("access_token_cookie={}", token);

    let response = app.send(get_with_cookie("/me", &cookie)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["error"], "session_expired");
}

#[tokio::test]
async fn test_me_for_deleted_subject() {
    let app = TestApp::new();

    // Valid signature, but no such account
    let signer = SessionSigner::new(TEST_SECRET, Duration::from_secs(60));
    let cookie = format!("access_token_cookie={}", signer.issue("ghost@example.com"));

    let response = app.send(get_with_cookie("/me", &cookie)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["detail"], "User not found");
}

// =============================================================================
// Logout
// =============================================================================

#[tokio::test]
async fn test_logout_clears_cookie() {
    let app = TestApp::new();

    // Works with or without a session
    let response = app
        .send(json_request(Method::POST, "/logout", json!({})))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let header = set_cookie_header(&response);
    assert!(header.starts_with("access_token_cookie=;"));
    assert!(header.contains("Max-Age=0"));
    assert_eq!(body_json(response).await["msg"], "Logged out");
}

// =============================================================================
// /auth Prefix
// =============================================================================

#[tokio::test]
async fn test_auth_prefixed_routes() {
    let app = TestApp::new();

    let response = app
        .send(json_request(
            Method::POST,
            "/auth/register",
            json!({
                "username": "bob",
                "email": "b@example.com",
                "password": "pw123456",
                "confirm_password": "pw123456",
            }),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let token = app.verify_token("b@example.com").await.unwrap();
    let response = app
        .send(get_request(&format!(
            "/auth/verify-email?email=b@example.com&token={}",
            token
        )))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .send(json_request(
            Method::POST,
            "/auth/login",
            json!({"email": "b@example.com", "password": "pw123456"}),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let cookie = cookie_from(&response).unwrap();

    let response = app.send(get_with_cookie("/auth/me", &cookie)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["username"], "bob");
}
