//! Account flow integration tests.
//!
//! Tests verify:
//! - Registration validation and duplicate handling
//! - Verification email delivery in the background
//! - One-time verification codes
//! - Login rules for verified and unverified accounts

use axum::http::{Method, StatusCode};
use serde_json::json;

use super::test_utils::{body_json, cookie_from, get_request, json_request, TestApp, FRONTEND_URL};

fn register_body(email: &str, password: &str, confirm: &str) -> serde_json::Value {
    json!({
        "username": "alice",
        "email": email,
        "password": password,
        "confirm_password": confirm,
    })
}

// =============================================================================
// Registration
// =============================================================================

#[tokio::test]
async fn test_register_success() {
    let app = TestApp::new();

    let response = app
        .send(json_request(
            Method::POST,
            "/register",
            register_body("a@example.com", "pw123456", "pw123456"),
        ))
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["msg"], "User created. Check your Gmail to verify.");
    assert_eq!(app.store.user_count().await, 1);
}

#[tokio::test]
async fn test_register_sends_verification_email() {
    let app = TestApp::new();

    app.send(json_request(
        Method::POST,
        "/register",
        register_body("a@example.com", "pw123456", "pw123456"),
    ))
    .await;

    let token = app.verify_token("a@example.com").await.unwrap();
    let sent = app.mailer.wait_for(1).await;

    assert_eq!(sent[0].to, "a@example.com");
    assert_eq!(sent[0].subject, "Verify Your NeuroDetect Account");
    assert!(sent[0].html.contains(&token));
    assert!(sent[0]
        .html
        .contains(&format!("{}/verify-email?email=a%40example.com", FRONTEND_URL)));
}

#[tokio::test]
async fn test_register_password_mismatch() {
    let app = TestApp::new();

    let response = app
        .send(json_request(
            Method::POST,
            "/register",
            register_body("a@example.com", "pw123456", "different"),
        ))
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["detail"], "Passwords do not match.");
    assert_eq!(body["status"], 400);
    assert_eq!(app.store.user_count().await, 0);
}

#[tokio::test]
async fn test_register_duplicate_unverified_then_verified() {
    let app = TestApp::new();
    let body = register_body("a@example.com", "pw123456", "pw123456");

    app.send(json_request(Method::POST, "/register", body.clone()))
        .await;

    let response = app
        .send(json_request(Method::POST, "/register", body.clone()))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        body_json(response).await["detail"],
        "Email already registered. Please check your inbox to verify your account."
    );

    let token = app.verify_token("a@example.com").await.unwrap();
    app.send(get_request(&format!(
        "/verify-email?email=a@example.com&token={}",
        token
    )))
    .await;

    let response = app.send(json_request(Method::POST, "/register", body)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        body_json(response).await["detail"],
        "Email is already verified. Please log in."
    );
    assert_eq!(app.store.user_count().await, 1);
}

#[tokio::test]
async fn test_sequential_user_ids() {
    let app = TestApp::new();

    for email in ["a@example.com", "b@example.com"] {
        app.send(json_request(
            Method::POST,
            "/register",
            register_body(email, "pw123456", "pw123456"),
        ))
        .await;
    }

    let cookie = {
        let token = app.verify_token("b@example.com").await.unwrap();
        app.send(get_request(&format!(
            "/verify-email?email=b@example.com&token={}",
            token
        )))
        .await;
        let response = app
            .send(json_request(
                Method::POST,
                "/login",
                json!({"email": "b@example.com", "password": "pw123456"}),
            ))
            .await;
        cookie_from(&response).unwrap()
    };

    let response = app
        .send(super::test_utils::get_with_cookie("/me", &cookie))
        .await;
    assert_eq!(body_json(response).await["user_id"], 2);
}

// =============================================================================
// Verification
// =============================================================================

#[tokio::test]
async fn test_verify_email_once() {
    let app = TestApp::new();
    app.send(json_request(
        Method::POST,
        "/register",
        register_body("a@example.com", "pw123456", "pw123456"),
    ))
    .await;

    let token = app.verify_token("a@example.com").await.unwrap();
    let uri = format!("/verify-email?email=a@example.com&token={}", token);

    let response = app.send(get_request(&uri)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_json(response).await["msg"],
        "Email verified. You can now log in."
    );
    assert!(app.verify_token("a@example.com").await.is_none());

    let response = app.send(get_request(&uri)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["detail"], "Invalid token or email.");
}

#[tokio::test]
async fn test_verify_email_wrong_token() {
    let app = TestApp::new();
    app.send(json_request(
        Method::POST,
        "/register",
        register_body("a@example.com", "pw123456", "pw123456"),
    ))
    .await;

    let token = app.verify_token("a@example.com").await.unwrap();
    let wrong = if token == "100000" { "100001" } else { "100000" };

    let response = app
        .send(get_request(&format!(
            "/verify-email?email=a@example.com&token={}",
            wrong
        )))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .send(get_request(&format!(
            "/verify-email?email=nobody@example.com&token={}",
            token
        )))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

// =============================================================================
// Login
// =============================================================================

#[tokio::test]
async fn test_login_unverified_is_forbidden() {
    let app = TestApp::new();
    app.send(json_request(
        Method::POST,
        "/register",
        register_body("a@example.com", "pw123456", "pw123456"),
    ))
    .await;

    let response = app
        .send(json_request(
            Method::POST,
            "/login",
            json!({"email": "a@example.com", "password": "pw123456"}),
        ))
        .await;

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert!(cookie_from(&response).is_none());
    assert_eq!(
        body_json(response).await["detail"],
        "Please verify your email first."
    );
}

#[tokio::test]
async fn test_login_wrong_password() {
    let app = TestApp::new();
    app.login_verified_user("a@example.com", "pw123456").await;

    let response = app
        .send(json_request(
            Method::POST,
            "/login",
            json!({"email": "a@example.com", "password": "nope"}),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["detail"], "Invalid credentials.");

    let response = app
        .send(json_request(
            Method::POST,
            "/login",
            json!({"email": "ghost@example.com", "password": "pw123456"}),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_login_success_sets_cookie() {
    let app = TestApp::new();
    let cookie = app.login_verified_user("a@example.com", "pw123456").await;

    assert!(cookie.starts_with("access_token_cookie="));
    assert!(cookie.len() > "access_token_cookie=".len());
}
