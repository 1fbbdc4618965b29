//! Prediction integration tests.
//!
//! Tests verify:
//! - Confident predictions are uploaded, stored, and returned
//! - Low-confidence predictions store and upload nothing
//! - Upload validation (missing field, undecodable bytes)
//! - Guest predictions and history

use axum::http::StatusCode;
use chrono::DateTime;

use super::test_utils::{
    body_json, get_request, get_with_cookie, multipart_request, png_image, TestApp,
};

// =============================================================================
// Authenticated Predictions
// =============================================================================

#[tokio::test]
async fn test_predict_confident_result_is_saved() {
    let app = TestApp::new();
    let cookie = app.login_verified_user("a@example.com", "pw123456").await;

    let response = app
        .send(multipart_request(
            "/predict",
            "file",
            &png_image(),
            Some(&cookie),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["disease"], "Glioma");
    assert_eq!(body["confidence"], 87.0);
    assert!(body["image_url"]
        .as_str()
        .unwrap()
        .starts_with("https://assets.example.com/scans/"));
    assert!(DateTime::parse_from_rfc3339(body["timestamp"].as_str().unwrap()).is_ok());

    let display_time = body["displayTime"].as_str().unwrap();
    assert_eq!(display_time.len(), "02:07 PM".len());
    assert!(display_time.ends_with("AM") || display_time.ends_with("PM"));

    assert_eq!(app.assets.uploads(), 1);
    assert_eq!(app.store.prediction_count().await, 1);
}

#[tokio::test]
async fn test_predict_low_confidence_stores_nothing() {
    let app = TestApp::with_probabilities(vec![0.42, 0.30, 0.18, 0.10]);
    let cookie = app.login_verified_user("a@example.com", "pw123456").await;

    let response = app
        .send(multipart_request(
            "/predict",
            "file",
            &png_image(),
            Some(&cookie),
        ))
        .await;

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = body_json(response).await;
    assert_eq!(body["detail"], "Prediction confidence too low");
    assert_eq!(body["error"], "low_confidence");

    assert_eq!(app.classifier.calls(), 1);
    assert_eq!(app.assets.uploads(), 0);
    assert_eq!(app.store.prediction_count().await, 0);
}

#[tokio::test]
async fn test_predict_requires_session() {
    let app = TestApp::new();

    let response = app
        .send(multipart_request("/predict", "file", &png_image(), None))
        .await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(app.classifier.calls(), 0);
}

#[tokio::test]
async fn test_predict_missing_file_field() {
    let app = TestApp::new();
    let cookie = app.login_verified_user("a@example.com", "pw123456").await;

    let response = app
        .send(multipart_request(
            "/predict",
            "image",
            &png_image(),
            Some(&cookie),
        ))
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(app.classifier.calls(), 0);
}

#[tokio::test]
async fn test_predict_invalid_image() {
    let app = TestApp::new();
    let cookie = app.login_verified_user("a@example.com", "pw123456").await;

    let response = app
        .send(multipart_request(
            "/predict",
            "file",
            b"definitely not an image",
            Some(&cookie),
        ))
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "invalid_image");
    assert_eq!(app.classifier.calls(), 0);
    assert_eq!(app.store.prediction_count().await, 0);
}

#[tokio::test]
async fn test_predict_asset_failure_is_bad_gateway() {
    let app = TestApp::new();
    app.assets.fail_uploads();
    let cookie = app.login_verified_user("a@example.com", "pw123456").await;

    let response = app
        .send(multipart_request(
            "/predict",
            "file",
            &png_image(),
            Some(&cookie),
        ))
        .await;

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(app.store.prediction_count().await, 0);
}

// =============================================================================
// Guest Predictions
// =============================================================================

#[tokio::test]
async fn test_guest_predict() {
    let app = TestApp::with_probabilities(vec![0.01, 0.02, 0.03, 0.94]);

    let response = app
        .send(multipart_request("/guest-predict", "file", &png_image(), None))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["disease"], "Pituitary");
    assert_eq!(body["confidence"], 94.0);
    assert!(body.get("image_url").is_none());

    assert_eq!(app.assets.uploads(), 0);
    assert_eq!(app.store.prediction_count().await, 0);
}

#[tokio::test]
async fn test_guest_predict_low_confidence() {
    let app = TestApp::with_probabilities(vec![0.3, 0.3, 0.2, 0.2]);

    let response = app
        .send(multipart_request("/guest-predict", "file", &png_image(), None))
        .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

// =============================================================================
// History
// =============================================================================

#[tokio::test]
async fn test_history_newest_first() {
    let app = TestApp::new();
    let cookie = app.login_verified_user("a@example.com", "pw123456").await;

    app.send(multipart_request("/predict", "file", &png_image(), Some(&cookie)))
        .await;
    app.classifier.set_probabilities(vec![0.05, 0.9, 0.03, 0.02]);
    app.send(multipart_request("/predict", "file", &png_image(), Some(&cookie)))
        .await;

    let response = app.send(get_with_cookie("/history", &cookie)).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    let history = body["history"].as_array().unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0]["disease"], "Meningioma");
    assert_eq!(history[1]["disease"], "Glioma");
}

#[tokio::test]
async fn test_history_isolated_per_user() {
    let app = TestApp::new();
    let alice = app.login_verified_user("a@example.com", "pw123456").await;
    let bob = app.login_verified_user("b@example.com", "pw123456").await;

    app.send(multipart_request("/predict", "file", &png_image(), Some(&alice)))
        .await;

    let response = app.send(get_with_cookie("/history", &bob)).await;
    let body = body_json(response).await;
    assert!(body["history"].as_array().unwrap().is_empty());

    let response = app.send(get_request("/history")).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
