//! Test utilities for integration tests.
//!
//! This module provides mock collaborators (model runtime, asset host, mail
//! transport) and helpers for building requests against the full router.

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Method, Request, Response};
use axum::Router;
use bytes::Bytes;
use http_body_util::BodyExt;
use image::{ImageFormat, Rgb, RgbImage};
use serde_json::Value;
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tower::ServiceExt;
use url::Url;

use neurodetect::error::{AssetError, MailError, ModelError};
use neurodetect::{
    create_router, AccountService, AppState, AssetStore, Classifier, EmailMessage, ImageTensor,
    Mailer, MemoryStore, NotificationQueue, PasswordHasher, PredictionService, RetryPolicy,
    RouterConfig, SessionSigner, UserStore,
};

pub const TEST_SECRET: &str = "integration-test-secret-0123456789";
pub const FRONTEND_URL: &str = "http://localhost:5173";
pub const MULTIPART_BOUNDARY: &str = "neurodetect-test-boundary";

// =============================================================================
// Mock Collaborators
// =============================================================================

/// Classifier that returns a configurable probability vector.
pub struct MockClassifier {
    probabilities: std::sync::Mutex<Vec<f32>>,
    calls: AtomicUsize,
}

impl MockClassifier {
    pub fn new(probabilities: Vec<f32>) -> Self {
        Self {
            probabilities: std::sync::Mutex::new(probabilities),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn set_probabilities(&self, probabilities: Vec<f32>) {
        *self.probabilities.lock().unwrap() = probabilities;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Classifier for MockClassifier {
    async fn predict(&self, input: &ImageTensor) -> Result<Vec<f32>, ModelError> {
        assert_eq!(input.shape(), [1, 299, 299, 3]);
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.probabilities.lock().unwrap().clone())
    }

    async fn ready(&self) -> Result<(), ModelError> {
        Ok(())
    }
}

/// Asset store that counts uploads and can be told to fail.
#[derive(Default)]
pub struct MockAssetStore {
    uploads: AtomicUsize,
    fail: std::sync::atomic::AtomicBool,
}

impl MockAssetStore {
    pub fn uploads(&self) -> usize {
        self.uploads.load(Ordering::SeqCst)
    }

    pub fn fail_uploads(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl AssetStore for MockAssetStore {
    async fn upload(
        &self,
        _data: Bytes,
        _content_type: &str,
        extension: &str,
    ) -> Result<String, AssetError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(AssetError::Upload("access denied".to_string()));
        }
        let n = self.uploads.fetch_add(1, Ordering::SeqCst);
        Ok(format!("https://assets.example.com/scans/{}.{}", n, extension))
    }

    async fn ready(&self) -> Result<(), AssetError> {
        Ok(())
    }
}

/// Mailer that records every delivered message.
#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<EmailMessage>>,
}

impl RecordingMailer {
    pub async fn sent(&self) -> Vec<EmailMessage> {
        self.sent.lock().await.clone()
    }

    /// Wait until at least `count` messages were delivered.
    pub async fn wait_for(&self, count: usize) -> Vec<EmailMessage> {
        for _ in 0..200 {
            let sent = self.sent().await;
            if sent.len() >= count {
                return sent;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("expected {} email(s) to be delivered", count);
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, message: &EmailMessage) -> Result<(), MailError> {
        self.sent.lock().await.push(message.clone());
        Ok(())
    }
}

// =============================================================================
// Test Application
// =============================================================================

/// The full router wired to in-memory and mock collaborators.
pub struct TestApp {
    pub router: Router,
    pub store: Arc<MemoryStore>,
    pub classifier: Arc<MockClassifier>,
    pub assets: Arc<MockAssetStore>,
    pub mailer: Arc<RecordingMailer>,
}

impl TestApp {
    /// App whose model answers "Glioma" with 87% confidence.
    pub fn new() -> Self {
        Self::with_probabilities(vec![0.87, 0.05, 0.05, 0.03])
    }

    pub fn with_probabilities(probabilities: Vec<f32>) -> Self {
        Self::with_config(probabilities, RouterConfig::new().with_tracing(false))
    }

    pub fn with_config(probabilities: Vec<f32>, config: RouterConfig) -> Self {
        let store = Arc::new(MemoryStore::new());
        let classifier = Arc::new(MockClassifier::new(probabilities));
        let assets = Arc::new(MockAssetStore::default());
        let mailer = Arc::new(RecordingMailer::default());

        let (queue, _worker) = NotificationQueue::start(
            mailer.clone(),
            64,
            RetryPolicy::new(1, Duration::ZERO),
        );

        let frontend = Url::parse(FRONTEND_URL).unwrap();
        let accounts = AccountService::new(store.clone(), queue, frontend)
            .with_hasher(PasswordHasher::new(4));
        let predictions = PredictionService::new(
            store.clone(),
            store.clone(),
            classifier.clone(),
            assets.clone(),
        );
        let sessions = SessionSigner::new(TEST_SECRET, Duration::from_secs(3600));

        let state = AppState::new(accounts, predictions, sessions);
        let router = create_router(state, config);

        Self {
            router,
            store,
            classifier,
            assets,
            mailer,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(request).await.unwrap()
    }

    /// Stored verification code for `email`.
    pub async fn verify_token(&self, email: &str) -> Option<String> {
        self.store
            .find_by_email(email)
            .await
            .unwrap()
            .and_then(|user| user.verify_token)
    }

    /// Register, verify, and log in; returns the `Cookie` header value.
    pub async fn login_verified_user(&self, email: &str, password: &str) -> String {
        let response = self
            .send(json_request(
                Method::POST,
                "/register",
                serde_json::json!({
                    "username": "tester",
                    "email": email,
                    "password": password,
                    "confirm_password": password,
                }),
            ))
            .await;
        assert!(response.status().is_success());

        let token = self.verify_token(email).await.unwrap();
        let response = self
            .send(get_request(&format!(
                "/verify-email?email={}&token={}",
                email, token
            )))
            .await;
        assert!(response.status().is_success());

        let response = self
            .send(json_request(
                Method::POST,
                "/login",
                serde_json::json!({"email": email, "password": password}),
            ))
            .await;
        assert!(response.status().is_success());

        cookie_from(&response).expect("login sets the session cookie")
    }
}

// =============================================================================
// Request Helpers
// =============================================================================

pub fn get_request(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

pub fn get_with_cookie(uri: &str, cookie: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header(header::COOKIE, cookie)
        .body(Body::empty())
        .unwrap()
}

pub fn json_request(method: Method, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// Multipart upload of `data` under the field `field`.
pub fn multipart_request(uri: &str, field: &str, data: &[u8], cookie: Option<&str>) -> Request<Body> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{}\r\n", MULTIPART_BOUNDARY).as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"{}\"; filename=\"scan.png\"\r\n",
            field
        )
        .as_bytes(),
    );
    body.extend_from_slice(b"Content-Type: image/png\r\n\r\n");
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{}--\r\n", MULTIPART_BOUNDARY).as_bytes());

    let mut builder = Request::builder().method(Method::POST).uri(uri).header(
        header::CONTENT_TYPE,
        format!("multipart/form-data; boundary={}", MULTIPART_BOUNDARY),
    );
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::from(body)).unwrap()
}

/// `name=value` of the `Set-Cookie` header, usable as a `Cookie` header.
pub fn cookie_from(response: &Response<Body>) -> Option<String> {
    response
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(';').next())
        .map(|pair| pair.trim().to_string())
}

pub fn set_cookie_header(response: &Response<Body>) -> String {
    response
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

pub async fn body_json(response: Response<Body>) -> Value {
    let body = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&body).unwrap()
}

// =============================================================================
// Test Images
// =============================================================================

/// A small PNG brain-scan stand-in.
pub fn png_image() -> Vec<u8> {
    let img = RgbImage::from_fn(32, 32, |x, y| Rgb([(x * 8) as u8, (y * 8) as u8, 128]));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Png).unwrap();
    out.into_inner()
}
