//! HTTP request handlers for the NeuroDetect API.
//!
//! # Endpoints
//!
//! - `POST /register` - Create an unverified account
//! - `GET /verify-email?email=&token=` - Confirm an email address
//! - `POST /login` - Start a session (sets the session cookie)
//! - `POST /logout` - End the session
//! - `GET /me` - Current user
//! - `POST /predict` - Classify and record a scan (session required)
//! - `GET /history` - Past predictions, newest first (session required)
//! - `POST /guest-predict` - Classify a scan without recording it
//! - `GET /health` - Health check endpoint

use std::sync::Arc;

use axum::{
    extract::{
        multipart::{MultipartError, MultipartRejection},
        rejection::{JsonRejection, QueryRejection},
        FromRef, FromRequest, FromRequestParts, Multipart, Query, State,
    },
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use bytes::Bytes;
use chrono::SecondsFormat;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::account::{AccountService, Registration};
use crate::error::{AccountError, PredictionError, PreprocessError};
use crate::inference::PredictionService;
use crate::store::Prediction;

use super::auth::{clear_session_cookie, session_cookie, SessionSigner, SessionUser};

/// Multipart field carrying the uploaded scan.
pub const IMAGE_FIELD: &str = "file";

// =============================================================================
// Application State
// =============================================================================

/// Shared application state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    /// Registration, verification, and login
    pub accounts: Arc<AccountService>,

    /// Classification pipeline
    pub predictions: Arc<PredictionService>,

    /// Session token signer
    pub sessions: SessionSigner,

    /// Add the `Secure` attribute to session cookies
    pub secure_cookies: bool,
}

impl AppState {
    pub fn new(
        accounts: AccountService,
        predictions: PredictionService,
        sessions: SessionSigner,
    ) -> Self {
        Self {
            accounts: Arc::new(accounts),
            predictions: Arc::new(predictions),
            sessions,
            secure_cookies: false,
        }
    }

    /// Mark session cookies `Secure` (HTTPS deployments).
    pub fn with_secure_cookies(mut self, secure: bool) -> Self {
        self.secure_cookies = secure;
        self
    }
}

impl FromRef<AppState> for SessionSigner {
    fn from_ref(state: &AppState) -> Self {
        state.sessions.clone()
    }
}

// =============================================================================
// Request Types
// =============================================================================

/// Body of `POST /register`.
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    pub confirm_password: String,
}

impl From<RegisterRequest> for Registration {
    fn from(req: RegisterRequest) -> Self {
        Registration {
            username: req.username,
            email: req.email,
            password: req.password,
            confirm_password: req.confirm_password,
        }
    }
}

/// Body of `POST /login`.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Query of `GET /verify-email`.
#[derive(Debug, Deserialize)]
pub struct VerifyQuery {
    pub email: String,
    pub token: String,
}

// =============================================================================
// Response Types
// =============================================================================

/// JSON error response returned for all error conditions.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error type identifier (e.g., "not_found", "low_confidence")
    pub error: String,

    /// Human-readable error message
    pub detail: String,

    /// HTTP status code (included for convenience)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

impl ErrorResponse {
    /// Create a new error response.
    pub fn new(error: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            detail: detail.into(),
            status: None,
        }
    }

    /// Create a new error response with status code.
    pub fn with_status(
        error: impl Into<String>,
        detail: impl Into<String>,
        status: StatusCode,
    ) -> Self {
        Self {
            error: error.into(),
            detail: detail.into(),
            status: Some(status.as_u16()),
        }
    }
}

/// `{"msg": ...}` acknowledgement.
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub msg: String,
}

impl MessageResponse {
    fn new(msg: impl Into<String>) -> Self {
        Self { msg: msg.into() }
    }
}

/// Public view of a user. Never includes the password hash.
#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub user_id: i64,
    pub username: String,
    pub email: String,
    pub is_verified: bool,
}

/// A recorded prediction as returned to the client.
#[derive(Debug, Serialize)]
pub struct PredictionResponse {
    /// Class label, e.g. "Glioma"
    pub disease: String,

    /// Percentage, rounded to 2 decimals
    pub confidence: f64,

    pub image_url: String,

    /// ISO-8601 UTC
    pub timestamp: String,

    /// Local clock time, e.g. "02:07 PM"
    #[serde(rename = "displayTime")]
    pub display_time: String,
}

impl PredictionResponse {
    fn from_prediction(prediction: Prediction, service: &PredictionService) -> Self {
        Self {
            display_time: service.display_time(&prediction.timestamp),
            timestamp: prediction
                .timestamp
                .to_rfc3339_opts(SecondsFormat::Micros, false),
            disease: prediction.label,
            confidence: prediction.confidence,
            image_url: prediction.image_url,
        }
    }
}

/// Result of a guest prediction.
#[derive(Debug, Serialize)]
pub struct GuestPredictionResponse {
    pub disease: String,
    pub confidence: f64,
}

/// Response of `GET /history`.
#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub history: Vec<PredictionResponse>,
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service status
    pub status: String,

    /// Service version
    pub version: String,
}

// =============================================================================
// Error Mapping
// =============================================================================

/// Build the JSON error response, logging by severity:
/// 5xx at ERROR, 404 at DEBUG, other 4xx at WARN.
fn error_response(status: StatusCode, error_type: &str, message: String) -> Response {
    if status.is_server_error() {
        error!(
            error_type = error_type,
            status = status.as_u16(),
            "Server error: {}",
            message
        );
    } else if status == StatusCode::NOT_FOUND {
        debug!(
            error_type = error_type,
            status = status.as_u16(),
            "Not found: {}",
            message
        );
    } else {
        warn!(
            error_type = error_type,
            status = status.as_u16(),
            "Client error: {}",
            message
        );
    }

    let body = ErrorResponse::with_status(error_type, message, status);
    (status, Json(body)).into_response()
}

/// A JSON body or query string that could not be extracted.
#[derive(Debug)]
pub struct RequestRejection {
    status: StatusCode,
    message: String,
}

impl From<JsonRejection> for RequestRejection {
    fn from(rejection: JsonRejection) -> Self {
        Self {
            status: rejection.status(),
            message: rejection.body_text(),
        }
    }
}

impl From<QueryRejection> for RequestRejection {
    fn from(rejection: QueryRejection) -> Self {
        Self {
            status: rejection.status(),
            message: rejection.body_text(),
        }
    }
}

impl IntoResponse for RequestRejection {
    fn into_response(self) -> Response {
        error_response(self.status, "validation_error", self.message)
    }
}

/// [`Json`] extractor that rejects with an [`ErrorResponse`] body.
#[derive(FromRequest)]
#[from_request(via(Json), rejection(RequestRejection))]
pub struct JsonBody<T>(pub T);

/// [`Query`] extractor that rejects with an [`ErrorResponse`] body.
#[derive(FromRequestParts)]
#[from_request(via(Query), rejection(RequestRejection))]
pub struct QueryParams<T>(pub T);

impl IntoResponse for AccountError {
    fn into_response(self) -> Response {
        let (status, error_type) = match &self {
            AccountError::InvalidInput(_) | AccountError::PasswordMismatch => {
                (StatusCode::BAD_REQUEST, "validation_error")
            }
            AccountError::AlreadyVerified | AccountError::PendingVerification => {
                (StatusCode::BAD_REQUEST, "conflict")
            }
            AccountError::InvalidVerification => (StatusCode::BAD_REQUEST, "invalid_verification"),
            AccountError::InvalidCredentials => (StatusCode::UNAUTHORIZED, "invalid_credentials"),
            AccountError::NotVerified => (StatusCode::FORBIDDEN, "not_verified"),
            AccountError::UserNotFound => (StatusCode::NOT_FOUND, "not_found"),
            AccountError::Hashing(_) => (StatusCode::INTERNAL_SERVER_ERROR, "hashing_error"),
            AccountError::Store(_) => (StatusCode::INTERNAL_SERVER_ERROR, "store_error"),
        };

        error_response(status, error_type, self.to_string())
    }
}

impl IntoResponse for PredictionError {
    fn into_response(self) -> Response {
        let (status, error_type) = match &self {
            PredictionError::MissingImage(_) => (StatusCode::BAD_REQUEST, "invalid_request"),
            PredictionError::UploadTooLarge(_) => (StatusCode::PAYLOAD_TOO_LARGE, "payload_too_large"),
            PredictionError::UserNotFound => (StatusCode::NOT_FOUND, "not_found"),
            PredictionError::LowConfidence { .. } => {
                (StatusCode::UNPROCESSABLE_ENTITY, "low_confidence")
            }
            PredictionError::Preprocess(PreprocessError::Task(_)) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "preprocess_error")
            }
            PredictionError::Preprocess(_) => (StatusCode::BAD_REQUEST, "invalid_image"),
            PredictionError::Model(_) => (StatusCode::BAD_GATEWAY, "model_error"),
            PredictionError::Asset(_) => (StatusCode::BAD_GATEWAY, "asset_error"),
            PredictionError::Store(_) => (StatusCode::INTERNAL_SERVER_ERROR, "store_error"),
        };

        error_response(status, error_type, self.to_string())
    }
}

// =============================================================================
// Account Handlers
// =============================================================================

/// `POST /register`
///
/// Responds before the verification email is delivered.
pub async fn register_handler(
    State(state): State<AppState>,
    JsonBody(request): JsonBody<RegisterRequest>,
) -> Result<Json<MessageResponse>, AccountError> {
    state.accounts.register(request.into()).await?;
    Ok(Json(MessageResponse::new(
        "User created. Check your Gmail to verify.",
    )))
}

/// `GET /verify-email?email=&token=`
pub async fn verify_email_handler(
    State(state): State<AppState>,
    QueryParams(query): QueryParams<VerifyQuery>,
) -> Result<Json<MessageResponse>, AccountError> {
    state.accounts.verify_email(&query.email, &query.token).await?;
    Ok(Json(MessageResponse::new(
        "Email verified. You can now log in.",
    )))
}

/// `POST /login`
///
/// # Response
///
/// - `200 OK` with `Set-Cookie: access_token_cookie=...`
/// - `401 Unauthorized`: Unknown email or wrong password
/// - `403 Forbidden`: Email not verified
pub async fn login_handler(
    State(state): State<AppState>,
    JsonBody(request): JsonBody<LoginRequest>,
) -> Result<Response, AccountError> {
    let user = state
        .accounts
        .authenticate(&request.email, &request.password)
        .await?;

    let token = state.sessions.issue(&user.email);
    let cookie = session_cookie(&token, state.sessions.ttl(), state.secure_cookies);
    debug!(user_id = user.user_id, "Session started");

    Ok((
        [(header::SET_COOKIE, cookie)],
        Json(MessageResponse::new("Login successful")),
    )
        .into_response())
}

/// `POST /logout`. Always succeeds.
pub async fn logout_handler(State(state): State<AppState>) -> Response {
    (
        [(header::SET_COOKIE, clear_session_cookie(state.secure_cookies))],
        Json(MessageResponse::new("Logged out")),
    )
        .into_response()
}

/// `GET /me`
pub async fn me_handler(
    State(state): State<AppState>,
    session: SessionUser,
) -> Result<Json<UserResponse>, AccountError> {
    let user = state.accounts.current_user(&session.email).await?;
    Ok(Json(UserResponse {
        user_id: user.user_id,
        username: user.username,
        email: user.email,
        is_verified: user.is_verified,
    }))
}

// =============================================================================
// Prediction Handlers
// =============================================================================

/// Map a multipart read failure, keeping 413 for oversized bodies.
fn upload_error(err: MultipartError, context: &str) -> PredictionError {
    let message = format!("{}: {}", context, err.body_text());
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        PredictionError::UploadTooLarge(message)
    } else {
        PredictionError::MissingImage(message)
    }
}

/// Pull the bytes of the `file` field out of a multipart body.
async fn read_image_field(
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Bytes, PredictionError> {
    let mut multipart = multipart.map_err(|r| PredictionError::MissingImage(r.body_text()))?;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| upload_error(e, "Invalid multipart body"))?
    {
        if field.name() == Some(IMAGE_FIELD) {
            return field
                .bytes()
                .await
                .map_err(|e| upload_error(e, "Failed to read upload"));
        }
    }

    Err(PredictionError::MissingImage(format!(
        "Missing multipart field '{}'",
        IMAGE_FIELD
    )))
}

/// `POST /predict`
///
/// # Response
///
/// - `200 OK`: `{disease, confidence, image_url, timestamp, displayTime}`
/// - `400 Bad Request`: Missing or undecodable image
/// - `413 Payload Too Large`: Upload over the body limit
/// - `401 Unauthorized`: No valid session
/// - `404 Not Found`: Session user no longer exists
/// - `422 Unprocessable Entity`: Confidence below threshold
/// - `502 Bad Gateway`: Model runtime or asset host failure
pub async fn predict_handler(
    State(state): State<AppState>,
    session: SessionUser,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<PredictionResponse>, PredictionError> {
    let image = read_image_field(multipart).await?;
    let prediction = state
        .predictions
        .predict_and_save(image, &session.email)
        .await?;

    Ok(Json(PredictionResponse::from_prediction(
        prediction,
        &state.predictions,
    )))
}

/// `POST /guest-predict`. Nothing is uploaded or stored.
pub async fn guest_predict_handler(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<GuestPredictionResponse>, PredictionError> {
    let image = read_image_field(multipart).await?;
    let classification = state.predictions.predict_guest(image).await?;

    Ok(Json(GuestPredictionResponse {
        disease: classification.class.label().to_string(),
        confidence: classification.confidence_percent(),
    }))
}

/// `GET /history`
pub async fn history_handler(
    State(state): State<AppState>,
    session: SessionUser,
) -> Result<Json<HistoryResponse>, PredictionError> {
    let history = state
        .predictions
        .history(&session.email)
        .await?
        .into_iter()
        .map(|p| PredictionResponse::from_prediction(p, &state.predictions))
        .collect();

    Ok(Json(HistoryResponse { history }))
}

/// Handle health check requests.
///
/// `200 OK` with `{"status": "healthy", "version": "0.1.0"}`.
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// =============================================================================
// Tests
// =============================================================================
