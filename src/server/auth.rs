//! Signed session tokens carried in an HTTP-only cookie.
//!
//! # Token Format
//!
//! ```text
//! token     = hex(subject) "." expiry "." hex(signature)
//! signature = HMAC-SHA256(secret_key, hex(subject) "." expiry)
//! ```
//!
//! The subject is the user's email and `expiry` is a Unix timestamp in
//! seconds. Tokens are stored in the `access_token_cookie` cookie:
//!
//! ```text
//! Set-Cookie: access_token_cookie=<token>; HttpOnly; Path=/; SameSite=Lax; Max-Age=86400
//! ```
//!
//! # Security Properties
//!
//! - **Tamper-evident**: changing the subject or expiry invalidates the MAC
//! - **Time-limited**: tokens are rejected after their expiry
//! - **Constant-time comparison**: MACs are compared with `subtle`
//!
//! # Example
//!
//! ```rust
//! use neurodetect::server::auth::SessionSigner;
//! use std::time::Duration;
//!
//! let signer = SessionSigner::new("0123456789abcdef0123456789abcdef", Duration::from_secs(3600));
//! let token = signer.issue("alice@example.com");
//! assert_eq!(signer.verify(&token).unwrap(), "alice@example.com");
//! ```

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use tracing::{debug, warn};

use super::handlers::ErrorResponse;

/// Name of the cookie holding the session token.
pub const SESSION_COOKIE_NAME: &str = "access_token_cookie";

/// Default session lifetime (24 hours).
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Minimum secret length accepted at startup.
pub const MIN_SECRET_LEN: usize = 32;

// =============================================================================
// Types
// =============================================================================

type HmacSha256 = Hmac<Sha256>;

/// Session authentication errors.
#[derive(Debug, Clone)]
pub enum AuthError {
    /// No session cookie on the request
    MissingSession,

    /// Token is not `subject.expiry.signature`
    MalformedToken,

    /// Token has expired
    Expired {
        /// When the token expired
        expired_at: i64,
        /// Current time
        current_time: i64,
    },

    /// MAC does not match
    InvalidSignature,
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthError::MissingSession => write!(f, "Not authenticated"),
            AuthError::MalformedToken => write!(f, "Malformed session token"),
            AuthError::Expired {
                expired_at,
                current_time,
            } => write!(
                f,
                "Session expired at {} (current time: {})",
                expired_at, current_time
            ),
            AuthError::InvalidSignature => write!(f, "Invalid session token"),
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = StatusCode::UNAUTHORIZED;
        let error_type = match &self {
            AuthError::MissingSession => "missing_session",
            AuthError::MalformedToken => "malformed_session",
            AuthError::Expired { .. } => "session_expired",
            AuthError::InvalidSignature => "invalid_session",
        };
        let message = self.to_string();

        // A bad MAC means someone is forging cookies
        match &self {
            AuthError::InvalidSignature | AuthError::MalformedToken => {
                warn!(
                    error_type = error_type,
                    status = status.as_u16(),
                    "Authentication failed: {}",
                    message
                );
            }
            _ => {
                debug!(
                    error_type = error_type,
                    status = status.as_u16(),
                    "Authentication failed: {}",
                    message
                );
            }
        }

        let error_response = ErrorResponse::with_status(error_type, message, status);
        (status, Json(error_response)).into_response()
    }
}

// =============================================================================
// Session Signer
// =============================================================================

/// Issues and verifies HMAC-SHA256 session tokens.
#[derive(Clone)]
pub struct SessionSigner {
    secret_key: Arc<[u8]>,
    ttl: Duration,
}

impl SessionSigner {
    /// Create a signer. The secret should be at least [`MIN_SECRET_LEN`] bytes.
    pub fn new(secret_key: impl AsRef<[u8]>, ttl: Duration) -> Self {
        Self {
            secret_key: Arc::from(secret_key.as_ref()),
            ttl,
        }
    }

    /// Lifetime of newly issued tokens.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Issue a token for `subject` valid for the configured TTL.
    pub fn issue(&self, subject: &str) -> String {
        let ttl = i64::try_from(self.ttl.as_secs()).unwrap_or(i64::MAX);
        let expiry = Utc::now().timestamp().saturating_add(ttl);
        self.issue_with_expiry(subject, expiry)
    }

    /// Issue a token with an explicit expiry (Unix seconds).
    pub fn issue_with_expiry(&self, subject: &str, expiry: i64) -> String {
        let payload = format!("{}.{}", hex::encode(subject), expiry);
        let signature = hex::encode(self.compute_mac(&payload));
        format!("{}.{}", payload, signature)
    }

    /// Verify a token and return its subject.
    pub fn verify(&self, token: &str) -> Result<String, AuthError> {
        let mut parts = token.splitn(3, '.');
        let (subject_hex, expiry_str, signature) = match (parts.next(), parts.next(), parts.next()) {
            (Some(s), Some(e), Some(sig)) => (s, e, sig),
            _ => return Err(AuthError::MalformedToken),
        };

        let expiry: i64 = expiry_str.parse().map_err(|_| AuthError::MalformedToken)?;
        let provided = hex::decode(signature).map_err(|_| AuthError::MalformedToken)?;

        let expected = self.compute_mac(&format!("{}.{}", subject_hex, expiry_str));
        if !bool::from(provided.ct_eq(&expected)) {
            return Err(AuthError::InvalidSignature);
        }

        let current_time = Utc::now().timestamp();
        if current_time > expiry {
            return Err(AuthError::Expired {
                expired_at: expiry,
                current_time,
            });
        }

        let subject = hex::decode(subject_hex).map_err(|_| AuthError::MalformedToken)?;
        String::from_utf8(subject).map_err(|_| AuthError::MalformedToken)
    }

    fn compute_mac(&self, payload: &str) -> Vec<u8> {
        let mut mac =
            HmacSha256::new_from_slice(&self.secret_key).expect("HMAC can take key of any size");
        mac.update(payload.as_bytes());
        mac.finalize().into_bytes().to_vec()
    }
}

// =============================================================================
// Cookies
// =============================================================================

/// `Set-Cookie` value carrying a freshly issued session token.
pub fn session_cookie(token: &str, ttl: Duration, secure: bool) -> String {
    let mut cookie = format!(
        "{}={}; HttpOnly; Path=/; SameSite=Lax; Max-Age={}",
        SESSION_COOKIE_NAME,
        token,
        ttl.as_secs()
    );
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

/// `Set-Cookie` value that removes the session cookie.
pub fn clear_session_cookie(secure: bool) -> String {
    session_cookie("", Duration::ZERO, secure)
}

/// Extract the session token from the request's `Cookie` headers.
pub fn session_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == SESSION_COOKIE_NAME && !value.is_empty())
        .map(|(_, value)| value)
}

// =============================================================================
// Extractor
// =============================================================================

/// The authenticated subject of a request.
///
/// Rejects with 401 when the session cookie is missing, forged, or expired.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionUser {
    pub email: String,
}

impl<S> FromRequestParts<S> for SessionUser
where
    SessionSigner: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let signer = SessionSigner::from_ref(state);
        let token = session_token(&parts.headers).ok_or(AuthError::MissingSession)?;
        let email = signer.verify(token)?;
        Ok(SessionUser { email })
    }
}

// =============================================================================
// Tests
// =============================================================================
