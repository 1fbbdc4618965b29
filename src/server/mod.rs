//! HTTP server layer for NeuroDetect.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         HTTP Layer                              │
//! │   /register /verify-email /login /logout /me   (also /auth/*)   │
//! │   /predict /history /guest-predict /health                      │
//! │                                                                 │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────────────────┐  │
//! │  │  handlers   │  │    auth     │  │        routes           │  │
//! │  │ (requests)  │  │  (session)  │  │  (router config)        │  │
//! │  └─────────────┘  └─────────────┘  └─────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod auth;
pub mod handlers;
pub mod routes;

pub use auth::{
    clear_session_cookie, session_cookie, session_token, AuthError, SessionSigner, SessionUser,
    DEFAULT_SESSION_TTL, MIN_SECRET_LEN, SESSION_COOKIE_NAME,
};
pub use handlers::{
    guest_predict_handler, health_handler, history_handler, login_handler, logout_handler,
    me_handler, predict_handler, register_handler, verify_email_handler, AppState, ErrorResponse,
    GuestPredictionResponse, HealthResponse, HistoryResponse, LoginRequest, MessageResponse,
    PredictionResponse, RegisterRequest, UserResponse, VerifyQuery, IMAGE_FIELD,
};
pub use routes::{create_router, RouterConfig, DEFAULT_MAX_UPLOAD_BYTES};
