//! Persistence layer for user accounts and predictions.
//!
//! The stores are expressed as async traits so the account and inference flows
//! can run against either backend:
//!
//! ```text
//! ┌──────────────────────┐     ┌────────────────────────┐
//! │    AccountService    │     │   PredictionService    │
//! └──────────┬───────────┘     └───────────┬────────────┘
//!            │ UserStore                   │ UserStore + PredictionStore
//!            ▼                             ▼
//! ┌──────────────────────────────────────────────────────┐
//! │      PgStore (sqlx / Postgres)  │  MemoryStore       │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! Both backends hand out user ids from an atomic counter and enforce email
//! uniqueness, so concurrent registrations cannot collide.

mod memory;
mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::StoreError;

pub use memory::MemoryStore;
pub use postgres::{PgStore, DEFAULT_MAX_CONNECTIONS};

// =============================================================================
// Records
// =============================================================================

/// A registered user account.
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    /// Sequential, human-readable identifier
    pub user_id: i64,

    /// Display name chosen at registration
    pub username: String,

    /// Login identifier; unique across accounts
    pub email: String,

    /// bcrypt hash of the password
    pub hashed_password: String,

    /// Whether the email address has been confirmed
    pub is_verified: bool,

    /// One-time 6-digit code; cleared once the account is verified
    pub verify_token: Option<String>,
}

/// A persisted classification result.
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub user_id: i64,
    pub email: String,

    /// Class name, e.g. "Glioma"
    pub label: String,

    /// Confidence as a percentage rounded to 2 decimal places
    pub confidence: f64,

    /// Durable URL of the uploaded scan
    pub image_url: String,

    /// Creation time
    pub timestamp: DateTime<Utc>,
}

// =============================================================================
// Store Traits
// =============================================================================

/// Storage for user accounts.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Look up a user by email address.
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    /// Reserve the next sequential user id.
    ///
    /// Ids are handed out atomically; two callers never receive the same id.
    async fn next_user_id(&self) -> Result<i64, StoreError>;

    /// Insert a new user.
    ///
    /// Returns `StoreError::Duplicate` if the email is already registered.
    async fn insert_user(&self, user: &User) -> Result<(), StoreError>;

    /// Mark the account verified if `token` matches the stored code.
    ///
    /// Sets `is_verified` and clears the code in one step. Returns `false`
    /// when no account matches the email/token pair.
    async fn consume_verify_token(&self, email: &str, token: &str) -> Result<bool, StoreError>;

    /// Cheap round-trip used by health checks.
    async fn ping(&self) -> Result<(), StoreError>;
}

/// Storage for prediction records.
#[async_trait]
pub trait PredictionStore: Send + Sync {
    /// Persist a prediction.
    async fn insert_prediction(&self, prediction: &Prediction) -> Result<(), StoreError>;

    /// All predictions made by a user, newest first.
    async fn predictions_for_user(&self, user_id: i64) -> Result<Vec<Prediction>, StoreError>;
}
