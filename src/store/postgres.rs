//! Postgres-backed store.
//!
//! Schema lives in `migrations/` and is applied on connect. User ids come from
//! the `user_id_seq` sequence and emails carry a unique constraint, so the
//! database itself arbitrates concurrent registrations.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{FromRow, PgPool};
use tracing::debug;

use crate::error::StoreError;

use super::{Prediction, PredictionStore, User, UserStore};

/// History query. Equal timestamps fall back to insertion order, newest first.
const PREDICTIONS_FOR_USER_SQL: &str = "SELECT user_id, email, label, confidence, image_url, created_at \
     FROM predictions WHERE user_id = $1 ORDER BY created_at DESC, id DESC";

/// Default size of the connection pool.
pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;

/// How long to wait for a free pooled connection.
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(FromRow)]
struct UserRow {
    user_id: i64,
    username: String,
    email: String,
    hashed_password: String,
    is_verified: bool,
    verify_token: Option<String>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        Self {
            user_id: row.user_id,
            username: row.username,
            email: row.email,
            hashed_password: row.hashed_password,
            is_verified: row.is_verified,
            verify_token: row.verify_token,
        }
    }
}

#[derive(FromRow)]
struct PredictionRow {
    user_id: i64,
    email: String,
    label: String,
    confidence: f64,
    image_url: String,
    created_at: DateTime<Utc>,
}

impl From<PredictionRow> for Prediction {
    fn from(row: PredictionRow) -> Self {
        Self {
            user_id: row.user_id,
            email: row.email,
            label: row.label,
            confidence: row.confidence,
            image_url: row.image_url,
            timestamp: row.created_at,
        }
    }
}

/// [`UserStore`] and [`PredictionStore`] on a Postgres connection pool.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Wrap an existing pool. Migrations are not run.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect to `database_url` and bring the schema up to date.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .connect(database_url)
            .await?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| StoreError::Migration(e.to_string()))?;

        debug!(max_connections, "Connected to Postgres");
        Ok(Self { pool })
    }

    /// Close all pooled connections.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl UserStore for PgStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let row: Option<UserRow> = sqlx::query_as(
            "SELECT user_id, username, email, hashed_password, is_verified, verify_token \
             FROM users WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(User::from))
    }

    async fn next_user_id(&self) -> Result<i64, StoreError> {
        let id: i64 = sqlx::query_scalar("SELECT nextval('user_id_seq')")
            .fetch_one(&self.pool)
            .await?;
        Ok(id)
    }

    async fn insert_user(&self, user: &User) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO users (user_id, username, email, hashed_password, is_verified, verify_token) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(user.user_id)
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.hashed_password)
        .bind(user.is_verified)
        .bind(&user.verify_token)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn consume_verify_token(&self, email: &str, token: &str) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE users SET is_verified = TRUE, verify_token = NULL \
             WHERE email = $1 AND verify_token = $2",
        )
        .bind(email)
        .bind(token)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl PredictionStore for PgStore {
    async fn insert_prediction(&self, prediction: &Prediction) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO predictions (user_id, email, label, confidence, image_url, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(prediction.user_id)
        .bind(&prediction.email)
        .bind(&prediction.label)
        .bind(prediction.confidence)
        .bind(&prediction.image_url)
        .bind(prediction.timestamp)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn predictions_for_user(&self, user_id: i64) -> Result<Vec<Prediction>, StoreError> {
        let rows: Vec<PredictionRow> = sqlx::query_as(PREDICTIONS_FOR_USER_SQL)
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Prediction::from).collect())
    }
}
