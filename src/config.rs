//! Configuration management for NeuroDetect.
//!
//! This module provides a configuration system that supports:
//! - Command-line arguments via clap
//! - Environment variables with `NEURO_` prefix
//! - Sensible defaults for all optional settings
//!
//! # Commands
//!
//! - `neurodetect serve` - Run the HTTP API
//! - `neurodetect check` - Verify database, bucket, and model connectivity
//!
//! # Environment Variables
//!
//! - `NEURO_HOST` - Server bind address (default: 0.0.0.0)
//! - `NEURO_PORT` - Server port (default: 8000)
//! - `NEURO_DATABASE_URL` - Postgres URL (unset: in-memory store)
//! - `NEURO_DB_MAX_CONNECTIONS` - Connection pool size (default: 10)
//! - `NEURO_SESSION_SECRET` - HMAC secret for session tokens (required, >= 32 bytes)
//! - `NEURO_SESSION_TTL` - Session lifetime in seconds (default: 86400)
//! - `NEURO_SECURE_COOKIES` - Mark session cookies `Secure` (default: false)
//! - `NEURO_FRONTEND_URL` - Base URL used in verification links
//! - `NEURO_MODEL_ENDPOINT` - TensorFlow Serving REST endpoint
//! - `NEURO_MODEL_NAME` - Served model name
//! - `NEURO_MODEL_TIMEOUT` - Model request timeout in seconds (default: 30)
//! - `NEURO_CONFIDENCE_THRESHOLD` - Minimum accepted confidence (default: 0.5)
//! - `NEURO_S3_BUCKET` - Bucket for uploaded scans (required)
//! - `NEURO_S3_PREFIX` - Key prefix for uploads (default: scans/)
//! - `NEURO_S3_ENDPOINT` - Custom S3 endpoint for S3-compatible services
//! - `NEURO_S3_REGION` - AWS region (default: us-east-1)
//! - `NEURO_ASSET_BASE_URL` - Public base URL for uploaded scans
//! - `NEURO_MAIL_ENDPOINT` - Email API endpoint (unset: log-only mailer)
//! - `NEURO_MAIL_API_KEY` - Bearer token for the email API
//! - `NEURO_MAIL_FROM` - Sender address
//! - `NEURO_MAIL_ATTEMPTS` - Delivery attempts per email (default: 3)
//! - `NEURO_BCRYPT_COST` - bcrypt work factor (default: 12)
//! - `NEURO_MAX_UPLOAD_BYTES` - Request body limit (default: 10 MiB)
//! - `NEURO_DISPLAY_OFFSET_MINUTES` - UTC offset for `displayTime` (default: 300)
//! - `NEURO_CORS_ORIGINS` - Allowed CORS origins, comma-separated

use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use url::Url;

use crate::account::DEFAULT_BCRYPT_COST;
use crate::assets::DEFAULT_REGION;
use crate::inference::{DEFAULT_CONFIDENCE_THRESHOLD, DEFAULT_DISPLAY_OFFSET_MINUTES};
use crate::notify::DEFAULT_MAIL_ATTEMPTS;
use crate::server::{DEFAULT_MAX_UPLOAD_BYTES, MIN_SECRET_LEN};
use crate::store::DEFAULT_MAX_CONNECTIONS;

// =============================================================================
// Default Values
// =============================================================================

/// Default server host.
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default server port.
pub const DEFAULT_PORT: u16 = 8000;

/// Default session lifetime in seconds (24 hours).
pub const DEFAULT_SESSION_TTL_SECS: u64 = 86_400;

/// Default frontend URL for verification links.
pub const DEFAULT_FRONTEND_URL: &str = "http://localhost:5173";

/// Default TensorFlow Serving REST endpoint.
pub const DEFAULT_MODEL_ENDPOINT: &str = "http://localhost:8501";

/// Default served model name.
pub const DEFAULT_MODEL_NAME: &str = "brain_tumor";

/// Default model request timeout in seconds.
pub const DEFAULT_MODEL_TIMEOUT_SECS: u64 = 30;

/// Default key prefix for uploaded scans.
pub const DEFAULT_S3_PREFIX: &str = "scans/";

/// Default sender for verification emails.
pub const DEFAULT_MAIL_FROM: &str = "NeuroDetect <no-reply@neurodetect.local>";

// =============================================================================
// CLI Arguments
// =============================================================================

/// NeuroDetect - brain MRI classification backend.
#[derive(Parser, Debug, Clone)]
#[command(name = "neurodetect")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    pub fn into_command(self) -> Command {
        self.command
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run the HTTP API server
    Serve(ServeConfig),

    /// Check connectivity to the database, bucket, and model runtime
    Check(CheckConfig),
}

/// Configuration for `neurodetect serve`.
#[derive(Args, Debug, Clone)]
pub struct ServeConfig {
    // =========================================================================
    // Server Configuration
    // =========================================================================
    /// Host address to bind the server to.
    #[arg(long, default_value = DEFAULT_HOST, env = "NEURO_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(short, long, default_value_t = DEFAULT_PORT, env = "NEURO_PORT")]
    pub port: u16,

    /// Maximum request body size in bytes.
    #[arg(long, default_value_t = DEFAULT_MAX_UPLOAD_BYTES, env = "NEURO_MAX_UPLOAD_BYTES")]
    pub max_upload_bytes: usize,

    // =========================================================================
    // Database Configuration
    // =========================================================================
    /// Postgres connection URL.
    ///
    /// If not specified, accounts and predictions are kept in memory and lost
    /// on restart.
    #[arg(long, env = "NEURO_DATABASE_URL")]
    pub database_url: Option<String>,

    /// Maximum number of pooled database connections.
    #[arg(long, default_value_t = DEFAULT_MAX_CONNECTIONS, env = "NEURO_DB_MAX_CONNECTIONS")]
    pub db_max_connections: u32,

    // =========================================================================
    // Session Configuration
    // =========================================================================
    /// Secret key for HMAC-SHA256 session tokens (at least 32 bytes).
    #[arg(long, env = "NEURO_SESSION_SECRET", hide_env_values = true)]
    pub session_secret: Option<String>,

    /// Session lifetime in seconds.
    #[arg(long, default_value_t = DEFAULT_SESSION_TTL_SECS, env = "NEURO_SESSION_TTL")]
    pub session_ttl: u64,

    /// Add the `Secure` attribute to session cookies (HTTPS only).
    #[arg(long, default_value_t = false, env = "NEURO_SECURE_COOKIES")]
    pub secure_cookies: bool,

    /// bcrypt work factor (4-31).
    #[arg(long, default_value_t = DEFAULT_BCRYPT_COST, env = "NEURO_BCRYPT_COST")]
    pub bcrypt_cost: u32,

    /// Base URL of the web frontend, used in verification links.
    #[arg(long, default_value = DEFAULT_FRONTEND_URL, env = "NEURO_FRONTEND_URL")]
    pub frontend_url: String,

    // =========================================================================
    // Model Configuration
    // =========================================================================
    /// TensorFlow Serving REST endpoint.
    #[arg(long, default_value = DEFAULT_MODEL_ENDPOINT, env = "NEURO_MODEL_ENDPOINT")]
    pub model_endpoint: String,

    /// Name of the served model.
    #[arg(long, default_value = DEFAULT_MODEL_NAME, env = "NEURO_MODEL_NAME")]
    pub model_name: String,

    /// Model request timeout in seconds.
    #[arg(long, default_value_t = DEFAULT_MODEL_TIMEOUT_SECS, env = "NEURO_MODEL_TIMEOUT")]
    pub model_timeout: u64,

    /// Minimum confidence (0-1) for a prediction to be accepted.
    #[arg(long, default_value_t = DEFAULT_CONFIDENCE_THRESHOLD, env = "NEURO_CONFIDENCE_THRESHOLD")]
    pub confidence_threshold: f32,

    /// Offset from UTC, in minutes, used for `displayTime`.
    #[arg(
        long,
        default_value_t = DEFAULT_DISPLAY_OFFSET_MINUTES,
        env = "NEURO_DISPLAY_OFFSET_MINUTES",
        allow_hyphen_values = true
    )]
    pub display_offset_minutes: i32,

    // =========================================================================
    // S3 Configuration
    // =========================================================================
    /// S3 bucket for uploaded scans.
    #[arg(long, env = "NEURO_S3_BUCKET")]
    pub s3_bucket: String,

    /// Key prefix for uploaded scans.
    #[arg(long, default_value = DEFAULT_S3_PREFIX, env = "NEURO_S3_PREFIX")]
    pub s3_prefix: String,

    /// Custom S3 endpoint URL for S3-compatible services (MinIO, etc.).
    #[arg(long, env = "NEURO_S3_ENDPOINT")]
    pub s3_endpoint: Option<String>,

    /// AWS region for S3.
    #[arg(long, default_value = DEFAULT_REGION, env = "NEURO_S3_REGION")]
    pub s3_region: String,

    /// Public base URL for uploaded scans (CDN or bucket website).
    #[arg(long, env = "NEURO_ASSET_BASE_URL")]
    pub asset_base_url: Option<String>,

    // =========================================================================
    // Mail Configuration
    // =========================================================================
    /// Transactional email API endpoint.
    ///
    /// If not specified, emails are only logged.
    #[arg(long, env = "NEURO_MAIL_ENDPOINT")]
    pub mail_endpoint: Option<String>,

    /// Bearer token for the email API.
    #[arg(long, env = "NEURO_MAIL_API_KEY", hide_env_values = true)]
    pub mail_api_key: Option<String>,

    /// Sender address for outgoing email.
    #[arg(long, default_value = DEFAULT_MAIL_FROM, env = "NEURO_MAIL_FROM")]
    pub mail_from: String,

    /// Delivery attempts per email before giving up.
    #[arg(long, default_value_t = DEFAULT_MAIL_ATTEMPTS, env = "NEURO_MAIL_ATTEMPTS")]
    pub mail_attempts: u32,

    // =========================================================================
    // CORS Configuration
    // =========================================================================
    /// Allowed CORS origins (comma-separated).
    ///
    /// If not specified, only the frontend URL's origin is allowed.
    #[arg(long, env = "NEURO_CORS_ORIGINS", value_delimiter = ',')]
    pub cors_origins: Option<Vec<String>>,

    // =========================================================================
    // Logging Configuration
    // =========================================================================
    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,

    /// Disable request tracing.
    #[arg(long, default_value_t = false)]
    pub no_tracing: bool,
}

impl ServeConfig {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        match self.session_secret.as_deref() {
            None => {
                return Err(
                    "Session secret is required. Set --session-secret or NEURO_SESSION_SECRET"
                        .to_string(),
                )
            }
            Some(secret) if secret.len() < MIN_SECRET_LEN => {
                return Err(format!(
                    "Session secret must be at least {} bytes",
                    MIN_SECRET_LEN
                ))
            }
            Some(_) => {}
        }

        if self.s3_bucket.is_empty() {
            return Err(
                "S3 bucket name is required. Set --s3-bucket or NEURO_S3_BUCKET".to_string(),
            );
        }

        if self.session_ttl == 0 {
            return Err("session_ttl must be greater than 0".to_string());
        }

        if !(4..=31).contains(&self.bcrypt_cost) {
            return Err("bcrypt_cost must be between 4 and 31".to_string());
        }

        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err("confidence_threshold must be between 0 and 1".to_string());
        }

        if self.display_offset_minutes.abs() >= 24 * 60 {
            return Err("display_offset_minutes must be within +/- 24 hours".to_string());
        }

        if self.db_max_connections == 0 {
            return Err("db_max_connections must be greater than 0".to_string());
        }

        if self.max_upload_bytes == 0 {
            return Err("max_upload_bytes must be greater than 0".to_string());
        }

        if self.model_timeout == 0 {
            return Err("model_timeout must be greater than 0".to_string());
        }

        self.frontend_url()?;
        self.model_endpoint()?;
        self.mail_endpoint()?;

        Ok(())
    }

    /// Get the server bind address as "host:port".
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Get the session secret, or an empty string if unset (call validate() first).
    pub fn session_secret_or_empty(&self) -> &str {
        self.session_secret.as_deref().unwrap_or("")
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl)
    }

    pub fn model_timeout(&self) -> Duration {
        Duration::from_secs(self.model_timeout)
    }

    pub fn frontend_url(&self) -> Result<Url, String> {
        parse_url("frontend_url", &self.frontend_url)
    }

    pub fn model_endpoint(&self) -> Result<Url, String> {
        parse_url("model_endpoint", &self.model_endpoint)
    }

    pub fn mail_endpoint(&self) -> Result<Option<Url>, String> {
        self.mail_endpoint
            .as_deref()
            .map(|endpoint| parse_url("mail_endpoint", endpoint))
            .transpose()
    }

    /// CORS origins to allow: the configured list, or the frontend's origin.
    pub fn effective_cors_origins(&self) -> Vec<String> {
        match (&self.cors_origins, self.frontend_url()) {
            (Some(origins), _) => origins.clone(),
            (None, Ok(url)) => vec![url.origin().ascii_serialization()],
            (None, Err(_)) => Vec::new(),
        }
    }
}

/// Configuration for `neurodetect check`.
#[derive(Args, Debug, Clone)]
pub struct CheckConfig {
    /// Postgres connection URL (skipped if not set).
    #[arg(long, env = "NEURO_DATABASE_URL")]
    pub database_url: Option<String>,

    /// S3 bucket for uploaded scans (skipped if not set).
    #[arg(long, env = "NEURO_S3_BUCKET")]
    pub s3_bucket: Option<String>,

    /// Custom S3 endpoint URL.
    #[arg(long, env = "NEURO_S3_ENDPOINT")]
    pub s3_endpoint: Option<String>,

    /// AWS region for S3.
    #[arg(long, default_value = DEFAULT_REGION, env = "NEURO_S3_REGION")]
    pub s3_region: String,

    /// TensorFlow Serving REST endpoint.
    #[arg(long, default_value = DEFAULT_MODEL_ENDPOINT, env = "NEURO_MODEL_ENDPOINT")]
    pub model_endpoint: String,

    /// Name of the served model.
    #[arg(long, default_value = DEFAULT_MODEL_NAME, env = "NEURO_MODEL_NAME")]
    pub model_name: String,

    /// Model request timeout in seconds.
    #[arg(long, default_value_t = DEFAULT_MODEL_TIMEOUT_SECS, env = "NEURO_MODEL_TIMEOUT")]
    pub model_timeout: u64,

    /// Enable verbose logging.
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl CheckConfig {
    pub fn model_endpoint(&self) -> Result<Url, String> {
        parse_url("model_endpoint", &self.model_endpoint)
    }
}

fn parse_url(name: &str, value: &str) -> Result<Url, String> {
    Url::parse(value).map_err(|e| format!("{} is not a valid URL ({}): {}", name, value, e))
}

// =============================================================================
// Tests
// =============================================================================
