//! # NeuroDetect
//!
//! Backend for a brain MRI classification web application.
//!
//! Users register, confirm their email with a one-time code, log in, and
//! upload scans. Each scan is preprocessed into the model's input tensor,
//! classified as one of four classes, and, when the model is confident
//! enough, stored alongside a durable link to the original image.
//!
//! ## Architecture
//!
//! - [`store`] - User and prediction persistence (Postgres or in-memory)
//! - [`account`] - Registration, verification, and login
//! - [`notify`] - Background email delivery
//! - [`inference`] - Preprocessing, model client, and the prediction pipeline
//! - [`assets`] - Uploads to S3-compatible storage
//! - [`server`] - Axum-based HTTP server, session cookies, and routes
//! - [`config`] - CLI and configuration types
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use neurodetect::{
//!     create_router, AccountService, AppState, LogMailer, MemoryStore, NotificationQueue,
//!     PredictionService, RetryPolicy, RouterConfig, SessionSigner, TfServingClassifier,
//! };
//!
//! # async fn run(assets: Arc<dyn neurodetect::AssetStore>) -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(MemoryStore::new());
//! let (queue, worker) = NotificationQueue::start(Arc::new(LogMailer), 1024, RetryPolicy::default());
//!
//! let endpoint = url::Url::parse("http://localhost:8501")?;
//! let classifier = TfServingClassifier::new(&endpoint, "brain_tumor", Duration::from_secs(30))?;
//!
//! let accounts = AccountService::new(store.clone(), queue, url::Url::parse("http://localhost:5173")?);
//! let predictions = PredictionService::new(store.clone(), store, Arc::new(classifier), assets);
//! let sessions = SessionSigner::new("0123456789abcdef0123456789abcdef", Duration::from_secs(3600));
//!
//! let router = create_router(AppState::new(accounts, predictions, sessions), RouterConfig::new());
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:8000").await?;
//! axum::serve(listener, router).await?;
//! worker.join().await;
//! # Ok(())
//! # }
//! ```

pub mod account;
pub mod assets;
pub mod config;
pub mod error;
pub mod inference;
pub mod notify;
pub mod server;
pub mod store;

// Re-export commonly used types
pub use account::{AccountService, PasswordHasher, Registration, DEFAULT_BCRYPT_COST};
pub use assets::{create_s3_client, AssetStore, S3AssetStore};
pub use config::{CheckConfig, Cli, Command, ServeConfig};
pub use error::{
    AccountError, AssetError, MailError, ModelError, PredictionError, PreprocessError, StoreError,
};
pub use inference::{
    Classification, Classifier, ImagePreprocessor, ImageTensor, PredictionService,
    TfServingClassifier, TumorClass,
};
pub use notify::{
    EmailMessage, HttpMailer, LogMailer, Mailer, NotificationQueue, NotificationWorker,
    RetryPolicy,
};
pub use server::{create_router, AppState, AuthError, RouterConfig, SessionSigner, SessionUser};
pub use store::{MemoryStore, PgStore, Prediction, PredictionStore, User, UserStore};
