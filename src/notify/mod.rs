//! Outbound email.
//!
//! Registration enqueues a verification email on a [`NotificationQueue`]; a
//! background worker delivers it through a [`Mailer`] with retries, so the
//! HTTP response never waits on the mail transport.
//!
//! ```text
//! register() ──► NotificationQueue ──mpsc──► worker ──► Mailer (HTTP API / log)
//! ```

mod mailer;
mod queue;
mod template;

use async_trait::async_trait;

use crate::error::MailError;

pub use mailer::{HttpMailer, LogMailer, DEFAULT_MAIL_TIMEOUT};
pub use queue::{
    NotificationQueue, NotificationWorker, RetryPolicy, DEFAULT_MAIL_ATTEMPTS, DEFAULT_QUEUE_CAPACITY,
};
pub use template::{verification_email, verification_link, VERIFICATION_SUBJECT};

/// A fully rendered HTML email.
#[derive(Debug, Clone, PartialEq)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub html: String,
}

/// Something that can deliver an [`EmailMessage`].
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> Result<(), MailError>;
}
