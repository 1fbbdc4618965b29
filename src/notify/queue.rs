use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use super::{EmailMessage, Mailer};

/// Default number of pending emails the queue can hold.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Default number of delivery attempts per email.
pub const DEFAULT_MAIL_ATTEMPTS: u32 = 3;

/// How many times to try a delivery and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one (at least 1)
    pub max_attempts: u32,

    /// Delay after the first failure; doubled after every further failure
    pub initial_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAIL_ATTEMPTS,
            initial_backoff: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_backoff,
        }
    }

    /// Delay before retry number `failed_attempts` (1-based).
    pub fn backoff(&self, failed_attempts: u32) -> Duration {
        let exponent = failed_attempts.saturating_sub(1).min(16);
        self.initial_backoff.saturating_mul(1 << exponent)
    }
}

// =============================================================================
// Queue
// =============================================================================

/// Sending half of the email queue. Cheap to clone.
#[derive(Clone)]
pub struct NotificationQueue {
    sender: mpsc::Sender<EmailMessage>,
}

/// Handle to the background delivery task.
///
/// The worker exits once every [`NotificationQueue`] clone has been dropped
/// and the backlog is drained.
pub struct NotificationWorker {
    handle: JoinHandle<()>,
}

impl NotificationQueue {
    /// Spawn the delivery worker and return the queue feeding it.
    pub fn start(
        mailer: Arc<dyn Mailer>,
        capacity: usize,
        retry: RetryPolicy,
    ) -> (Self, NotificationWorker) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let handle = tokio::spawn(run_worker(receiver, mailer, retry));
        (Self { sender }, NotificationWorker { handle })
    }

    /// Queue an email for background delivery.
    ///
    /// Never blocks. Returns `false` (and logs) if the queue is full or the
    /// worker has stopped; the caller's request still succeeds.
    pub fn enqueue(&self, message: EmailMessage) -> bool {
        match self.sender.try_send(message) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(message)) => {
                error!(to = %message.to, "Email queue full, dropping message");
                false
            }
            Err(mpsc::error::TrySendError::Closed(message)) => {
                error!(to = %message.to, "Email worker stopped, dropping message");
                false
            }
        }
    }
}

impl NotificationWorker {
    /// Wait for the worker to drain the queue and exit.
    pub async fn join(self) {
        if let Err(e) = self.handle.await {
            error!("Email worker terminated abnormally: {}", e);
        }
    }
}

async fn run_worker(
    mut receiver: mpsc::Receiver<EmailMessage>,
    mailer: Arc<dyn Mailer>,
    retry: RetryPolicy,
) {
    while let Some(message) = receiver.recv().await {
        deliver(mailer.as_ref(), &message, retry).await;
    }
    debug!("Email queue closed, worker exiting");
}

/// Deliver one message, retrying with backoff. Returns whether it was sent.
async fn deliver(mailer: &dyn Mailer, message: &EmailMessage, retry: RetryPolicy) -> bool {
    let max_attempts = retry.max_attempts.max(1);

    for attempt in 1..=max_attempts {
        match mailer.send(message).await {
            Ok(()) => {
                debug!(to = %message.to, attempt, "Email delivered");
                return true;
            }
            Err(e) if attempt < max_attempts => {
                let delay = retry.backoff(attempt);
                warn!(
                    to = %message.to,
                    attempt,
                    retry_in_ms = delay.as_millis() as u64,
                    "Email delivery failed: {}",
                    e
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                error!(
                    to = %message.to,
                    attempts = max_attempts,
                    "Giving up on email delivery: {}",
                    e
                );
            }
        }
    }

    false
}
