//! Registration, verification, and login.

use std::sync::Arc;

use rand::Rng;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{AccountError, StoreError};
use crate::notify::{verification_email, NotificationQueue};
use crate::store::{User, UserStore};

use super::password::PasswordHasher;

/// Fields submitted on the registration form.
#[derive(Debug, Clone)]
pub struct Registration {
    pub username: String,
    pub email: String,
    pub password: String,
    pub confirm_password: String,
}

/// Generate a 6-digit numeric verification code.
pub fn generate_verify_token() -> String {
    rand::thread_rng().gen_range(100_000..=999_999).to_string()
}

/// Orchestrates account lifecycle against the user store.
pub struct AccountService {
    users: Arc<dyn UserStore>,
    notifier: NotificationQueue,
    frontend_url: Url,
    hasher: PasswordHasher,
}

impl AccountService {
    /// Create a service with the default bcrypt cost.
    pub fn new(users: Arc<dyn UserStore>, notifier: NotificationQueue, frontend_url: Url) -> Self {
        Self {
            users,
            notifier,
            frontend_url,
            hasher: PasswordHasher::default(),
        }
    }

    /// Use a specific password hasher (lower costs speed up tests).
    pub fn with_hasher(mut self, hasher: PasswordHasher) -> Self {
        self.hasher = hasher;
        self
    }

    /// The underlying user store.
    pub fn users(&self) -> &Arc<dyn UserStore> {
        &self.users
    }

    /// Create an unverified account and queue its verification email.
    ///
    /// # Errors
    ///
    /// - `PasswordMismatch` if the confirmation differs
    /// - `AlreadyVerified` / `PendingVerification` if the email is taken
    pub async fn register(&self, registration: Registration) -> Result<User, AccountError> {
        validate_registration(&registration)?;

        if registration.password != registration.confirm_password {
            return Err(AccountError::PasswordMismatch);
        }

        if let Some(existing) = self.users.find_by_email(&registration.email).await? {
            return Err(if existing.is_verified {
                AccountError::AlreadyVerified
            } else {
                AccountError::PendingVerification
            });
        }

        let user_id = self.users.next_user_id().await?;
        let hashed_password = self.hasher.hash(&registration.password).await?;
        let token = generate_verify_token();

        let user = User {
            user_id,
            username: registration.username,
            email: registration.email,
            hashed_password,
            is_verified: false,
            verify_token: Some(token.clone()),
        };

        match self.users.insert_user(&user).await {
            Ok(()) => {}
            // Lost a race against a concurrent registration for the same email
            Err(StoreError::Duplicate(_)) => return Err(AccountError::PendingVerification),
            Err(e) => return Err(e.into()),
        }

        info!(user_id, email = %user.email, "Registered new user");

        let message = verification_email(&self.frontend_url, &user.email, &token, &user.username);
        if !self.notifier.enqueue(message) {
            warn!(email = %user.email, "Verification email was not queued");
        }

        Ok(user)
    }

    /// Confirm an email address with its one-time code.
    ///
    /// Succeeds at most once per code; the code is cleared on success.
    pub async fn verify_email(&self, email: &str, token: &str) -> Result<(), AccountError> {
        if self.users.consume_verify_token(email, token).await? {
            info!(email = %email, "Email verified");
            Ok(())
        } else {
            debug!(email = %email, "Rejected verification attempt");
            Err(AccountError::InvalidVerification)
        }
    }

    /// Check credentials for login.
    ///
    /// # Errors
    ///
    /// - `InvalidCredentials` for an unknown email or wrong password
    /// - `NotVerified` if the password matches but the email is unconfirmed
    pub async fn authenticate(&self, email: &str, password: &str) -> Result<User, AccountError> {
        let user = self
            .users
            .find_by_email(email)
            .await?
            .ok_or(AccountError::InvalidCredentials)?;

        if !self.hasher.verify(password, &user.hashed_password).await? {
            return Err(AccountError::InvalidCredentials);
        }

        if !user.is_verified {
            return Err(AccountError::NotVerified);
        }

        Ok(user)
    }

    /// Resolve the account behind a session subject.
    pub async fn current_user(&self, email: &str) -> Result<User, AccountError> {
        self.users
            .find_by_email(email)
            .await?
            .ok_or(AccountError::UserNotFound)
    }
}

fn validate_registration(registration: &Registration) -> Result<(), AccountError> {
    if registration.username.trim().is_empty() {
        return Err(AccountError::InvalidInput("Username is required."));
    }
    if !is_plausible_email(&registration.email) {
        return Err(AccountError::InvalidInput("A valid email address is required."));
    }
    if registration.password.is_empty() {
        return Err(AccountError::InvalidInput("Password is required."));
    }
    Ok(())
}

fn is_plausible_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    }
}
