//! User accounts.
//!
//! Registration creates an unverified account with a 6-digit code that is
//! mailed in the background. Verification consumes the code exactly once,
//! and login is only allowed for verified accounts.

mod password;
mod service;

pub use password::{PasswordHasher, DEFAULT_BCRYPT_COST};
pub use service::{generate_verify_token, AccountService, Registration};
