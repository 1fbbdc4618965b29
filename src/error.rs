use thiserror::Error;

/// Errors raised by the credential and prediction stores
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// Error reported by the database driver
    #[error("Database error: {0}")]
    Database(String),

    /// A record with the same unique key already exists
    #[error("Duplicate record: {0}")]
    Duplicate(String),

    /// Schema migration failed at startup
    #[error("Migration error: {0}")]
    Migration(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(ref db_err) = err {
            if db_err.is_unique_violation() {
                return StoreError::Duplicate(db_err.message().to_string());
            }
        }
        StoreError::Database(err.to_string())
    }
}

/// Errors from the remote asset host
#[derive(Debug, Clone, Error)]
pub enum AssetError {
    /// Upload request failed or was rejected
    #[error("Upload failed: {0}")]
    Upload(String),

    /// Bucket or host could not be reached
    #[error("Connection error: {0}")]
    Connection(String),
}

/// Errors from the mail transport
#[derive(Debug, Clone, Error)]
pub enum MailError {
    /// Network or connection error
    #[error("Mail transport error: {0}")]
    Transport(String),

    /// The mail API answered with a non-success status
    #[error("Mail API rejected message with status {status}: {body}")]
    Rejected { status: u16, body: String },
}

/// Errors from the model runtime
#[derive(Debug, Clone, Error)]
pub enum ModelError {
    /// The inference request could not be completed
    #[error("Model request failed: {0}")]
    Request(String),

    /// The runtime answered with an error status or an unreadable body
    #[error("Invalid model response: {0}")]
    Response(String),

    /// The probability vector does not cover the expected classes
    #[error("Unexpected model output: expected {expected} probabilities, got {actual}")]
    UnexpectedShape { expected: usize, actual: usize },
}

/// Errors that can occur while turning uploaded bytes into a model input
#[derive(Debug, Clone, Error)]
pub enum PreprocessError {
    /// Upload is empty
    #[error("Uploaded image is empty")]
    Empty,

    /// Bytes are not a decodable image
    #[error("Invalid image: {0}")]
    Decode(String),

    /// The blocking worker running the pipeline failed
    #[error("Preprocessing task failed: {0}")]
    Task(String),
}

/// Failures of the registration, verification, and login flows
#[derive(Debug, Clone, Error)]
pub enum AccountError {
    /// Request fields are missing or malformed
    #[error("{0}")]
    InvalidInput(&'static str),

    /// Password and confirmation differ
    #[error("Passwords do not match.")]
    PasswordMismatch,

    /// Email belongs to an account that is already verified
    #[error("Email is already verified. Please log in.")]
    AlreadyVerified,

    /// Email belongs to an account still waiting for verification
    #[error("Email already registered. Please check your inbox to verify your account.")]
    PendingVerification,

    /// No account matches the email/code pair
    #[error("Invalid token or email.")]
    InvalidVerification,

    /// Unknown email or wrong password
    #[error("Invalid credentials.")]
    InvalidCredentials,

    /// Password is right but the email has not been verified
    #[error("Please verify your email first.")]
    NotVerified,

    /// Session subject no longer resolves to an account
    #[error("User not found")]
    UserNotFound,

    /// Password hashing failed
    #[error("Password hashing failed: {0}")]
    Hashing(String),

    /// Store error
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Failures of the prediction flow
#[derive(Debug, Clone, Error)]
pub enum PredictionError {
    /// Request carried no usable image upload
    #[error("{0}")]
    MissingImage(String),

    /// Upload exceeds the request body limit
    #[error("{0}")]
    UploadTooLarge(String),

    /// Authenticated subject has no account
    #[error("User not found")]
    UserNotFound,

    /// Model confidence is below the acceptance threshold
    #[error("Prediction confidence too low")]
    LowConfidence { confidence: f32 },

    /// Upload could not be turned into a model input
    #[error(transparent)]
    Preprocess(#[from] PreprocessError),

    /// Model runtime failure
    #[error(transparent)]
    Model(#[from] ModelError),

    /// Asset host failure
    #[error(transparent)]
    Asset(#[from] AssetError),

    /// Store error
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}
