//! Error types for Reelcast

use thiserror::Error;

use crate::types::PostStatus;

pub type Result<T> = std::result::Result<T, ReelcastError>;

#[derive(Error, Debug)]
pub enum ReelcastError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Publish error: {0}")]
    Publish(#[from] PublishError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Post not found: {0}")]
    NotFound(String),

    #[error("Only scheduled posts can be {action} (post {id} is {status})")]
    InvalidState {
        id: String,
        status: PostStatus,
        action: &'static str,
    },
}

impl ReelcastError {
    /// Returns the appropriate exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            ReelcastError::InvalidInput(_)
            | ReelcastError::NotFound(_)
            | ReelcastError::InvalidState { .. } => 3,
            ReelcastError::Publish(PublishError::Authentication(_)) => 2,
            ReelcastError::Publish(_) => 1,
            ReelcastError::Config(_) => 2,
            ReelcastError::Database(_) => 2,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),
}

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database operation failed: {0}")]
    SqlxError(#[from] sqlx::Error),

    #[error("Migration failed: {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Corrupt post row {id}: {reason}")]
    CorruptRow { id: String, reason: String },
}

/// Failures of a single publication attempt
///
/// Cloneable so the same error can be stored on the post, emitted as an
/// event and returned to the caller.
#[derive(Error, Debug, Clone)]
pub enum PublishError {
    #[error("Post cannot be published: {0}")]
    Precondition(String),

    #[error("Media upload failed: {0}")]
    Upload(String),

    #[error("Container creation failed: {0}")]
    Container(String),

    #[error("Remote processing failed: {0}")]
    Processing(String),

    #[error("Timeout: media was not processed after {attempts} status checks")]
    Timeout { attempts: u32 },

    #[error("Publishing failed: {0}")]
    Publish(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimit(String),

    #[error("Publication abandoned: {0}")]
    ClaimLost(String),
}
