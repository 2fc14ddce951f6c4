use thiserror::Error;

/// Main error type for the challenge engine
#[derive(Error, Debug)]
pub enum EngineError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    // Database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    // Network errors
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // Domain errors
    #[error("Challenge not found: {challenge_id}")]
    NotFound { challenge_id: i64 },

    #[error("Invalid state: {0}")]
    InvalidState(String),

    // Market data errors
    #[error("Quote unavailable: {0}")]
    Unavailable(String),

    // Validation errors
    #[error("Validation failed: {0}")]
    Validation(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Transient failures that are safe to retry on the next poll.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::Unavailable(_) | EngineError::Http(_))
    }

    pub fn not_found(challenge_id: i64) -> Self {
        EngineError::NotFound { challenge_id }
    }
}

/// Result type alias for EngineError
pub type Result<T> = std::result::Result<T, EngineError>;
