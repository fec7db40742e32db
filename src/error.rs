use thiserror::Error;

/// Main error type for the trading loop
#[derive(Error, Debug)]
pub enum TillerError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Invalid market calendar: {0}")]
    Calendar(String),

    // Database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Persistence error: {0}")]
    Persistence(String),

    // Decision engine errors
    #[error("Decision engine error: {0}")]
    Engine(String),

    #[error("Decision engine timed out after {0}s")]
    EngineTimeout(u64),

    // Broker errors
    #[error("Broker error: {0}")]
    Broker(String),

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // Validation errors
    #[error("Validation failed: {0}")]
    Validation(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Generic errors
    #[error("Operation cancelled")]
    Cancelled,

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl TillerError {
    /// Errors that must stop the scheduling loop instead of closing as a
    /// FAILED cycle. Config problems are fatal at startup; store failures
    /// are fatal mid-cycle because an unrecorded trade cannot be reconciled
    /// silently.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            TillerError::Config(_)
                | TillerError::Calendar(_)
                | TillerError::Database(_)
                | TillerError::Migration(_)
                | TillerError::Persistence(_)
        )
    }
}

/// Result type alias for TillerError
pub type Result<T> = std::result::Result<T, TillerError>;
