use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Market data feed error: {0}")]
    Feed(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid strategy '{name}': {reason}")]
    InvalidStrategy { name: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn invalid_strategy(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::InvalidStrategy {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
