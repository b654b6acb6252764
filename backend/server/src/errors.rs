//! Application-wide error types.

use gated_funding::FundingError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Event parse error: {0}")]
    EventParse(String),

    #[error("Corrupt record: {0}")]
    CorruptRecord(String),

    #[error(transparent)]
    Funding(#[from] FundingError),
}

/// Storage failures cross into the core as [`FundingError::Storage`].
impl From<ServerError> for FundingError {
    fn from(err: ServerError) -> Self {
        match err {
            ServerError::Funding(inner) => inner,
            other => FundingError::Storage(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, ServerError>;
