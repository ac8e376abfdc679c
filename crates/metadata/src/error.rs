//! Metadata cache error types.

use thiserror::Error;

/// Metadata cache operation errors.
#[derive(Debug, Error)]
pub enum MetadataError {
    /// The caller passed an entry missing required fields.
    #[error("validation error: {0}")]
    Validation(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("schema migration error: {0}")]
    Migration(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl From<std::io::Error> for MetadataError {
    fn from(e: std::io::Error) -> Self {
        MetadataError::Config(e.to_string())
    }
}

/// Result type for metadata operations.
pub type MetadataResult<T> = std::result::Result<T, MetadataError>;
