//! Errors raised by repository operations.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("failed to hash password: {0}")]
    PasswordHash(String),

    #[error("failed to encode file list: {0}")]
    Encoding(#[from] serde_json::Error),

    /// A uniqueness rule would be violated (duplicate enrollment, phone, ...)
    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    NotFound(String),

    /// The request references data in a way the domain does not allow
    #[error("{0}")]
    Invalid(String),
}

impl StoreError {
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid(message.into())
    }
}
