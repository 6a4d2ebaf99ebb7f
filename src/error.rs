//! Error types for the Aldine circulation engine

use thiserror::Error;

/// Main application error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Business rule violation: {0}")]
    BusinessRule(String),

    #[error("Consistency violation: {0}")]
    Consistency(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for application operations
pub type AppResult<T> = Result<T, AppError>;
