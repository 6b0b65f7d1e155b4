//! Common error types for Local Voices services
//!
//! Stored values that fail to decode surface as [`Error::CorruptRow`].

use thiserror::Error;

/// Common result type for Local Voices operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across Local Voices services
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation error (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Requested resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid user input or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Stored value that does not decode into its model
    #[error("Corrupt {column}: {detail}")]
    CorruptRow { column: &'static str, detail: String },

    /// JSON column encoding failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
