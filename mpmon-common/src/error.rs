//! Common error types for mpmon

use thiserror::Error;

/// Common result type for mpmon operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types shared by the cache store, configuration and lock
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Structured document could not be encoded or decoded
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),
}
