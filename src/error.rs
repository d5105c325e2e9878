//! Error types for the Windowgate service.

use thiserror::Error;

/// Main error type for Windowgate operations.
///
/// Rate limit rejections are not errors; they are returned as
/// [`Decision::Rejected`](crate::ratelimit::Decision::Rejected).
#[derive(Error, Debug)]
pub enum WindowgateError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// The caller could not be identified with a usable client key
    #[error("Invalid client key: {0}")]
    InvalidClientKey(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Windowgate operations.
pub type Result<T> = std::result::Result<T, WindowgateError>;
