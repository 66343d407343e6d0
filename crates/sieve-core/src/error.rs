//! Error types for sieve.

use thiserror::Error;

/// Result type alias for sieve operations.
pub type Result<T> = std::result::Result<T, SieveError>;

/// Errors that can occur in sieve operations.
#[derive(Error, Debug)]
pub enum SieveError {
    /// Invalid data format
    #[error("Invalid format: {0}")]
    InvalidFormat(String),
}
