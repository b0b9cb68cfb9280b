//! Common error types for Toro

use thiserror::Error;

/// Common result type for Toro operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types shared across the Toro crates
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid user input or parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}
