//! Error types for toro-pm

use thiserror::Error;

/// Main error type for the player manager
#[derive(Error, Debug)]
pub enum Error {
    /// Delay policy returned a value below `DELAY_INFINITE`
    #[error("Invalid delay: {0} ms is more negative than DELAY_INFINITE")]
    InvalidDelay(i64),

    /// Failure reported by a player implementation
    ///
    /// The manager never constructs this itself; it passes player errors
    /// through exactly as returned.
    #[error("Player error: {0}")]
    Player(String),

    /// The scheduler loop is no longer running
    #[error("Player manager is no longer running")]
    ManagerClosed,

    /// Configuration rejected by `toro_common`
    #[error(transparent)]
    Common(#[from] toro_common::Error),
}

/// Convenience Result type using toro-pm Error
pub type Result<T> = std::result::Result<T, Error>;
