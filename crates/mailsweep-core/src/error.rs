//! Error types for the sync engine.

use thiserror::Error;

/// Errors that can occur while syncing an account.
#[derive(Debug, Error)]
pub enum Error {
    /// Token refresh failed.
    #[error("OAuth error: {0}")]
    OAuth(#[from] mailsweep_oauth::Error),

    /// IMAP protocol error.
    #[error("IMAP error: {0}")]
    Imap(#[from] async_imap::error::Error),

    /// Message could not be parsed.
    #[error("MIME error: {0}")]
    Mime(#[from] mailsweep_mime::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// Connection failed.
    #[error("Connection failed: {0}")]
    Connection(String),

    /// Authentication failed.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// A mailbox command failed.
    #[error("Operation failed: {0}")]
    Operation(String),

    /// The storage collaborator reported a failure.
    #[error("Store error: {0}")]
    Store(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Every session attempt failed.
    #[error("IMAP session failed after {attempts} attempts: {last}")]
    RetriesExhausted {
        /// Number of attempts made.
        attempts: u32,
        /// Error from the final attempt.
        last: String,
    },
}

impl Error {
    /// Builds an [`Error::Store`] from any displayable failure.
    pub fn store(err: impl std::fmt::Display) -> Self {
        Self::Store(err.to_string())
    }
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
