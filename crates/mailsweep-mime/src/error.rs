//! Error types for MIME operations.

/// Result type alias for MIME operations.
pub type Result<T> = std::result::Result<T, Error>;

/// MIME error types.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The message could not be parsed at all.
    #[error("Parse error: {0}")]
    Parse(#[from] mailparse::MailParseError),

    /// Unknown or unsupported charset label.
    #[error("Unknown charset: {0}")]
    UnknownCharset(String),
}
