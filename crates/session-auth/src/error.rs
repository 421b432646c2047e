//! Error types for session authentication operations

/// Errors from token decoding, auth endpoint calls and session persistence.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("auth endpoint returned {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("{0}")]
    Conflict(String),

    #[error("invalid token: {0}")]
    InvalidToken(String),

    #[error("session storage error: {0}")]
    Storage(String),

    #[error("session parse error: {0}")]
    Parse(String),
}

/// Result alias for session auth operations.
pub type Result<T> = std::result::Result<T, Error>;
