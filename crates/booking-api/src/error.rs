//! Error types for booking API calls

/// Errors from booking endpoint wrappers.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Api(#[from] session_core::Error),

    #[error("invalid card: {0}")]
    InvalidCard(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl Error {
    /// HTTP status from the backend, if the call reached it.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Api(e) => e.status(),
            _ => None,
        }
    }
}

/// Result alias for booking API operations.
pub type Result<T> = std::result::Result<T, Error>;
