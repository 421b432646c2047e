//! Error types for the session client

/// Why a refresh did not produce a new access token.
///
/// Cloned to every caller queued behind the same refresh, so it carries
/// strings rather than source errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RefreshError {
    #[error("no refresh token available")]
    NoRefreshToken,

    #[error("refresh rejected with status {status}")]
    Rejected { status: u16 },

    #[error("refresh request failed: {0}")]
    Http(String),

    #[error("invalid refresh response: {0}")]
    InvalidResponse(String),

    #[error("could not store refreshed session: {0}")]
    Storage(String),

    #[error("refresh cancelled by logout")]
    Cancelled,
}

impl From<session_auth::Error> for RefreshError {
    fn from(err: session_auth::Error) -> Self {
        match err {
            session_auth::Error::Rejected { status, .. } => RefreshError::Rejected { status },
            session_auth::Error::Http(msg) => RefreshError::Http(msg),
            session_auth::Error::Storage(msg) => RefreshError::Storage(msg),
            other => RefreshError::InvalidResponse(other.to_string()),
        }
    }
}

/// Errors surfaced by `ApiClient` calls.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("API returned {status}: {message}")]
    Status { status: u16, message: String },

    /// A second `401` after a successful refresh.
    #[error("request unauthorized after session refresh")]
    Unauthorized,

    #[error("session refresh failed: {0}")]
    Refresh(#[from] RefreshError),

    #[error(transparent)]
    Auth(#[from] session_auth::Error),

    #[error("invalid response body: {0}")]
    Decode(String),

    #[error(transparent)]
    Config(#[from] common::Error),
}

impl Error {
    /// HTTP status carried by the error, if the server answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Status { status, .. } => Some(*status),
            Error::Unauthorized => Some(401),
            Error::Auth(session_auth::Error::Rejected { status, .. }) => Some(*status),
            Error::Auth(session_auth::Error::Conflict(_)) => Some(409),
            _ => None,
        }
    }
}

/// Result alias for session client operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_rejection_keeps_status_only() {
        let err: RefreshError = session_auth::Error::Rejected {
            status: 503,
            message: "maintenance".into(),
        }
        .into();
        assert_eq!(err, RefreshError::Rejected { status: 503 });
    }

    #[test]
    fn malformed_token_maps_to_invalid_response() {
        let err: RefreshError = session_auth::Error::InvalidToken("missing exp claim".into()).into();
        assert!(matches!(err, RefreshError::InvalidResponse(ref m) if m.contains("exp")));
    }

    #[test]
    fn status_is_exposed_for_http_errors() {
        let err = Error::Status {
            status: 404,
            message: "Booking not found".into(),
        };
        assert_eq!(err.status(), Some(404));
        assert_eq!(Error::Unauthorized.status(), Some(401));
        assert_eq!(Error::Refresh(RefreshError::Cancelled).status(), None);
    }
}
