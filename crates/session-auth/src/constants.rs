//! Booking API auth constants
//!
//! Paths are relative to the API base URL (which already carries the
//! `/api/v1` prefix). Storage keys and the cookie name are shared with the
//! gateway's route guard, which only ever sees the cookie.

/// Default API base URL when neither config nor `API_URL` provides one
pub const DEFAULT_API_URL: &str = "http://localhost:8080/api/v1";

pub const LOGIN_PATH: &str = "/auth/login";
pub const REGISTER_PATH: &str = "/auth/register";
pub const REFRESH_PATH: &str = "/auth/refresh";

/// Endpoints that must never trigger the refresh-and-retry protocol.
pub const AUTH_PATHS: &[&str] = &[LOGIN_PATH, REGISTER_PATH, REFRESH_PATH];

/// Header carrying the refresh token on `GET /auth/refresh`
pub const REFRESH_TOKEN_HEADER: &str = "refreshTokenAuth";

/// Persisted key/value layout
pub const ACCESS_TOKEN_KEY: &str = "accessToken";
pub const REFRESH_TOKEN_KEY: &str = "refreshToken";
pub const USER_KEY: &str = "user";

/// Cookie mirrored for the server-side route guard
pub const ACCESS_TOKEN_COOKIE: &str = "accessToken";

/// Cookie lifetime, matching the backend's access token lifetime (15 min)
pub const ACCESS_COOKIE_MAX_AGE_SECS: u64 = 900;

/// Role assumed when the token carries neither `role` nor `roles`
pub const DEFAULT_ROLE: &str = "ROLE_USER";

/// Whether a request path targets one of the auth endpoints.
///
/// Matches on the path suffix with any query string removed, so both
/// `/auth/login` and `/api/v1/auth/login?next=/` are recognized.
pub fn is_auth_path(path: &str) -> bool {
    let path = path.split('?').next().unwrap_or(path).trim_end_matches('/');
    AUTH_PATHS.iter().any(|auth| path.ends_with(auth))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_paths_are_exempt() {
        assert!(is_auth_path("/auth/login"));
        assert!(is_auth_path("/auth/register"));
        assert!(is_auth_path("/auth/refresh"));
        assert!(is_auth_path("/api/v1/auth/login?next=%2F"));
        assert!(is_auth_path("/auth/refresh/"));
    }

    #[test]
    fn other_paths_are_not_exempt() {
        assert!(!is_auth_path("/bookings/my"));
        assert!(!is_auth_path("/auth/profile"));
        assert!(!is_auth_path("/payments/status/tx_1"));
        assert!(!is_auth_path("/auth/login-history"));
    }
}
