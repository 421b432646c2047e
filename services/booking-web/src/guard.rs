//! Server-side route guard
//!
//! Runs before every request reaches the proxy. The guard only checks that a
//! credential is present; the backend validates it. Page routes the user may
//! not see are answered with a `307` instead of being proxied.

use axum::extract::Request;
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use session_auth::ACCESS_TOKEN_COOKIE;
use tracing::debug;

/// Prefixes served without any session check
const ALWAYS_PUBLIC_PREFIXES: &[&str] = &[
    "/_next",
    "/favicon",
    "/api/v1/auth",
    "/api/flights",
    "/api/pricing",
    "/health",
    "/metrics",
];

/// Static assets that bypass the guard regardless of location
const PUBLIC_ASSET_SUFFIXES: &[&str] = &[".png", ".svg"];

/// Pages only meaningful without a session
const PUBLIC_ONLY_PATHS: &[&str] = &["/login", "/register"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteClass {
    AlwaysPublic,
    PublicOnly,
    Protected,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    Allow,
    /// Send to `/login`, remembering where the user was going
    RedirectToLogin { callback_url: String },
    /// Already signed in; leave login/register for home
    RedirectHome,
}

pub fn classify(path: &str) -> RouteClass {
    if ALWAYS_PUBLIC_PREFIXES
        .iter()
        .any(|prefix| path.starts_with(prefix))
        || PUBLIC_ASSET_SUFFIXES
            .iter()
            .any(|suffix| path.ends_with(suffix))
    {
        RouteClass::AlwaysPublic
    } else if PUBLIC_ONLY_PATHS.contains(&path) {
        RouteClass::PublicOnly
    } else {
        RouteClass::Protected
    }
}

pub fn decide(path: &str, authenticated: bool) -> GuardDecision {
    match (classify(path), authenticated) {
        (RouteClass::AlwaysPublic, _) => GuardDecision::Allow,
        (RouteClass::Protected, false) => GuardDecision::RedirectToLogin {
            callback_url: path.to_owned(),
        },
        (RouteClass::PublicOnly, true) => GuardDecision::RedirectHome,
        _ => GuardDecision::Allow,
    }
}

/// A non-empty `accessToken` cookie or a bearer `Authorization` header.
pub fn is_authenticated(headers: &HeaderMap) -> bool {
    let has_cookie = headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .any(|(name, value)| name == ACCESS_TOKEN_COOKIE && !value.trim().is_empty());

    has_cookie
        || headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .is_some_and(|token| !token.trim().is_empty())
}

/// `/login?callbackUrl=<path>` with the path form-encoded.
pub fn login_location(callback_url: &str) -> String {
    let mut location = String::from("/login?callbackUrl=");
    for byte in callback_url.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'*' => {
                location.push(byte as char)
            }
            b' ' => location.push('+'),
            _ => location.push_str(&format!("%{byte:02X}")),
        }
    }
    location
}

impl IntoResponse for GuardDecision {
    fn into_response(self) -> Response {
        let location = match self {
            GuardDecision::Allow => return StatusCode::OK.into_response(),
            GuardDecision::RedirectToLogin { callback_url } => login_location(&callback_url),
            GuardDecision::RedirectHome => "/".to_owned(),
        };
        match HeaderValue::from_str(&location) {
            Ok(value) => (
                StatusCode::TEMPORARY_REDIRECT,
                [(header::LOCATION, value)],
            )
                .into_response(),
            Err(_) => StatusCode::BAD_REQUEST.into_response(),
        }
    }
}

/// Middleware: enforce the guard, forwarding allowed requests.
pub async fn enforce(request: Request, next: Next) -> Response {
    let path = request.uri().path().to_owned();
    let decision = decide(&path, is_authenticated(request.headers()));

    match decision {
        GuardDecision::Allow => next.run(request).await,
        redirect => {
            let target = match &redirect {
                GuardDecision::RedirectHome => "home",
                _ => "login",
            };
            debug!(path = %path, target, "route guard redirect");
            crate::metrics::record_guard_redirect(target);
            redirect.into_response()
        }
    }
}
