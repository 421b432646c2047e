//! Auth endpoint wire types and the token refresh call
//!
//! Login and register go through the intercepted client in `session-core`
//! (they are exempt from retry by path). Refresh is issued here with a plain
//! `reqwest::Client` so it can never recurse into the refresh protocol.

use common::Secret;
use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use tracing::debug;

use crate::constants::{REFRESH_PATH, REFRESH_TOKEN_HEADER};
use crate::error::{Error, Result};

/// Access/refresh token pair as returned by login and refresh.
///
/// Wire shape is `{"accessToken": "...", "refreshToken": "..."}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(from = "TokenPairWire")]
pub struct TokenPair {
    pub access_token: Secret<String>,
    pub refresh_token: Secret<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenPairWire {
    access_token: String,
    refresh_token: String,
}

impl From<TokenPairWire> for TokenPair {
    fn from(wire: TokenPairWire) -> Self {
        Self {
            access_token: Secret::new(wire.access_token),
            refresh_token: Secret::new(wire.refresh_token),
        }
    }
}

/// Body of `POST /auth/login` and `POST /auth/register`.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub email: String,
    pub password: Secret<String>,
}

impl Credentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: Secret::new(password.into()),
        }
    }
}

impl Serialize for Credentials {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut body = serializer.serialize_struct("Credentials", 2)?;
        body.serialize_field("email", &self.email)?;
        body.serialize_field("password", self.password.expose())?;
        body.end()
    }
}

/// Human-readable message from an error response body.
///
/// The backend answers either with JSON carrying `message` (or `error`) or
/// with plain text, depending on which layer rejected the request.
pub fn error_message(body: &str) -> String {
    if let Ok(serde_json::Value::Object(map)) = serde_json::from_str::<serde_json::Value>(body) {
        for key in ["message", "error"] {
            if let Some(serde_json::Value::String(msg)) = map.get(key)
                && !msg.is_empty()
            {
                return msg.clone();
            }
        }
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        String::from("<no body>")
    } else {
        trimmed.to_owned()
    }
}

/// Trade a refresh token for a new token pair.
///
/// `GET {api_url}/auth/refresh` with the refresh token in the
/// `refreshTokenAuth` header. Any non-2xx status is a rejection; the caller
/// decides whether that ends the session.
pub async fn refresh_token(
    client: &reqwest::Client,
    api_url: &str,
    refresh: &Secret<String>,
) -> Result<TokenPair> {
    let url = format!("{}{REFRESH_PATH}", api_url.trim_end_matches('/'));
    debug!(url = %url, "requesting token refresh");

    let response = client
        .get(&url)
        .header(REFRESH_TOKEN_HEADER, refresh.expose().as_str())
        .send()
        .await
        .map_err(|e| Error::Http(format!("token refresh request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<no body>"));
        return Err(Error::Rejected {
            status: status.as_u16(),
            message: error_message(&body),
        });
    }

    response
        .json::<TokenPair>()
        .await
        .map_err(|e| Error::InvalidToken(format!("invalid refresh response: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Router;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::get;

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        format!("http://{addr}/api/v1")
    }

    #[test]
    fn token_pair_deserializes_camel_case() {
        let json = r#"{"accessToken":"at_abc","refreshToken":"rt_def"}"#;
        let pair: TokenPair = serde_json::from_str(json).unwrap();
        assert_eq!(pair.access_token.expose(), "at_abc");
        assert_eq!(pair.refresh_token.expose(), "rt_def");
        assert_eq!(format!("{pair:?}").matches("[REDACTED]").count(), 2);
    }

    #[test]
    fn token_pair_requires_both_tokens() {
        let json = r#"{"accessToken":"at_abc"}"#;
        assert!(serde_json::from_str::<TokenPair>(json).is_err());
    }

    #[test]
    fn credentials_serialize_password_in_body_only() {
        let creds = Credentials::new("a@example.com", "hunter2");
        let body = serde_json::to_value(&creds).unwrap();
        assert_eq!(body["email"], "a@example.com");
        assert_eq!(body["password"], "hunter2");
        assert!(!format!("{creds:?}").contains("hunter2"));
    }

    #[test]
    fn error_message_prefers_json_message() {
        assert_eq!(
            error_message(r#"{"message":"Email already registered","status":409}"#),
            "Email already registered"
        );
        assert_eq!(error_message(r#"{"error":"Bad Request"}"#), "Bad Request");
        assert_eq!(error_message("  plain text failure \n"), "plain text failure");
        assert_eq!(error_message(""), "<no body>");
    }

    #[tokio::test]
    async fn refresh_sends_header_and_parses_pair() {
        let app = Router::new().route(
            "/api/v1/auth/refresh",
            get(|headers: HeaderMap| async move {
                let rt = headers
                    .get(REFRESH_TOKEN_HEADER)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default()
                    .to_owned();
                axum::Json(serde_json::json!({
                    "accessToken": format!("at_for_{rt}"),
                    "refreshToken": "rt_next",
                }))
            }),
        );
        let api_url = serve(app).await;

        let pair = refresh_token(&reqwest::Client::new(), &api_url, &Secret::from("rt_1"))
            .await
            .unwrap();
        assert_eq!(pair.access_token.expose(), "at_for_rt_1");
        assert_eq!(pair.refresh_token.expose(), "rt_next");
    }

    #[tokio::test]
    async fn refresh_non_2xx_is_rejected_with_status() {
        let app = Router::new().route(
            "/api/v1/auth/refresh",
            get(|| async { (StatusCode::UNAUTHORIZED, r#"{"message":"Refresh token expired"}"#) }),
        );
        let api_url = serve(app).await;

        let err = refresh_token(&reqwest::Client::new(), &api_url, &Secret::from("rt_old"))
            .await
            .unwrap_err();
        match err {
            Error::Rejected { status, message } => {
                assert_eq!(status, 401);
                assert_eq!(message, "Refresh token expired");
            }
            other => panic!("expected Rejected, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn refresh_malformed_body_is_invalid_token() {
        let app = Router::new().route("/api/v1/auth/refresh", get(|| async { "not json" }));
        let api_url = serve(app).await;

        let err = refresh_token(&reqwest::Client::new(), &api_url, &Secret::from("rt"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidToken(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn refresh_connection_failure_is_http_error() {
        // Bind then drop to get a port nothing listens on
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = refresh_token(
            &reqwest::Client::new(),
            &format!("http://{addr}/api/v1"),
            &Secret::from("rt"),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::Http(_)), "got {err:?}");
    }
}
