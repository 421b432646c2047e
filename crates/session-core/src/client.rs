//! Intercepting API client
//!
//! Every request is described by a re-issuable `ApiRequest` and sent with the
//! access token read from the store at send time. A `401` on anything other
//! than the auth endpoints hands off to the `RefreshCoordinator` and replays
//! the request once; a second `401` is terminal.

use std::sync::Arc;
use std::time::Duration;

use common::Secret;
use reqwest::{Method, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use session_auth::{
    Credentials, LOGIN_PATH, REGISTER_PATH, TokenPair, TokenStore, User, decode_claims,
    error_message, is_auth_path,
};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::refresh::RefreshCoordinator;

/// A request that can be issued more than once.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    method: Method,
    path: String,
    query: Vec<(String, String)>,
    body: Option<serde_json::Value>,
    headers: Vec<(String, String)>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
            headers: Vec::new(),
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }

    /// Add the query pair only when `value` is present.
    pub fn query_opt(self, key: impl Into<String>, value: Option<impl ToString>) -> Self {
        match value {
            Some(v) => self.query(key, v),
            None => self,
        }
    }

    pub fn json<T: Serialize + ?Sized>(mut self, body: &T) -> Result<Self> {
        let value = serde_json::to_value(body)
            .map_err(|e| Error::Decode(format!("serializing request body: {e}")))?;
        self.body = Some(value);
        Ok(self)
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    coordinator: RefreshCoordinator,
}

impl ApiClient {
    /// Build a client for `base_url` (e.g. `http://localhost:8080/api/v1`).
    ///
    /// The HTTP client shares the store's cookie jar so the `accessToken`
    /// cookie rides along with every request.
    pub fn new(
        base_url: impl Into<String>,
        coordinator: RefreshCoordinator,
        timeout: Duration,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .cookie_provider(coordinator.store().cookie_jar())
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Http(format!("building HTTP client: {e}")))?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            coordinator,
        })
    }

    pub fn store(&self) -> &Arc<TokenStore> {
        self.coordinator.store()
    }

    pub fn coordinator(&self) -> &RefreshCoordinator {
        &self.coordinator
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Send a request, refreshing the session and replaying once on `401`.
    ///
    /// Returns the raw response for any status other than a `401` that the
    /// refresh protocol handles. Auth endpoint responses are returned as-is,
    /// `401` included.
    pub async fn send(&self, request: &ApiRequest) -> Result<reqwest::Response> {
        let exempt = is_auth_path(&request.path);
        let mut retried = false;

        loop {
            let (response, sent) = self.issue(request).await?;
            if response.status() != StatusCode::UNAUTHORIZED || exempt {
                return Ok(response);
            }
            if retried {
                warn!(
                    method = %request.method,
                    path = %request.path,
                    "request still unauthorized after refresh"
                );
                return Err(Error::Unauthorized);
            }
            retried = true;

            // A refresh that settled while this request was in flight already
            // replaced the token the 401 answers; replay with the new one.
            let current = self.store().access_token().await;
            let superseded = match (&sent, &current) {
                (Some(sent), Some(current)) => sent.expose() != current.expose(),
                _ => false,
            };
            if superseded {
                debug!(method = %request.method, path = %request.path, "401 for a superseded token, replaying");
                continue;
            }

            debug!(method = %request.method, path = %request.path, "401 received, refreshing session");
            self.coordinator.refresh().await?;
        }
    }

    /// Send a request and decode a successful JSON body.
    pub async fn json<T: DeserializeOwned>(&self, request: &ApiRequest) -> Result<T> {
        let response = check_status(self.send(request).await?).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| Error::Decode(format!("{} {}: {e}", request.method, request.path)))
    }

    /// Send a request and only check for a successful status.
    pub async fn empty(&self, request: &ApiRequest) -> Result<()> {
        check_status(self.send(request).await?).await?;
        Ok(())
    }

    /// `POST /auth/login`. On success the session is stored and its user
    /// returned.
    pub async fn login(&self, credentials: &Credentials) -> Result<User> {
        let request = ApiRequest::post(LOGIN_PATH).json(credentials)?;
        let pair: TokenPair = self.json(&request).await?;
        let user = decode_claims(pair.access_token.expose())?.user();
        self.store()
            .set_session(user.clone(), pair.access_token, pair.refresh_token)
            .await?;
        info!(user_id = %user.id, "logged in");
        Ok(user)
    }

    /// `POST /auth/register`. Returns the backend's confirmation message.
    /// An existing account surfaces as `session_auth::Error::Conflict`.
    pub async fn register(&self, credentials: &Credentials) -> Result<String> {
        let request = ApiRequest::post(REGISTER_PATH).json(credentials)?;
        let response = self.send(&request).await?;
        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if status == StatusCode::CONFLICT {
            return Err(session_auth::Error::Conflict(error_message(&body)).into());
        }
        if !status.is_success() {
            return Err(Error::Status {
                status: status.as_u16(),
                message: error_message(&body),
            });
        }
        info!(email = %credentials.email, "account registered");
        Ok(error_message(&body))
    }

    /// Explicit logout. Same cleanup as a failed refresh.
    pub async fn logout(&self) {
        self.coordinator.force_logout().await;
    }

    /// Issue once. Also returns the bearer token the request carried.
    async fn issue(
        &self,
        request: &ApiRequest,
    ) -> Result<(reqwest::Response, Option<Secret<String>>)> {
        let url = format!("{}{}", self.base_url, request.path);
        let mut builder = self.http.request(request.method.clone(), &url);

        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        let token = self.store().access_token().await;
        if let Some(token) = &token {
            builder = builder.bearer_auth(token.expose());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| Error::Http(format!("{} {} failed: {e}", request.method, request.path)))?;
        Ok((response, token))
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| String::from("<no body>"));
    Err(Error::Status {
        status: status.as_u16(),
        message: error_message(&body),
    })
}
