//! Access token claim decoding
//!
//! The backend issues signed tokens (`header.payload.signature`). The client
//! never verifies the signature; it trusts the issuer and only reads the
//! payload for identity and expiry. Decoding is strict about structure so a
//! corrupt token is caught at restore time instead of on the first request.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::Deserialize;

use crate::constants::DEFAULT_ROLE;
use crate::error::{Error, Result};
use crate::session::User;

/// Payload claims the client cares about.
///
/// Identity claims vary between backend versions: the user id may arrive as
/// `id` or `userId` (string or number), the email as `email` or only as
/// `sub`, the role as `role` or the first of `roles`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Claims {
    #[serde(default)]
    pub sub: Option<String>,
    /// Expiry as unix seconds
    #[serde(default)]
    pub exp: Option<u64>,
    #[serde(default)]
    pub id: Option<serde_json::Value>,
    #[serde(default, rename = "userId")]
    pub user_id: Option<serde_json::Value>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub roles: Vec<String>,
}

impl Claims {
    /// Expiry as unix milliseconds.
    pub fn expires_at_millis(&self) -> Option<u64> {
        self.exp.map(|secs| secs.saturating_mul(1000))
    }

    /// Whether the token is expired at `now_millis`. A token expiring exactly
    /// now counts as expired.
    pub fn is_expired_at(&self, now_millis: u64) -> bool {
        self.expires_at_millis()
            .is_some_and(|expires| expires <= now_millis)
    }

    /// Build the user identity from whichever claims are present.
    pub fn user(&self) -> User {
        let id = self
            .id
            .as_ref()
            .and_then(claim_to_string)
            .or_else(|| self.user_id.as_ref().and_then(claim_to_string))
            .or_else(|| self.sub.clone())
            .unwrap_or_default();
        let email = self
            .email
            .clone()
            .or_else(|| self.sub.clone())
            .unwrap_or_default();
        let role = self
            .role
            .clone()
            .or_else(|| self.roles.first().cloned())
            .unwrap_or_else(|| DEFAULT_ROLE.to_owned());
        User { id, email, role }
    }

    fn has_subject(&self) -> bool {
        self.sub.as_deref().is_some_and(|s| !s.is_empty())
            || self.id.as_ref().and_then(claim_to_string).is_some()
            || self.user_id.as_ref().and_then(claim_to_string).is_some()
    }
}

/// Decode the payload segment of an access token.
///
/// Fails when the token does not have three segments, the payload is not
/// base64url JSON, or the payload lacks an `exp` claim or any subject/user id
/// claim.
pub fn decode(token: &str) -> Result<Claims> {
    let mut segments = token.split('.');
    let (Some(_header), Some(payload), Some(_signature), None) = (
        segments.next(),
        segments.next(),
        segments.next(),
        segments.next(),
    ) else {
        return Err(Error::InvalidToken("expected three dot-separated segments".into()));
    };

    // Some issuers pad the payload; the URL-safe alphabet is otherwise the same
    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| Error::InvalidToken(format!("payload is not base64url: {e}")))?;

    let claims: Claims = serde_json::from_slice(&bytes)
        .map_err(|e| Error::InvalidToken(format!("payload is not a claims object: {e}")))?;

    if claims.exp.is_none() {
        return Err(Error::InvalidToken("missing exp claim".into()));
    }
    if !claims.has_subject() {
        return Err(Error::InvalidToken("missing subject or user id claim".into()));
    }
    Ok(claims)
}

/// Current unix time in milliseconds.
pub fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

fn claim_to_string(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
