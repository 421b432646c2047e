//! Session identity types

use common::Secret;
use serde::{Deserialize, Deserializer, Serialize};

use crate::claims;

/// The signed-in user as shown by the client.
///
/// Persisted as a JSON string under the `user` key. Older clients wrote the
/// id as a number, so deserialization accepts either.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub email: String,
    pub role: String,
}

/// An authenticated session. Owned by `TokenStore`; callers get clones.
#[derive(Debug, Clone)]
pub struct Session {
    pub user: User,
    pub access_token: Secret<String>,
    pub refresh_token: Option<Secret<String>>,
}

impl Session {
    /// Expiry of the access token in unix milliseconds, decoded on every call.
    pub fn expires_at_millis(&self) -> Option<u64> {
        claims::decode(self.access_token.expose())
            .ok()
            .and_then(|c| c.expires_at_millis())
    }
}

fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Text(String),
        Number(serde_json::Number),
    }

    Ok(match Id::deserialize(deserializer)? {
        Id::Text(s) => s,
        Id::Number(n) => n.to_string(),
    })
}
