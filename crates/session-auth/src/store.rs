//! Persisted session store
//!
//! Single owner of the signed-in session. Every mutation goes to three
//! places under one tokio Mutex: the in-memory `Session`, a JSON file on disk
//! (atomic temp-file + rename, 0600) and the `accessToken` cookie in a jar
//! shared with the HTTP client. The gateway's route guard only ever sees the
//! cookie, so the file and cookie must never disagree about whether a session
//! exists.
//!
//! The file holds exactly three string keys: `accessToken`, `refreshToken`
//! and `user` (itself a serialized JSON object).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use common::Secret;
use reqwest::Url;
use reqwest::cookie::Jar;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::claims::{self, now_millis};
use crate::constants::{
    ACCESS_COOKIE_MAX_AGE_SECS, ACCESS_TOKEN_COOKIE, ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY, USER_KEY,
};
use crate::error::{Error, Result};
use crate::session::{Session, User};
use crate::token::TokenPair;

/// What `restore_from_storage` found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestoreOutcome {
    /// Valid, unexpired session restored.
    Restored,
    /// Access token expired but a refresh token exists; restored optimistically.
    /// The first `401` will trigger a refresh.
    RestoredExpired,
    /// Nothing persisted.
    Empty,
    /// Persisted data was unusable and has been removed.
    Wiped { reason: String },
}

pub struct TokenStore {
    path: PathBuf,
    cookies: Arc<Jar>,
    cookie_url: Url,
    cookie_max_age: u64,
    state: Mutex<Option<Session>>,
}

impl TokenStore {
    /// Create an empty store persisting to `path`. The cookie is scoped to
    /// `cookie_url` (normally the API base URL).
    pub fn new(path: PathBuf, cookie_url: Url) -> Self {
        Self {
            path,
            cookies: Arc::new(Jar::default()),
            cookie_url,
            cookie_max_age: ACCESS_COOKIE_MAX_AGE_SECS,
            state: Mutex::new(None),
        }
    }

    pub fn with_cookie_max_age(mut self, secs: u64) -> Self {
        self.cookie_max_age = secs;
        self
    }

    /// Cookie jar mirrored by this store. Hand it to the HTTP client's
    /// `cookie_provider` so every request carries the current cookie.
    pub fn cookie_jar(&self) -> Arc<Jar> {
        self.cookies.clone()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the persisted session, if any.
    ///
    /// Never fails: anything unreadable is wiped and reported as
    /// `RestoreOutcome::Wiped`, leaving the store logged out.
    pub async fn restore_from_storage(&self) -> RestoreOutcome {
        let mut state = self.state.lock().await;

        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no persisted session");
                *state = None;
                return RestoreOutcome::Empty;
            }
            Err(e) => {
                return self
                    .wipe(&mut state, format!("reading session file: {e}"))
                    .await;
            }
        };

        let (session, expired) = match parse_persisted(&contents) {
            Ok(parsed) => parsed,
            Err(e) => return self.wipe(&mut state, e.to_string()).await,
        };

        let outcome = if !expired {
            RestoreOutcome::Restored
        } else if session.refresh_token.is_some() {
            RestoreOutcome::RestoredExpired
        } else {
            return self
                .wipe(&mut state, "access token expired and no refresh token".into())
                .await;
        };

        self.set_cookie(&session.access_token);
        info!(
            user_id = %session.user.id,
            expired,
            "restored persisted session"
        );
        *state = Some(session);
        outcome
    }

    /// Store a fresh session (login) and persist it.
    pub async fn set_session(
        &self,
        user: User,
        access_token: Secret<String>,
        refresh_token: Secret<String>,
    ) -> Result<()> {
        let session = Session {
            user,
            access_token,
            refresh_token: Some(refresh_token),
        };
        let mut state = self.state.lock().await;
        self.persist(&session).await?;
        self.set_cookie(&session.access_token);
        info!(user_id = %session.user.id, "session started");
        *state = Some(session);
        Ok(())
    }

    /// Replace the token pair after a refresh. The user is re-derived from
    /// the new access token's claims.
    pub async fn update_tokens(&self, pair: &TokenPair) -> Result<User> {
        let user = claims::decode(pair.access_token.expose())?.user();
        let session = Session {
            user: user.clone(),
            access_token: pair.access_token.clone(),
            refresh_token: Some(pair.refresh_token.clone()),
        };
        let mut state = self.state.lock().await;
        self.persist(&session).await?;
        self.set_cookie(&session.access_token);
        debug!(user_id = %user.id, "session tokens updated");
        *state = Some(session);
        Ok(user)
    }

    /// Remove every trace of the session. Safe to call when already cleared.
    pub async fn clear_session(&self) {
        let mut state = self.state.lock().await;
        let had_session = state.take().is_some();
        self.remove_persisted().await;
        self.expire_cookie();
        if had_session {
            info!("session cleared");
        }
    }

    pub async fn session(&self) -> Option<Session> {
        self.state.lock().await.clone()
    }

    pub async fn access_token(&self) -> Option<Secret<String>> {
        self.state
            .lock()
            .await
            .as_ref()
            .map(|s| s.access_token.clone())
    }

    pub async fn refresh_token(&self) -> Option<Secret<String>> {
        self.state
            .lock()
            .await
            .as_ref()
            .and_then(|s| s.refresh_token.clone())
    }

    pub async fn user(&self) -> Option<User> {
        self.state.lock().await.as_ref().map(|s| s.user.clone())
    }

    pub async fn is_authenticated(&self) -> bool {
        self.state.lock().await.is_some()
    }

    /// Access token expiry in unix milliseconds, decoded at call time.
    pub async fn expires_at_millis(&self) -> Option<u64> {
        self.state
            .lock()
            .await
            .as_ref()
            .and_then(Session::expires_at_millis)
    }

    async fn wipe(&self, state: &mut Option<Session>, reason: String) -> RestoreOutcome {
        warn!(path = %self.path.display(), reason = %reason, "discarding persisted session");
        *state = None;
        self.remove_persisted().await;
        self.expire_cookie();
        RestoreOutcome::Wiped { reason }
    }

    async fn persist(&self, session: &Session) -> Result<()> {
        let user = serde_json::to_string(&session.user)
            .map_err(|e| Error::Parse(format!("serializing user: {e}")))?;

        let mut data = BTreeMap::new();
        data.insert(ACCESS_TOKEN_KEY, session.access_token.expose().clone());
        if let Some(refresh) = &session.refresh_token {
            data.insert(REFRESH_TOKEN_KEY, refresh.expose().clone());
        }
        data.insert(USER_KEY, user);

        write_atomic(&self.path, &data).await
    }

    async fn remove_persisted(&self) {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => debug!(path = %self.path.display(), "removed session file"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), error = %e, "failed to remove session file"),
        }
    }

    fn set_cookie(&self, access_token: &Secret<String>) {
        let cookie = format!(
            "{ACCESS_TOKEN_COOKIE}={}; Path=/; Max-Age={}; SameSite=Lax",
            access_token.expose(),
            self.cookie_max_age
        );
        self.cookies.add_cookie_str(&cookie, &self.cookie_url);
    }

    fn expire_cookie(&self) {
        let cookie = format!("{ACCESS_TOKEN_COOKIE}=; Path=/; Max-Age=0; SameSite=Lax");
        self.cookies.add_cookie_str(&cookie, &self.cookie_url);
    }
}

/// Parse the persisted layout into a session plus whether its access token is
/// already expired.
fn parse_persisted(contents: &str) -> Result<(Session, bool)> {
    let mut data: BTreeMap<String, String> = serde_json::from_str(contents)
        .map_err(|e| Error::Parse(format!("session file is not a string map: {e}")))?;

    let access = data
        .remove(ACCESS_TOKEN_KEY)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| Error::Parse("session file has no access token".into()))?;
    let user_json = data
        .remove(USER_KEY)
        .ok_or_else(|| Error::Parse("session file has no user".into()))?;
    let user: User = serde_json::from_str(&user_json)
        .map_err(|e| Error::Parse(format!("persisted user is malformed: {e}")))?;
    let refresh = data
        .remove(REFRESH_TOKEN_KEY)
        .filter(|t| !t.is_empty())
        .map(Secret::new);

    let claims = claims::decode(&access)?;
    let expired = claims.is_expired_at(now_millis());

    Ok((
        Session {
            user,
            access_token: Secret::new(access),
            refresh_token: refresh,
        },
        expired,
    ))
}

/// Temp file next to `path`, named after it so stores sharing a directory
/// never collide.
fn temp_path_for(path: &Path) -> Result<PathBuf> {
    let name = path
        .file_name()
        .ok_or_else(|| Error::Storage("session path has no file name".into()))?;
    Ok(path.with_file_name(format!(
        ".{}.tmp.{}",
        name.to_string_lossy(),
        std::process::id()
    )))
}

/// Write the session file atomically.
///
/// Writes a temp file in the same directory, then renames it over the
/// target. Permissions are 0600 since the file holds bearer tokens.
async fn write_atomic(path: &Path, data: &BTreeMap<&str, String>) -> Result<()> {
    let json = serde_json::to_string_pretty(data)
        .map_err(|e| Error::Parse(format!("serializing session: {e}")))?;

    let dir = path
        .parent()
        .ok_or_else(|| Error::Storage("session path has no parent directory".into()))?;
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| Error::Storage(format!("creating session directory: {e}")))?;

    let tmp_path = temp_path_for(path)?;

    tokio::fs::write(&tmp_path, json.as_bytes())
        .await
        .map_err(|e| Error::Storage(format!("writing temp session file: {e}")))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(&tmp_path, perms)
            .await
            .map_err(|e| Error::Storage(format!("setting session file permissions: {e}")))?;
    }

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| Error::Storage(format!("renaming temp session file: {e}")))?;

    debug!(path = %path.display(), "persisted session");
    Ok(())
}
