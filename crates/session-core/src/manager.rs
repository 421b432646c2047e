//! Session wiring
//!
//! Builds the store, event bus, refresh coordinator and API client from a
//! `SessionConfig` in the one order that works: the store is restored before
//! anything can read it, and the coordinator gets its own plain HTTP client.

use std::sync::Arc;

use session_auth::{AuthEvents, RestoreOutcome, TokenStore};
use tokio::task::JoinHandle;
use tracing::info;

use crate::client::ApiClient;
use crate::config::SessionConfig;
use crate::error::{Error, Result};
use crate::idle::{IdleConfig, IdleController, IdleHandle};
use crate::refresh::RefreshCoordinator;

pub struct SessionManager {
    client: Arc<ApiClient>,
    events: AuthEvents,
    idle: IdleConfig,
}

impl SessionManager {
    /// Restore any persisted session and assemble the client stack.
    pub async fn start(config: &SessionConfig) -> Result<(Self, RestoreOutcome)> {
        let cookie_url = reqwest::Url::parse(&config.api.url).map_err(|e| {
            common::Error::Config(format!("api.url is not a valid URL ({}): {e}", config.api.url))
        })?;
        let store = Arc::new(
            TokenStore::new(config.storage.path.clone(), cookie_url)
                .with_cookie_max_age(config.storage.cookie_max_age_secs),
        );
        let outcome = store.restore_from_storage().await;

        let events = AuthEvents::new();
        let refresh_http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| Error::Http(format!("building refresh client: {e}")))?;
        let coordinator =
            RefreshCoordinator::new(store, events.clone(), refresh_http, config.api.url.clone());
        let client = ApiClient::new(config.api.url.clone(), coordinator, config.request_timeout())?;

        info!(api_url = %config.api.url, restore = ?outcome, "session client ready");
        Ok((
            Self {
                client: Arc::new(client),
                events,
                idle: config.idle_config(),
            },
            outcome,
        ))
    }

    pub fn client(&self) -> &Arc<ApiClient> {
        &self.client
    }

    pub fn events(&self) -> &AuthEvents {
        &self.events
    }

    pub fn store(&self) -> &Arc<TokenStore> {
        self.client.store()
    }

    /// Start idle tracking for the current session state.
    pub async fn spawn_idle(&self) -> (IdleHandle, JoinHandle<()>) {
        let authenticated = self.store().is_authenticated().await;
        IdleController::spawn(
            self.idle.clone(),
            self.client.coordinator().clone(),
            &self.events,
            authenticated,
        )
    }
}
