//! Typed auth event bus
//!
//! Replaces ambient "token refreshed" / "logged out" notifications with a
//! broadcast channel. Every listener gets every event published after it
//! subscribed; a slow listener that lags only loses old events.

use tokio::sync::broadcast;
use tracing::debug;

use crate::token::TokenPair;

const CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone)]
pub enum AuthEvent {
    /// A refresh succeeded and the store now holds this pair.
    TokenRefreshed(TokenPair),
    /// The session was cleared (refresh failure, idle timeout or explicit logout).
    Logout,
}

impl AuthEvent {
    fn name(&self) -> &'static str {
        match self {
            AuthEvent::TokenRefreshed(_) => "token_refreshed",
            AuthEvent::Logout => "logout",
        }
    }
}

/// Cloneable handle to the auth event channel.
#[derive(Debug, Clone)]
pub struct AuthEvents {
    tx: broadcast::Sender<AuthEvent>,
}

impl AuthEvents {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.tx.subscribe()
    }

    /// Publish an event. Returns how many listeners received it; zero
    /// listeners is not an error.
    pub fn publish(&self, event: AuthEvent) -> usize {
        let name = event.name();
        let delivered = self.tx.send(event).unwrap_or(0);
        debug!(event = name, listeners = delivered, "auth event published");
        delivered
    }
}

impl Default for AuthEvents {
    fn default() -> Self {
        Self::new()
    }
}
