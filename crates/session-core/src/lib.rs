//! Session client core for the booking platform
//!
//! Keeps the signed-in user signed in for exactly as long as they should be.
//! Built on `session-auth` (token store, claims, refresh call) and adds the
//! policy around it: retrying `401`s through a single-flight refresh, and
//! logging out users who walked away.
//!
//! Request lifecycle:
//! 1. `ApiClient::send()` attaches the current bearer token from the store
//! 2. `401` on a non-auth path → `RefreshCoordinator::refresh()`
//! 3. First caller starts the refresh; concurrent callers queue behind it
//! 4. Success → store updated, queue resumed in order, request replayed once
//! 5. Failure → store cleared, `Logout` broadcast, every queued caller rejected
//!
//! Idle lifecycle:
//! 1. Activity rearms the idle timer (default 10 min)
//! 2. Timer fires → countdown prompt (default 60 s)
//! 3. "I'm here" → refresh; success returns to `Active`
//! 4. Countdown reaches zero, refresh fails or logout → `LoggedOut`

pub mod client;
pub mod config;
pub mod error;
pub mod idle;
pub mod manager;
pub mod refresh;

pub use client::{ApiClient, ApiRequest};
pub use config::SessionConfig;
pub use error::{Error, RefreshError, Result};
pub use idle::{
    ActivityKind, IdleAction, IdleConfig, IdleController, IdleEvent, IdleHandle, IdleState,
    handle_event,
};
pub use manager::SessionManager;
pub use refresh::RefreshCoordinator;
