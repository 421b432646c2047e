//! Session authentication library for the booking client
//!
//! Owns everything about the signed-in user that must outlive a single
//! request: the token pair, the identity decoded from the access token, the
//! persisted copy on disk and the cookie mirror the gateway reads. This crate
//! has no knowledge of retry or idle policy; those live in `session-core`.
//!
//! Session flow:
//! 1. Login response arrives → `claims::decode()` yields the `User`
//! 2. `TokenStore::set_session()` persists tokens + user and sets the cookie
//! 3. A `401` elsewhere → `token::refresh_token()` trades the refresh token
//! 4. `TokenStore::update_tokens()` writes the new pair through the same mirror
//! 5. Unrecoverable failure or logout → `TokenStore::clear_session()`
//! 6. `AuthEvents` broadcasts `TokenRefreshed` / `Logout` to listeners

pub mod claims;
pub mod constants;
pub mod error;
pub mod events;
pub mod session;
pub mod store;
pub mod token;

pub use claims::{Claims, decode as decode_claims, now_millis};
pub use constants::*;
pub use error::{Error, Result};
pub use events::{AuthEvent, AuthEvents};
pub use session::{Session, User};
pub use store::{RestoreOutcome, TokenStore};
pub use token::{Credentials, TokenPair, error_message, refresh_token};
