//! Types shared by the session libraries and the booking gateway

mod error;
mod secret;

pub use error::{Error, Result, require_http_url};
pub use secret::Secret;
