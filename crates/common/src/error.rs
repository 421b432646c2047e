//! Configuration error types

use thiserror::Error;

/// Errors raised while loading or validating configuration files.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid URL for {field}: {value} (must start with http:// or https://)")]
    InvalidUrl { field: &'static str, value: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Result alias using common Error
pub type Result<T> = std::result::Result<T, Error>;

/// Reject URLs without an http(s) scheme.
///
/// Both the session client and the gateway take base URLs from config and
/// from `API_URL`; a bare host would otherwise surface much later as an
/// opaque request builder error.
pub fn require_http_url(field: &'static str, value: &str) -> Result<()> {
    if value.starts_with("http://") || value.starts_with("https://") {
        Ok(())
    } else {
        Err(Error::InvalidUrl {
            field,
            value: value.to_owned(),
        })
    }
}
