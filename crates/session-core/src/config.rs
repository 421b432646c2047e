//! Session client configuration
//!
//! Precedence: env vars > config file > defaults. Every section is optional;
//! an empty file yields a client pointed at the local backend.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use session_auth::{ACCESS_COOKIE_MAX_AGE_SECS, DEFAULT_API_URL};

use crate::idle::IdleConfig;

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SessionConfig {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub idle: IdleSettings,
}

/// Backend API settings
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// Base URL including the `/api/v1` prefix
    #[serde(default = "default_api_url")]
    pub url: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

/// Where the session is persisted
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_storage_path")]
    pub path: PathBuf,
    #[serde(default = "default_cookie_max_age")]
    pub cookie_max_age_secs: u64,
}

/// Idle prompt timing
#[derive(Debug, Clone, Deserialize)]
pub struct IdleSettings {
    #[serde(default = "default_idle_timeout_ms")]
    pub idle_timeout_ms: u64,
    #[serde(default = "default_countdown_secs")]
    pub countdown_secs: u32,
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_owned()
}

fn default_timeout() -> u64 {
    30
}

fn default_storage_path() -> PathBuf {
    PathBuf::from("session.json")
}

fn default_cookie_max_age() -> u64 {
    ACCESS_COOKIE_MAX_AGE_SECS
}

fn default_idle_timeout_ms() -> u64 {
    600_000
}

fn default_countdown_secs() -> u32 {
    60
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            url: default_api_url(),
            timeout_secs: default_timeout(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_storage_path(),
            cookie_max_age_secs: default_cookie_max_age(),
        }
    }
}

impl Default for IdleSettings {
    fn default() -> Self {
        Self {
            idle_timeout_ms: default_idle_timeout_ms(),
            countdown_secs: default_countdown_secs(),
        }
    }
}

impl SessionConfig {
    /// Load configuration from a TOML file, then overlay environment variables.
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Parse, overlay `API_URL`, validate.
    pub fn from_toml(contents: &str) -> common::Result<Self> {
        let mut config: SessionConfig = toml::from_str(contents)?;

        if let Ok(url) = std::env::var("API_URL")
            && !url.trim().is_empty()
        {
            config.api.url = url.trim().to_owned();
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> common::Result<()> {
        common::require_http_url("api.url", &self.api.url)?;

        if self.api.timeout_secs == 0 {
            return Err(common::Error::Config(
                "api.timeout_secs must be greater than 0".into(),
            ));
        }
        if self.idle.idle_timeout_ms == 0 {
            return Err(common::Error::Config(
                "idle.idle_timeout_ms must be greater than 0".into(),
            ));
        }
        if self.idle.countdown_secs == 0 {
            return Err(common::Error::Config(
                "idle.countdown_secs must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("booking-session.toml")
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.api.timeout_secs)
    }

    pub fn idle_config(&self) -> IdleConfig {
        IdleConfig {
            idle_timeout: Duration::from_millis(self.idle.idle_timeout_ms),
            countdown_secs: self.idle.countdown_secs,
            ..IdleConfig::default()
        }
    }
}
