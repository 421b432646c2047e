//! Gateway configuration
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! `API_URL` overrides `upstream.api_url` so the gateway and the session
//! client can share one environment.

use serde::Deserialize;
use session_auth::DEFAULT_API_URL;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
}

/// Listener settings
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

/// Where allowed requests are forwarded
#[derive(Debug, Deserialize)]
pub struct UpstreamConfig {
    /// Booking API base, including the `/api/v1` prefix. `/api/*` is
    /// rewritten onto it.
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Page server for everything that is not `/api/*`
    #[serde(default = "default_pages_url")]
    pub pages_url: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_owned()
}

fn default_pages_url() -> String {
    "http://127.0.0.1:3000".to_owned()
}

fn default_timeout() -> u64 {
    30
}

fn default_max_connections() -> usize {
    1000
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            pages_url: default_pages_url(),
            timeout_secs: default_timeout(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;

        if let Ok(url) = std::env::var("API_URL")
            && !url.trim().is_empty()
        {
            config.upstream.api_url = url.trim().to_owned();
        }

        common::require_http_url("upstream.api_url", &config.upstream.api_url)?;
        common::require_http_url("upstream.pages_url", &config.upstream.pages_url)?;

        if config.upstream.timeout_secs == 0 {
            return Err(common::Error::Config(
                "timeout_secs must be greater than 0".into(),
            ));
        }
        if config.server.max_connections == 0 {
            return Err(common::Error::Config(
                "max_connections must be greater than 0".into(),
            ));
        }

        Ok(config)
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("booking-web.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Serializes tests that touch process environment.
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    /// SAFETY: Callers must hold ENV_MUTEX to prevent concurrent env mutation.
    unsafe fn set_env(key: &str, val: &str) {
        unsafe { std::env::set_var(key, val) };
    }

    unsafe fn remove_env(key: &str) {
        unsafe { std::env::remove_var(key) };
    }

    fn write(dir: &tempfile::TempDir, contents: &str) -> PathBuf {
        let path = dir.path().join("booking-web.toml");
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn minimal_config_uses_defaults() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { remove_env("API_URL") };
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "[server]\nlisten_addr = \"127.0.0.1:8088\"\n");

        let config = Config::load(&path).unwrap();
        assert_eq!(config.server.listen_addr.port(), 8088);
        assert_eq!(config.server.max_connections, 1000);
        assert_eq!(config.upstream.api_url, DEFAULT_API_URL);
        assert_eq!(config.upstream.pages_url, "http://127.0.0.1:3000");
        assert_eq!(config.upstream.timeout_secs, 30);
    }

    #[test]
    fn api_url_env_overrides_file() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            &dir,
            r#"
[server]
listen_addr = "0.0.0.0:80"

[upstream]
api_url = "http://backend:8080/api/v1"
"#,
        );

        unsafe { set_env("API_URL", "https://api.example.com/api/v1") };
        let config = Config::load(&path);
        unsafe { remove_env("API_URL") };

        assert_eq!(
            config.unwrap().upstream.api_url,
            "https://api.example.com/api/v1"
        );
    }

    #[test]
    fn rejects_bad_urls_and_zero_limits() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { remove_env("API_URL") };
        let dir = tempfile::tempdir().unwrap();

        let path = write(
            &dir,
            "[server]\nlisten_addr = \"127.0.0.1:1\"\n[upstream]\npages_url = \"frontend:3000\"\n",
        );
        let err = Config::load(&path).unwrap_err();
        assert!(err.to_string().contains("upstream.pages_url"), "got: {err}");

        let path = write(
            &dir,
            "[server]\nlisten_addr = \"127.0.0.1:1\"\nmax_connections = 0\n",
        );
        assert!(Config::load(&path).is_err());

        let path = write(
            &dir,
            "[server]\nlisten_addr = \"127.0.0.1:1\"\n[upstream]\ntimeout_secs = 0\n",
        );
        assert!(Config::load(&path).is_err());
    }

    #[test]
    fn missing_server_section_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "[upstream]\ntimeout_secs = 5\n");
        assert!(Config::load(&path).is_err());
        assert!(Config::load(Path::new("/nonexistent/booking-web.toml")).is_err());
    }

    #[test]
    fn resolve_path_prefers_cli() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { set_env("CONFIG_PATH", "/etc/booking-web/env.toml") };
        assert_eq!(
            Config::resolve_path(Some("/tmp/cli.toml")),
            PathBuf::from("/tmp/cli.toml")
        );
        assert_eq!(
            Config::resolve_path(None),
            PathBuf::from("/etc/booking-web/env.toml")
        );
        unsafe { remove_env("CONFIG_PATH") };
        assert_eq!(Config::resolve_path(None), PathBuf::from("booking-web.toml"));
    }
}
