//! Configuration module for HubLights.
//!
//! Loads configuration from environment variables with sensible defaults.

use std::env;
use std::time::Duration;

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// HTTP port for the JSON API (default: 8080)
    pub http_port: u16,
    /// Path to the SQLite database holding storage slots (default: "hublights.db")
    pub db_path: String,
    /// Base URL that check-suite URLs are built from
    pub api_base: String,
    /// Per-request timeout for check-suite fetches
    pub request_timeout: Duration,
    /// Optional bearer token sent with every fetch
    pub github_token: Option<String>,
    /// Quiet period after a configuration change before it is persisted
    pub persist_debounce: Duration,
    /// Name of the storage slot holding the configuration set
    pub storage_key: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_port: 8080,
            db_path: "hublights.db".to_string(),
            api_base: crate::probe::DEFAULT_API_BASE.to_string(),
            request_timeout: Duration::from_secs(10),
            github_token: None,
            persist_debounce: Duration::from_millis(1000),
            storage_key: "model".to_string(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `HUBLIGHTS_HTTP_PORT`: HTTP port (default: 8080)
    /// - `HUBLIGHTS_DB_PATH`: Database file path (default: "hublights.db")
    /// - `HUBLIGHTS_API_BASE`: API base URL (default: "https://api.github.com")
    /// - `HUBLIGHTS_REQUEST_TIMEOUT_SECS`: fetch timeout in seconds (default: 10)
    /// - `HUBLIGHTS_GITHUB_TOKEN`: bearer token (default: unset)
    /// - `HUBLIGHTS_PERSIST_DEBOUNCE_MS`: persist debounce in milliseconds (default: 1000)
    /// - `HUBLIGHTS_STORAGE_KEY`: storage slot name (default: "model")
    pub fn load() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();

        if let Some(port) = lookup("HUBLIGHTS_HTTP_PORT").and_then(|s| s.parse().ok()) {
            cfg.http_port = port;
        }

        if let Some(db_path) = lookup("HUBLIGHTS_DB_PATH") {
            cfg.db_path = db_path;
        }

        if let Some(api_base) = lookup("HUBLIGHTS_API_BASE") {
            cfg.api_base = api_base;
        }

        if let Some(secs) = lookup("HUBLIGHTS_REQUEST_TIMEOUT_SECS")
            .and_then(|s| s.parse::<f64>().ok())
            .filter(|secs| *secs > 0.0 && secs.is_finite())
        {
            cfg.request_timeout = Duration::from_secs_f64(secs);
        }

        cfg.github_token = lookup("HUBLIGHTS_GITHUB_TOKEN").filter(|t| !t.is_empty());

        if let Some(ms) = lookup("HUBLIGHTS_PERSIST_DEBOUNCE_MS").and_then(|s| s.parse().ok()) {
            cfg.persist_debounce = Duration::from_millis(ms);
        }

        if let Some(key) = lookup("HUBLIGHTS_STORAGE_KEY").filter(|k| !k.is_empty()) {
            cfg.storage_key = key;
        }

        cfg
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.http_port, 8080);
        assert_eq!(cfg.db_path, "hublights.db");
        assert_eq!(cfg.api_base, "https://api.github.com");
        assert_eq!(cfg.storage_key, "model");
        assert!(cfg.github_token.is_none());
    }

    #[test]
    fn test_overrides_and_bad_values() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("HUBLIGHTS_HTTP_PORT", "not-a-port"),
            ("HUBLIGHTS_API_BASE", "http://localhost:9000"),
            ("HUBLIGHTS_REQUEST_TIMEOUT_SECS", "2.5"),
            ("HUBLIGHTS_GITHUB_TOKEN", ""),
            ("HUBLIGHTS_PERSIST_DEBOUNCE_MS", "250"),
        ]);
        let cfg = ServerConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string()));

        assert_eq!(cfg.http_port, 8080);
        assert_eq!(cfg.api_base, "http://localhost:9000");
        assert_eq!(cfg.request_timeout, Duration::from_millis(2500));
        assert!(cfg.github_token.is_none());
        assert_eq!(cfg.persist_debounce, Duration::from_millis(250));
    }
}
