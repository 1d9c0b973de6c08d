//! Configuration management for the sync host.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::service::DEFAULT_RECONCILE_DELAY;

/// Configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server host address
    pub host: String,
    /// Server port
    pub port: u16,
    /// PostgreSQL connection URL; the in-memory store is used without one
    pub database_url: Option<String>,
    /// Directory for the offline cache; kept in memory without one
    pub cache_dir: Option<PathBuf>,
    /// Wait before the background reconciliation fetch after a write
    pub reconcile_delay: Duration,
    /// Report the network as unavailable at startup
    pub start_offline: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            database_url: None,
            cache_dir: None,
            reconcile_delay: DEFAULT_RECONCILE_DELAY,
            start_offline: false,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through `lookup`, which returns a variable's value.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let host = lookup("HOST").unwrap_or(defaults.host);

        let port = match lookup("PORT") {
            Some(port) => port.parse().map_err(|_| ConfigError::InvalidPort(port))?,
            None => defaults.port,
        };

        let database_url = lookup("DATABASE_URL").filter(|url| !url.trim().is_empty());
        let cache_dir = lookup("CACHE_DIR")
            .filter(|dir| !dir.trim().is_empty())
            .map(PathBuf::from);

        let reconcile_delay = match lookup("RECONCILE_DELAY_MS") {
            Some(ms) => Duration::from_millis(
                ms.parse()
                    .map_err(|_| ConfigError::InvalidReconcileDelay(ms))?,
            ),
            None => defaults.reconcile_delay,
        };

        let start_offline = match lookup("START_OFFLINE") {
            Some(flag) => parse_flag(&flag).ok_or(ConfigError::InvalidFlag {
                name: "START_OFFLINE",
                value: flag,
            })?,
            None => defaults.start_offline,
        };

        Ok(Self {
            host,
            port,
            database_url,
            cache_dir,
            reconcile_delay,
            start_offline,
        })
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid PORT value: {0}")]
    InvalidPort(String),

    #[error("Invalid RECONCILE_DELAY_MS value: {0}")]
    InvalidReconcileDelay(String),

    #[error("Invalid {name} value: {value}")]
    InvalidFlag { name: &'static str, value: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults() {
        let config = load(&[]).unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert!(config.database_url.is_none());
        assert!(config.cache_dir.is_none());
        assert_eq!(config.reconcile_delay, Duration::from_millis(500));
        assert!(!config.start_offline);
    }

    #[test]
    fn reads_all_values() {
        let config = load(&[
            ("HOST", "127.0.0.1"),
            ("PORT", "8080"),
            ("DATABASE_URL", "postgres://localhost/bandsync"),
            ("CACHE_DIR", "/tmp/bandsync"),
            ("RECONCILE_DELAY_MS", "50"),
            ("START_OFFLINE", "true"),
        ])
        .unwrap();

        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 8080);
        assert_eq!(config.database_url.as_deref(), Some("postgres://localhost/bandsync"));
        assert_eq!(config.cache_dir, Some(PathBuf::from("/tmp/bandsync")));
        assert_eq!(config.reconcile_delay, Duration::from_millis(50));
        assert!(config.start_offline);
    }

    #[test]
    fn empty_database_url_means_memory() {
        let config = load(&[("DATABASE_URL", "  ")]).unwrap();
        assert!(config.database_url.is_none());
    }

    #[test]
    fn invalid_values() {
        assert!(matches!(load(&[("PORT", "http")]), Err(ConfigError::InvalidPort(_))));
        assert!(matches!(
            load(&[("RECONCILE_DELAY_MS", "-1")]),
            Err(ConfigError::InvalidReconcileDelay(_))
        ));
        assert!(matches!(
            load(&[("START_OFFLINE", "maybe")]),
            Err(ConfigError::InvalidFlag { .. })
        ));
    }
}
