//! Server configuration.
//!
//! Loaded from environment variables with fallback to defaults.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use till_core::DEFAULT_REORDER_LEVEL;

use crate::settlement::SettlementConfig;

/// Settlement server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the HTTP listener binds to.
    pub bind_addr: SocketAddr,

    /// SQLite database file.
    pub database_path: PathBuf,

    /// Upper bound on one settlement unit of work.
    pub settlement_timeout: Duration,

    /// Reorder level for inventory rows created on first sale.
    pub default_reorder_level: i64,

    /// Optional sync.toml; the platform config directory is used otherwise.
    pub sync_config_path: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            database_path: PathBuf::from("./till.db"),
            settlement_timeout: Duration::from_millis(5_000),
            default_reorder_level: DEFAULT_REORDER_LEVEL,
            sync_config_path: None,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from `lookup`, which maps variable names to values.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = ServerConfig::default();

        let config = ServerConfig {
            bind_addr: match lookup("TILL_BIND_ADDR") {
                Some(addr) => addr
                    .parse()
                    .map_err(|_| ConfigError::InvalidValue("TILL_BIND_ADDR".to_string()))?,
                None => defaults.bind_addr,
            },

            database_path: lookup("TILL_DATABASE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.database_path),

            settlement_timeout: match lookup("TILL_SETTLEMENT_TIMEOUT_MS") {
                Some(ms) => Duration::from_millis(ms.parse().map_err(|_| {
                    ConfigError::InvalidValue("TILL_SETTLEMENT_TIMEOUT_MS".to_string())
                })?),
                None => defaults.settlement_timeout,
            },

            default_reorder_level: match lookup("TILL_DEFAULT_REORDER_LEVEL") {
                Some(level) => level.parse().map_err(|_| {
                    ConfigError::InvalidValue("TILL_DEFAULT_REORDER_LEVEL".to_string())
                })?,
                None => defaults.default_reorder_level,
            },

            sync_config_path: lookup("TILL_SYNC_CONFIG").map(PathBuf::from),
        };

        if config.settlement_timeout.is_zero() {
            return Err(ConfigError::InvalidValue("TILL_SETTLEMENT_TIMEOUT_MS".to_string()));
        }
        if config.default_reorder_level < 0 {
            return Err(ConfigError::InvalidValue("TILL_DEFAULT_REORDER_LEVEL".to_string()));
        }

        Ok(config)
    }

    pub fn settlement(&self) -> SettlementConfig {
        SettlementConfig {
            timeout: self.settlement_timeout,
            default_reorder_level: self.default_reorder_level,
        }
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {0}")]
    InvalidValue(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<ServerConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[]).unwrap();
        assert_eq!(config.bind_addr.port(), 8080);
        assert_eq!(config.settlement_timeout, Duration::from_secs(5));
        assert_eq!(config.default_reorder_level, 10);
        assert!(config.sync_config_path.is_none());
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            ("TILL_BIND_ADDR", "127.0.0.1:9090"),
            ("TILL_DATABASE_PATH", "/var/lib/till/till.db"),
            ("TILL_SETTLEMENT_TIMEOUT_MS", "750"),
            ("TILL_DEFAULT_REORDER_LEVEL", "4"),
            ("TILL_SYNC_CONFIG", "/etc/till/sync.toml"),
        ])
        .unwrap();

        assert_eq!(config.bind_addr.to_string(), "127.0.0.1:9090");
        assert_eq!(config.database_path, PathBuf::from("/var/lib/till/till.db"));
        assert_eq!(config.settlement().timeout, Duration::from_millis(750));
        assert_eq!(config.settlement().default_reorder_level, 4);
        assert!(config.sync_config_path.is_some());
    }

    #[test]
    fn test_invalid_values() {
        assert!(load(&[("TILL_BIND_ADDR", "nowhere")]).is_err());
        assert!(load(&[("TILL_SETTLEMENT_TIMEOUT_MS", "0")]).is_err());
        assert!(load(&[("TILL_DEFAULT_REORDER_LEVEL", "-1")]).is_err());
    }
}
