//! # Sync Configuration
//!
//! Where and how the till reports voucher redemptions to the loyalty cloud.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     TILL_LOYALTY_ENDPOINT=https://loyalty.example.com/api              │
//! │     TILL_LOYALTY_ENABLED=false                                         │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/till-pos/sync.toml (Linux)                               │
//! │     ~/Library/Application Support/com.till.pos/sync.toml (macOS)       │
//! │                                                                         │
//! │  3. SQLite system setting (endpoint only)                              │
//! │     system_settings.loyalty_sync_endpoint                              │
//! │                                                                         │
//! │  4. Default Values (lowest priority)                                   │
//! │     enabled, no endpoint → notifications are skipped                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # sync.toml
//! [loyalty_cloud]
//! endpoint = "https://loyalty.example.com/api"
//! enabled = true
//! request_timeout_secs = 10
//! queue_capacity = 256
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{SyncError, SyncResult};
use till_db::repository::settings::LOYALTY_SYNC_ENDPOINT;
use till_db::Database;

// =============================================================================
// Loyalty Cloud Settings
// =============================================================================

/// Outbound notification settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoyaltyCloudSettings {
    /// Base URL; `/members/vouchers/send` is appended per call.
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Master switch. When false nothing is sent even with an endpoint.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Per-request timeout (seconds).
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Pending notifications held before new ones are dropped.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

fn default_true() -> bool {
    true
}

fn default_request_timeout() -> u64 {
    10
}

fn default_queue_capacity() -> usize {
    256
}

impl Default for LoyaltyCloudSettings {
    fn default() -> Self {
        LoyaltyCloudSettings {
            endpoint: None,
            enabled: default_true(),
            request_timeout_secs: default_request_timeout(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

// =============================================================================
// Sync Config
// =============================================================================

/// Complete notifier configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub loyalty_cloud: LoyaltyCloudSettings,
}

impl SyncConfig {
    /// Loads configuration from file, then applies `TILL_*` overrides.
    pub fn load(config_path: Option<PathBuf>) -> SyncResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading sync config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load sync config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> SyncResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| SyncError::ConfigSaveFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)?;

        info!(?path, "Sync config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> SyncResult<()> {
        if let Some(endpoint) = self.endpoint() {
            let url = Url::parse(endpoint)?;
            if url.scheme() != "http" && url.scheme() != "https" {
                return Err(SyncError::InvalidUrl(format!(
                    "Endpoint must start with http:// or https://, got: {}",
                    endpoint
                )));
            }
        }

        if self.loyalty_cloud.request_timeout_secs == 0 {
            return Err(SyncError::InvalidConfig(
                "request_timeout_secs must be greater than 0".into(),
            ));
        }

        if self.loyalty_cloud.queue_capacity == 0 {
            return Err(SyncError::InvalidConfig(
                "queue_capacity must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    /// Fills a missing endpoint from the `loyalty_sync_endpoint` setting.
    ///
    /// An endpoint from file or environment always wins.
    pub async fn resolve_endpoint(&mut self, db: &Database) -> SyncResult<()> {
        if self.endpoint().is_some() {
            return Ok(());
        }

        if let Some(value) = db.settings().get(LOYALTY_SYNC_ENDPOINT).await? {
            if !value.trim().is_empty() {
                debug!(endpoint = %value.trim(), "Using loyalty endpoint from system settings");
                self.loyalty_cloud.endpoint = Some(value.trim().to_string());
            }
        }

        self.validate()
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Applies `TILL_LOYALTY_*` values from `lookup`; unparsable numbers are ignored.
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("TILL_LOYALTY_ENDPOINT") {
            debug!(url = %url, "Overriding loyalty endpoint from environment");
            self.loyalty_cloud.endpoint = Some(url);
        }

        if let Some(enabled) = lookup("TILL_LOYALTY_ENABLED") {
            match enabled.to_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => self.loyalty_cloud.enabled = true,
                "0" | "false" | "no" | "off" => self.loyalty_cloud.enabled = false,
                other => warn!(value = other, "Ignoring TILL_LOYALTY_ENABLED"),
            }
        }

        if let Some(timeout) = lookup("TILL_LOYALTY_TIMEOUT_SECS") {
            if let Ok(secs) = timeout.parse::<u64>() {
                self.loyalty_cloud.request_timeout_secs = secs;
            }
        }

        if let Some(capacity) = lookup("TILL_LOYALTY_QUEUE_CAPACITY") {
            if let Ok(n) = capacity.parse::<usize>() {
                self.loyalty_cloud.queue_capacity = n;
            }
        }
    }

    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "till", "pos")
            .map(|dirs| dirs.config_dir().join("sync.toml"))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    /// Trimmed endpoint, if one is set and non-blank.
    pub fn endpoint(&self) -> Option<&str> {
        self.loyalty_cloud
            .endpoint
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty())
    }

    /// True when notifications will actually be sent.
    pub fn is_active(&self) -> bool {
        self.loyalty_cloud.enabled && self.endpoint().is_some()
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.loyalty_cloud.request_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use till_db::DbConfig;

    #[test]
    fn test_default_config() {
        let config = SyncConfig::default();
        assert!(config.loyalty_cloud.enabled);
        assert_eq!(config.loyalty_cloud.queue_capacity, 256);
        assert_eq!(config.request_timeout(), Duration::from_secs(10));
        assert!(!config.is_active());
    }

    #[test]
    fn test_config_validation() {
        let mut config = SyncConfig::default();
        assert!(config.validate().is_ok());

        config.loyalty_cloud.endpoint = Some("ftp://loyalty".to_string());
        assert!(config.validate().is_err());

        config.loyalty_cloud.endpoint = Some("not a url".to_string());
        assert!(config.validate().is_err());

        config.loyalty_cloud.endpoint = Some(" https://loyalty.example.com/api ".to_string());
        assert!(config.validate().is_ok());
        assert_eq!(config.endpoint(), Some("https://loyalty.example.com/api"));

        config.loyalty_cloud.queue_capacity = 0;
        assert!(config.validate().unwrap_err().is_config_error());
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            ("TILL_LOYALTY_ENDPOINT", "http://127.0.0.1:9000"),
            ("TILL_LOYALTY_ENABLED", "off"),
            ("TILL_LOYALTY_TIMEOUT_SECS", "3"),
            ("TILL_LOYALTY_QUEUE_CAPACITY", "lots"),
        ]
        .into_iter()
        .collect();

        let mut config = SyncConfig::default();
        config.apply_overrides(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.endpoint(), Some("http://127.0.0.1:9000"));
        assert!(!config.loyalty_cloud.enabled);
        assert!(!config.is_active());
        assert_eq!(config.loyalty_cloud.request_timeout_secs, 3);
        assert_eq!(config.loyalty_cloud.queue_capacity, 256);
    }

    #[test]
    fn test_toml_round_trip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("sync.toml");

        let mut config = SyncConfig::default();
        config.loyalty_cloud.endpoint = Some("https://loyalty.example.com".to_string());
        config.loyalty_cloud.queue_capacity = 8;
        config.save(Some(path.clone())).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("[loyalty_cloud]"));

        let loaded: SyncConfig = toml::from_str(&contents).unwrap();
        assert_eq!(loaded.endpoint(), Some("https://loyalty.example.com"));
        assert_eq!(loaded.loyalty_cloud.queue_capacity, 8);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: SyncConfig = toml::from_str("[loyalty_cloud]\nenabled = false\n").unwrap();
        assert!(!config.loyalty_cloud.enabled);
        assert_eq!(config.loyalty_cloud.request_timeout_secs, 10);
    }

    #[tokio::test]
    async fn test_endpoint_falls_back_to_setting() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.settings()
            .set(LOYALTY_SYNC_ENDPOINT, "  http://loyalty.internal:8081  ")
            .await
            .unwrap();

        let mut config = SyncConfig::default();
        config.resolve_endpoint(&db).await.unwrap();
        assert_eq!(config.endpoint(), Some("http://loyalty.internal:8081"));

        let mut explicit = SyncConfig::default();
        explicit.loyalty_cloud.endpoint = Some("https://from-file.example.com".to_string());
        explicit.resolve_endpoint(&db).await.unwrap();
        assert_eq!(explicit.endpoint(), Some("https://from-file.example.com"));
    }
}
