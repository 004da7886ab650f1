//! # Sync Configuration
//!
//! Configuration management for the sync engine.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     SOSY_API_URL=https://api.sosy.app                                  │
//! │     SOSY_DEVICE_ID=register-1                                          │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/sosy-sync/sync.toml (Linux)                              │
//! │     ~/Library/Application Support/com.sosy.sync/sync.toml (macOS)      │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     localhost API, 10s sync interval, persisted device id              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # sync.toml
//! [api]
//! base_url = "https://api.sosy.app"
//!
//! [sync]
//! interval_ms = 10000
//!
//! [realtime]
//! enabled = true
//! max_reconnect_attempts = 5
//!
//! [session]
//! business_id = 12
//! user_id = 7
//! ```

use serde::{Deserialize, Serialize};
use sosy_core::validation::validate_device_id;
use sosy_core::BackoffPolicy;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{SyncError, SyncResult};

// =============================================================================
// Device Configuration
// =============================================================================

/// Configuration for this device.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Fixed device identifier. When absent the persisted (or newly
    /// generated) id from storage is used.
    #[serde(default)]
    pub id: Option<String>,
}

// =============================================================================
// API Settings
// =============================================================================

/// REST API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiSettings {
    /// Base URL every relative endpoint is resolved against.
    #[serde(default = "default_api_url")]
    pub base_url: String,

    /// Per-request timeout (seconds).
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_api_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_request_timeout() -> u64 {
    sosy_core::REQUEST_TIMEOUT_SECS
}

impl Default for ApiSettings {
    fn default() -> Self {
        ApiSettings {
            base_url: default_api_url(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

// =============================================================================
// Sync Settings
// =============================================================================

/// Sync worker and sync queue settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSettings {
    /// Period between sync cycles (milliseconds).
    #[serde(default = "default_sync_interval")]
    pub interval_ms: u64,

    /// Push attempts per action before it stops being offered.
    #[serde(default = "default_sync_max_retries")]
    pub max_retries: u32,

    /// Most recent actions kept in storage.
    #[serde(default = "default_capacity")]
    pub capacity: usize,

    /// Chance that a successful push is followed by removal of synced actions.
    #[serde(default = "default_compaction_probability")]
    pub compaction_probability: f64,
}

fn default_sync_interval() -> u64 {
    sosy_core::DEFAULT_SYNC_INTERVAL_MS
}
fn default_sync_max_retries() -> u32 {
    sosy_core::SYNC_QUEUE_MAX_RETRIES
}
fn default_capacity() -> usize {
    sosy_core::SYNC_QUEUE_CAPACITY
}
fn default_compaction_probability() -> f64 {
    0.1
}

impl Default for SyncSettings {
    fn default() -> Self {
        SyncSettings {
            interval_ms: default_sync_interval(),
            max_retries: default_sync_max_retries(),
            capacity: default_capacity(),
            compaction_probability: default_compaction_probability(),
        }
    }
}

// =============================================================================
// Offline Queue Settings
// =============================================================================

/// Deferred request replay settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OfflineSettings {
    #[serde(default = "default_offline_max_retries")]
    pub max_retries: u32,

    /// Replay delay base (milliseconds), doubled per recorded failure.
    #[serde(default = "default_offline_delay")]
    pub retry_delay_base_ms: u64,
}

fn default_offline_max_retries() -> u32 {
    sosy_core::OFFLINE_QUEUE_MAX_RETRIES
}
fn default_offline_delay() -> u64 {
    sosy_core::OFFLINE_RETRY_DELAY_BASE_MS
}

impl Default for OfflineSettings {
    fn default() -> Self {
        OfflineSettings {
            max_retries: default_offline_max_retries(),
            retry_delay_base_ms: default_offline_delay(),
        }
    }
}

// =============================================================================
// Realtime Settings
// =============================================================================

/// Realtime WebSocket settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Explicit ws(s) base URL. Derived from the API URL when absent.
    #[serde(default)]
    pub url: Option<String>,

    #[serde(default = "default_reconnect_attempts")]
    pub max_reconnect_attempts: u32,

    /// First reconnect delay (milliseconds), doubled per attempt.
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_ms: u64,

    #[serde(default = "default_heartbeat")]
    pub heartbeat_interval_secs: u64,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

fn default_true() -> bool {
    true
}
fn default_reconnect_attempts() -> u32 {
    sosy_core::REALTIME_MAX_RECONNECT_ATTEMPTS
}
fn default_reconnect_delay() -> u64 {
    sosy_core::REALTIME_RECONNECT_DELAY_MS
}
fn default_heartbeat() -> u64 {
    sosy_core::HEARTBEAT_INTERVAL_SECS
}
fn default_connect_timeout() -> u64 {
    10
}

impl Default for RealtimeSettings {
    fn default() -> Self {
        RealtimeSettings {
            enabled: true,
            url: None,
            max_reconnect_attempts: default_reconnect_attempts(),
            reconnect_delay_ms: default_reconnect_delay(),
            heartbeat_interval_secs: default_heartbeat(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

// =============================================================================
// Network Settings
// =============================================================================

/// Reachability settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkSettings {
    /// Initial reachability before the first probe.
    #[serde(default = "default_true")]
    pub assume_online: bool,

    /// Periodically probe the API to update reachability.
    #[serde(default = "default_true")]
    pub probe_enabled: bool,

    #[serde(default = "default_probe_path")]
    pub probe_path: String,

    #[serde(default = "default_probe_interval")]
    pub probe_interval_secs: u64,
}

fn default_probe_path() -> String {
    "/health".to_string()
}
fn default_probe_interval() -> u64 {
    15
}

impl Default for NetworkSettings {
    fn default() -> Self {
        NetworkSettings {
            assume_online: true,
            probe_enabled: true,
            probe_path: default_probe_path(),
            probe_interval_secs: default_probe_interval(),
        }
    }
}

// =============================================================================
// Storage & Session
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageSettings {
    /// SQLite file. Defaults to the platform data directory.
    #[serde(default)]
    pub database_path: Option<PathBuf>,
}

/// Signed-in session the agent binary connects for.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionSettings {
    #[serde(default)]
    pub business_id: Option<i64>,

    #[serde(default)]
    pub user_id: Option<i64>,

    /// Bearer token to seed the credential store with.
    #[serde(default, skip_serializing)]
    pub auth_token: Option<String>,
}

// =============================================================================
// Main Sync Configuration
// =============================================================================

/// Complete sync configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub device: DeviceConfig,

    #[serde(default)]
    pub api: ApiSettings,

    #[serde(default)]
    pub sync: SyncSettings,

    #[serde(default)]
    pub offline: OfflineSettings,

    #[serde(default)]
    pub realtime: RealtimeSettings,

    #[serde(default)]
    pub network: NetworkSettings,

    #[serde(default)]
    pub storage: StorageSettings,

    #[serde(default)]
    pub session: SessionSettings,
}

impl SyncConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (sync.toml)
    /// 3. Environment variables
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

        config.apply_overrides(|name| std::env::var(name).ok());
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
        if let Some(ref id) = self.device.id {
            validate_device_id(id)?;
        }

        let api = self.api_base_url()?;
        if !matches!(api.scheme(), "http" | "https") {
            return Err(SyncError::InvalidUrl(format!(
                "API URL must start with http:// or https://, got: {}",
                self.api.base_url
            )));
        }

        if self.realtime.enabled {
            let ws = self.realtime_base_url()?;
            if !matches!(ws.scheme(), "ws" | "wss") {
                return Err(SyncError::InvalidUrl(format!(
                    "Realtime URL must start with ws:// or wss://, got: {}",
                    ws
                )));
            }
        }

        if self.sync.interval_ms == 0 {
            return Err(SyncError::InvalidConfig(
                "sync.interval_ms must be greater than 0".into(),
            ));
        }

        if self.sync.capacity == 0 {
            return Err(SyncError::InvalidConfig(
                "sync.capacity must be greater than 0".into(),
            ));
        }

        if !(0.0..=1.0).contains(&self.sync.compaction_probability) {
            return Err(SyncError::InvalidConfig(
                "sync.compaction_probability must be between 0 and 1".into(),
            ));
        }

        if self.api.request_timeout_secs == 0 {
            return Err(SyncError::InvalidConfig(
                "api.request_timeout_secs must be greater than 0".into(),
            ));
        }

        if !self.network.probe_path.starts_with('/') {
            return Err(SyncError::InvalidConfig(
                "network.probe_path must start with '/'".into(),
            ));
        }

        Ok(())
    }

    /// Applies overrides from a variable lookup (the process environment in
    /// [`SyncConfig::load`]).
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("SOSY_API_URL") {
            debug!(url = %url, "Overriding API URL from environment");
            self.api.base_url = url;
        }

        if let Some(url) = lookup("SOSY_WS_URL") {
            debug!(url = %url, "Overriding realtime URL from environment");
            self.realtime.url = Some(url);
        }

        if let Some(id) = lookup("SOSY_DEVICE_ID") {
            debug!(device_id = %id, "Overriding device ID from environment");
            self.device.id = Some(id);
        }

        if let Some(interval) = lookup("SOSY_SYNC_INTERVAL_MS") {
            match interval.parse::<u64>() {
                Ok(ms) => self.sync.interval_ms = ms,
                Err(_) => warn!(value = %interval, "Ignoring invalid SOSY_SYNC_INTERVAL_MS"),
            }
        }

        if let Some(path) = lookup("SOSY_DATABASE_PATH") {
            self.storage.database_path = Some(PathBuf::from(path));
        }

        if let Some(enabled) = lookup("SOSY_REALTIME_ENABLED") {
            match enabled.to_lowercase().as_str() {
                "1" | "true" | "yes" => self.realtime.enabled = true,
                "0" | "false" | "no" => self.realtime.enabled = false,
                _ => warn!(value = %enabled, "Ignoring invalid SOSY_REALTIME_ENABLED"),
            }
        }

        if let Some(id) = lookup("SOSY_BUSINESS_ID").and_then(|v| v.parse().ok()) {
            self.session.business_id = Some(id);
        }

        if let Some(id) = lookup("SOSY_USER_ID").and_then(|v| v.parse().ok()) {
            self.session.user_id = Some(id);
        }

        if let Some(token) = lookup("SOSY_AUTH_TOKEN") {
            self.session.auth_token = Some(token);
        }
    }

    /// Returns the default config file path.
    pub fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "sosy", "sync")
            .map(|dirs| dirs.config_dir().join("sync.toml"))
    }

    /// Returns the default SQLite file path.
    pub fn default_database_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "sosy", "sync")
            .map(|dirs| dirs.data_dir().join("sosy-sync.db"))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    /// Parsed API base URL.
    pub fn api_base_url(&self) -> SyncResult<Url> {
        Ok(Url::parse(&self.api.base_url)?)
    }

    /// Realtime base URL: the explicit one, or the API URL with its scheme
    /// switched to ws/wss.
    pub fn realtime_base_url(&self) -> SyncResult<Url> {
        if let Some(ref url) = self.realtime.url {
            return Ok(Url::parse(url)?);
        }

        let mut url = self.api_base_url()?;
        let scheme = match url.scheme() {
            "https" => "wss",
            _ => "ws",
        };
        url.set_scheme(scheme).map_err(|_| {
            SyncError::InvalidUrl(format!("Cannot derive realtime URL from {}", self.api.base_url))
        })?;
        Ok(url)
    }

    pub fn sync_interval(&self) -> Duration {
        Duration::from_millis(self.sync.interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.api.request_timeout_secs)
    }

    /// Replay policy for the offline request queue.
    pub fn offline_policy(&self) -> BackoffPolicy {
        BackoffPolicy::offline_queue()
            .with_max_attempts(self.offline.max_retries)
            .with_base_delay_ms(self.offline.retry_delay_base_ms)
    }

    /// Reconnect policy for the realtime client.
    pub fn realtime_policy(&self) -> BackoffPolicy {
        BackoffPolicy::realtime()
            .with_max_attempts(self.realtime.max_reconnect_attempts)
            .with_base_delay_ms(self.realtime.reconnect_delay_ms)
    }

    /// Configured database path, or the platform default.
    pub fn database_path(&self) -> Option<PathBuf> {
        self.storage
            .database_path
            .clone()
            .or_else(Self::default_database_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = SyncConfig::default();
        assert_eq!(config.sync.interval_ms, 10_000);
        assert_eq!(config.sync.max_retries, 5);
        assert_eq!(config.sync.capacity, 1000);
        assert_eq!(config.offline.max_retries, 3);
        assert_eq!(config.realtime.max_reconnect_attempts, 5);
        assert_eq!(config.realtime.heartbeat_interval_secs, 30);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_realtime_url_derivation() {
        let mut config = SyncConfig::default();
        config.api.base_url = "https://api.sosy.app".into();
        assert_eq!(config.realtime_base_url().unwrap().scheme(), "wss");

        config.api.base_url = "http://localhost:8000".into();
        assert_eq!(
            config.realtime_base_url().unwrap().as_str(),
            "ws://localhost:8000/"
        );

        config.realtime.url = Some("ws://rt.local:9000".into());
        assert_eq!(config.realtime_base_url().unwrap().host_str(), Some("rt.local"));
    }

    #[test]
    fn test_config_validation() {
        let mut config = SyncConfig::default();

        config.api.base_url = "ftp://files".into();
        assert!(config.validate().is_err());

        config.api.base_url = "http://localhost:8000".into();
        config.realtime.url = Some("http://wrong".into());
        assert!(config.validate().is_err());

        config.realtime.enabled = false;
        assert!(config.validate().is_ok());

        config.sync.compaction_probability = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("SOSY_API_URL", "https://api.example.com"),
            ("SOSY_SYNC_INTERVAL_MS", "2500"),
            ("SOSY_BUSINESS_ID", "12"),
            ("SOSY_USER_ID", "not-a-number"),
            ("SOSY_REALTIME_ENABLED", "false"),
        ]);

        let mut config = SyncConfig::default();
        config.apply_overrides(|name| vars.get(name).map(|v| v.to_string()));

        assert_eq!(config.api.base_url, "https://api.example.com");
        assert_eq!(config.sync.interval_ms, 2500);
        assert_eq!(config.session.business_id, Some(12));
        assert_eq!(config.session.user_id, None);
        assert!(!config.realtime.enabled);
    }

    #[test]
    fn test_policies_follow_settings() {
        let mut config = SyncConfig::default();
        config.offline.retry_delay_base_ms = 5;
        config.realtime.max_reconnect_attempts = 2;

        assert_eq!(config.offline_policy().delay_for(1), Duration::from_millis(10));
        assert_eq!(config.realtime_policy().max_attempts, 2);
    }

    #[test]
    fn test_toml_round_trip_sections() {
        let config = SyncConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[api]"));
        assert!(toml_str.contains("[realtime]"));

        let parsed: SyncConfig = toml::from_str("[sync]\ninterval_ms = 500\n").unwrap();
        assert_eq!(parsed.sync.interval_ms, 500);
        assert_eq!(parsed.sync.capacity, 1000);
    }
}
