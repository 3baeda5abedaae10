use serde::Deserialize;
use std::path::{Path, PathBuf};

// Re-export component config types
pub use crate::bus::NatsConfig;
pub use crate::rule::RuleConfig;

use crate::store::is_valid_table_name;

/// Environment variable naming the record table (required)
pub const ENV_TABLE_NAME: &str = "BOOKING_TABLE_NAME";
/// Environment variable naming the fan-out topic address
pub const ENV_TOPIC_ADDRESS: &str = "BOOKING_TOPIC_ADDRESS";
pub const ENV_NATS_URL: &str = "NATS_URL";
pub const ENV_DB_PATH: &str = "BOOKING_DB_PATH";
pub const ENV_BIND_ADDR: &str = "BOOKING_BIND_ADDR";

/// Complete service configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BookingConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub bus: BusConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub notifications: NotificationConfig,
    #[serde(default)]
    pub rule: RuleConfig,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("required setting missing: {0}")]
    Missing(&'static str),

    #[error("invalid table name '{0}': use letters, digits and underscores")]
    InvalidTableName(String),
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    /// Requests with larger bodies are rejected with 413
    #[serde(default = "default_body_limit_bytes")]
    pub body_limit_bytes: usize,
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_body_limit_bytes() -> usize {
    1_048_576 // 1 MB
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            body_limit_bytes: default_body_limit_bytes(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BusBackend {
    #[default]
    Nats,
    /// In-process broadcast channel; API and rule share the process
    Local,
}

/// Event bus configuration
#[derive(Debug, Clone, Deserialize)]
pub struct BusConfig {
    #[serde(default)]
    pub backend: BusBackend,
    #[serde(default)]
    pub nats: NatsConfig,
    #[serde(default = "default_local_capacity")]
    pub local_capacity: usize,
}

fn default_local_capacity() -> usize {
    1024
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            backend: BusBackend::default(),
            nats: NatsConfig::default(),
            local_capacity: default_local_capacity(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Sqlite,
    Memory,
}

/// Record store configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    /// Required; validated at startup
    #[serde(default)]
    pub table_name: Option<String>,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("booking.db")
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            db_path: default_db_path(),
            table_name: None,
        }
    }
}

/// Fan-out notification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct NotificationConfig {
    /// When enabled, `topic_address` is required
    #[serde(default = "default_notifications_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub topic_address: Option<String>,
    #[serde(default = "default_publish_timeout_ms")]
    pub publish_timeout_ms: u64,
}

fn default_notifications_enabled() -> bool {
    true
}

fn default_publish_timeout_ms() -> u64 {
    2000
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            enabled: default_notifications_enabled(),
            topic_address: None,
            publish_timeout_ms: default_publish_timeout_ms(),
        }
    }
}

impl BookingConfig {
    /// Loads from a TOML file, falling back to defaults when it does not exist,
    /// then applies environment overrides and validates.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;
            toml::from_str(&contents)?
        } else {
            Self::default()
        };

        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Overrides settings from `lookup` (normally the process environment).
    /// Empty values are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get(ENV_TABLE_NAME) {
            self.store.table_name = Some(v);
        }
        if let Some(v) = get(ENV_TOPIC_ADDRESS) {
            self.notifications.topic_address = Some(v);
        }
        if let Some(v) = get(ENV_NATS_URL) {
            self.bus.nats.url = v;
        }
        if let Some(v) = get(ENV_DB_PATH) {
            self.store.db_path = PathBuf::from(v);
        }
        if let Some(v) = get(ENV_BIND_ADDR) {
            self.server.bind_addr = v;
        }
    }

    /// Startup validation; any error here aborts the process.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let table = self
            .store
            .table_name
            .as_deref()
            .ok_or(ConfigError::Missing(ENV_TABLE_NAME))?;
        if !is_valid_table_name(table) {
            return Err(ConfigError::InvalidTableName(table.to_string()));
        }

        if self.notifications.enabled && self.topic_address().is_none() {
            return Err(ConfigError::Missing(ENV_TOPIC_ADDRESS));
        }

        Ok(())
    }

    /// Table name after validation
    pub fn table_name(&self) -> &str {
        self.store.table_name.as_deref().unwrap_or_default()
    }

    /// Topic address, if notifications are enabled and one is set
    pub fn topic_address(&self) -> Option<&str> {
        if !self.notifications.enabled {
            return None;
        }
        self.notifications
            .topic_address
            .as_deref()
            .filter(|t| !t.trim().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = BookingConfig::default();
        assert_eq!(config.server.bind_addr, "0.0.0.0:3000");
        assert_eq!(config.bus.backend, BusBackend::Nats);
        assert_eq!(config.bus.nats.stream_name, "BOOKING_EVENTS");
        assert_eq!(config.store.backend, StoreBackend::Sqlite);
        assert!(config.notifications.enabled);
        assert_eq!(config.rule.name, "lambdaInvokeRule");
        assert_eq!(config.rule.pattern.source, vec!["restaurant-app-events"]);
    }

    #[test]
    fn test_config_deserialization() {
        let toml = r#"
            [server]
            bind_addr = "127.0.0.1:8080"

            [bus]
            backend = "local"

            [bus.nats]
            url = "nats://example.com:4222"

            [store]
            backend = "memory"
            table_name = "restaurant"

            [notifications]
            topic_address = "booking.notifications"
            publish_timeout_ms = 500

            [rule]
            max_deliver = 5

            [rule.pattern]
            source = ["restaurant-app-events", "booking.workflow"]
        "#;

        let config: BookingConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.server.bind_addr, "127.0.0.1:8080");
        assert_eq!(config.bus.backend, BusBackend::Local);
        assert_eq!(config.bus.nats.url, "nats://example.com:4222");
        assert_eq!(config.store.backend, StoreBackend::Memory);
        assert_eq!(config.table_name(), "restaurant");
        assert_eq!(config.topic_address(), Some("booking.notifications"));
        assert_eq!(config.notifications.publish_timeout_ms, 500);
        assert_eq!(config.rule.max_deliver, 5);
        assert_eq!(config.rule.pattern.source.len(), 2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_table_name_is_fatal() {
        let mut config = BookingConfig::default();
        config.notifications.topic_address = Some("booking.notifications".to_string());

        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::Missing(ENV_TABLE_NAME)));
    }

    #[test]
    fn test_missing_topic_is_fatal_when_notifications_enabled() {
        let mut config = BookingConfig::default();
        config.apply_overrides(env(&[(ENV_TABLE_NAME, "restaurant")]));

        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::Missing(ENV_TOPIC_ADDRESS)));
    }

    #[test]
    fn test_disabled_notifications_need_no_topic() {
        let mut config = BookingConfig::default();
        config.notifications.enabled = false;
        config.notifications.topic_address = Some("ignored".to_string());
        config.apply_overrides(env(&[(ENV_TABLE_NAME, "restaurant")]));

        assert!(config.validate().is_ok());
        assert_eq!(config.topic_address(), None);
    }

    #[test]
    fn test_invalid_table_name_is_fatal() {
        let mut config = BookingConfig::default();
        config.apply_overrides(env(&[
            (ENV_TABLE_NAME, "restaurant; drop"),
            (ENV_TOPIC_ADDRESS, "booking.notifications"),
        ]));

        assert!(matches!(
            config.validate().unwrap_err(),
            ConfigError::InvalidTableName(_)
        ));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = BookingConfig::default();
        config.apply_overrides(env(&[
            (ENV_TABLE_NAME, "restaurant"),
            (ENV_TOPIC_ADDRESS, "booking.notifications"),
            (ENV_NATS_URL, "nats://bus:4222"),
            (ENV_DB_PATH, "/var/lib/booking/records.db"),
            (ENV_BIND_ADDR, "127.0.0.1:9000"),
        ]));

        assert_eq!(config.table_name(), "restaurant");
        assert_eq!(config.topic_address(), Some("booking.notifications"));
        assert_eq!(config.bus.nats.url, "nats://bus:4222");
        assert_eq!(config.store.db_path, PathBuf::from("/var/lib/booking/records.db"));
        assert_eq!(config.server.bind_addr, "127.0.0.1:9000");
    }

    #[test]
    fn test_empty_env_values_are_ignored() {
        let mut config = BookingConfig::default();
        config.apply_overrides(env(&[(ENV_TABLE_NAME, "  "), (ENV_NATS_URL, "")]));

        assert_eq!(config.store.table_name, None);
        assert_eq!(config.bus.nats.url, "nats://localhost:4222");
    }

    #[test]
    fn test_load_missing_file_uses_defaults_then_validates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        // No table name in the file or (presumably) the test environment
        if std::env::var(ENV_TABLE_NAME).is_err() {
            assert!(BookingConfig::load(&path).is_err());
        }
    }

    #[test]
    fn test_load_rejects_bad_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("booking.toml");
        std::fs::write(&path, "[store\ntable_name = ").unwrap();

        assert!(matches!(
            BookingConfig::load(&path).unwrap_err(),
            ConfigError::Parse(_)
        ));
    }
}
