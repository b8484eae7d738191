//! Bridge configuration file.
//!
//! ```json
//! {
//!   "loxone": { "host": "192.168.1.77", "port": 7000 },
//!   "mqtt":   { "broker": "localhost", "port": 1883, "topicPrefix": "loxone" },
//!   "store":  { "path": "loxbridge.redb", "retentionHours": 720 },
//!   "log":    { "json": false, "directory": null }
//! }
//! ```
//!
//! Only `loxone.host` and `loxone.port` are required.

use std::path::{Path, PathBuf};

use loxbridge_miniserver::MiniserverOption;
use loxbridge_mqtt::MqttConfig;
use loxbridge_storage::StoreConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default configuration file name.
pub const DEFAULT_CONFIG_PATH: &str = "config.json";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read configuration file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid configuration file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Missing required configuration value: {0}")]
    Missing(&'static str),

    #[error("Invalid configuration value {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Miniserver section. Fields are optional here so a missing value is
/// reported by key rather than by serde.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoxoneConfig {
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<u32>,
}

/// Logging section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogConfig {
    /// Emit JSON lines instead of the compact human format.
    #[serde(default)]
    pub json: bool,

    /// Also write a daily-rolled log file into this directory.
    #[serde(default)]
    pub directory: Option<PathBuf>,
}

/// Complete bridge configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeConfig {
    #[serde(default)]
    pub loxone: LoxoneConfig,

    #[serde(default)]
    pub mqtt: MqttConfig,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub log: LogConfig,
}

impl BridgeConfig {
    /// Read, parse and validate a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate configuration text.
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text).map_err(|source| ConfigError::Parse {
            path: PathBuf::from("<inline>"),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.miniserver_option()?;
        self.mqtt.validate().map_err(|e| ConfigError::Invalid {
            key: "mqtt",
            reason: e.to_string(),
        })?;
        if self.store.queue_capacity == 0 {
            return Err(ConfigError::Invalid {
                key: "store.queueCapacity",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// Endpoint of the Miniserver, shared by the listener and the sender.
    pub fn miniserver_option(&self) -> Result<MiniserverOption, ConfigError> {
        let host = self
            .loxone
            .host
            .as_deref()
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .ok_or(ConfigError::Missing("loxone.host"))?;

        let port = self.loxone.port.ok_or(ConfigError::Missing("loxone.port"))?;
        let port = u16::try_from(port)
            .ok()
            .filter(|p| *p != 0)
            .ok_or_else(|| ConfigError::Invalid {
                key: "loxone.port",
                reason: format!("{} is not between 1 and 65535", port),
            })?;

        Ok(MiniserverOption::new(host, port))
    }
}
