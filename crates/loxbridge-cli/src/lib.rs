//! Loxbridge: a bridge between a Loxone Miniserver and an MQTT smart-home bus.
//!
//! The `loxbridge` binary loads a [`BridgeConfig`], installs logging and runs a
//! [`Bridge`] until interrupted.

pub mod bridge;
pub mod config;
pub mod logging;

pub use bridge::Bridge;
pub use config::{BridgeConfig, ConfigError, LogConfig, LoxoneConfig, DEFAULT_CONFIG_PATH};
pub use logging::{init_logging, LogOptions};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
