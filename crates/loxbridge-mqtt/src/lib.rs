//! MQTT message bus for Loxbridge.
//!
//! [`MqttBrokerClient`] implements [`loxbridge_core::MessageBus`] on top of
//! `rumqttc`. Status messages are published under `status/...`, actions under
//! `action/...`; see [`topic`] for the layout.

pub mod client;
pub mod config;
pub mod error;
pub mod topic;

pub use client::MqttBrokerClient;
pub use config::{MqttConfig, Qos};
pub use error::{MqttError, Result};
