//! MQTT bus configuration.

use serde::{Deserialize, Serialize};

use crate::error::{MqttError, Result};

/// MQTT QoS level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum Qos {
    AtMostOnce = 0,
    #[default]
    AtLeastOnce = 1,
    ExactlyOnce = 2,
}

impl From<Qos> for rumqttc::QoS {
    fn from(qos: Qos) -> Self {
        match qos {
            Qos::AtMostOnce => rumqttc::QoS::AtMostOnce,
            Qos::AtLeastOnce => rumqttc::QoS::AtLeastOnce,
            Qos::ExactlyOnce => rumqttc::QoS::ExactlyOnce,
        }
    }
}

/// MQTT broker connection configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MqttConfig {
    /// Broker address.
    #[serde(default = "default_broker")]
    pub broker: String,

    /// Broker port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Client ID. Generated when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,

    /// Username.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    /// Password.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// Keep-alive interval in seconds.
    #[serde(default = "default_keep_alive")]
    pub keep_alive: u64,

    /// Clean session flag.
    #[serde(default = "default_clean_session")]
    pub clean_session: bool,

    /// QoS for publishes and subscriptions.
    #[serde(default)]
    pub qos: Qos,

    /// Publish status messages retained, so new subscribers see the last value.
    #[serde(default = "default_retain_status")]
    pub retain_status: bool,

    /// System segment under which actions for the Miniserver are received.
    #[serde(default = "default_topic_prefix")]
    pub topic_prefix: String,

    /// Delay before polling again after a connection error, in milliseconds.
    #[serde(default = "default_reconnect_interval")]
    pub reconnect_interval_ms: u64,

    /// Capacity of the client request queue.
    #[serde(default = "default_request_capacity")]
    pub request_capacity: usize,
}

fn default_broker() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    1883
}

fn default_keep_alive() -> u64 {
    60
}

fn default_clean_session() -> bool {
    true
}

fn default_retain_status() -> bool {
    true
}

fn default_topic_prefix() -> String {
    "loxone".to_string()
}

fn default_reconnect_interval() -> u64 {
    5000
}

fn default_request_capacity() -> usize {
    256
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self::new(default_broker())
    }
}

impl MqttConfig {
    /// Create a new MQTT configuration.
    pub fn new(broker: impl Into<String>) -> Self {
        Self {
            broker: broker.into(),
            port: default_port(),
            client_id: None,
            username: None,
            password: None,
            keep_alive: default_keep_alive(),
            clean_session: default_clean_session(),
            qos: Qos::default(),
            retain_status: default_retain_status(),
            topic_prefix: default_topic_prefix(),
            reconnect_interval_ms: default_reconnect_interval(),
            request_capacity: default_request_capacity(),
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_auth(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    pub fn with_topic_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.topic_prefix = prefix.into();
        self
    }

    pub fn with_reconnect_interval_ms(mut self, interval_ms: u64) -> Self {
        self.reconnect_interval_ms = interval_ms;
        self
    }

    /// Get the full broker address.
    pub fn broker_addr(&self) -> String {
        format!("{}:{}", self.broker, self.port)
    }

    pub fn validate(&self) -> Result<()> {
        if self.broker.trim().is_empty() {
            return Err(MqttError::InvalidConfiguration(
                "mqtt.broker must not be empty".to_string(),
            ));
        }
        if self.port == 0 {
            return Err(MqttError::InvalidConfiguration(
                "mqtt.port must be between 1 and 65535".to_string(),
            ));
        }
        if self.topic_prefix.is_empty() || self.topic_prefix.contains(['/', '+', '#']) {
            return Err(MqttError::InvalidConfiguration(format!(
                "mqtt.topicPrefix must be a single topic level, got '{}'",
                self.topic_prefix
            )));
        }
        Ok(())
    }

    pub(crate) fn mqtt_options(&self) -> rumqttc::MqttOptions {
        let client_id = self
            .client_id
            .clone()
            .unwrap_or_else(|| format!("loxbridge_{}", uuid::Uuid::new_v4()));

        let mut opts = rumqttc::MqttOptions::new(client_id, &self.broker, self.port);
        opts.set_keep_alive(std::time::Duration::from_secs(self.keep_alive.max(5)));
        opts.set_clean_session(self.clean_session);

        if let (Some(username), Some(password)) = (&self.username, &self.password) {
            opts.set_credentials(username, password);
        }
        opts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mqtt_config() {
        let config = MqttConfig::new("broker.local")
            .with_port(1884)
            .with_auth("user", "pass")
            .with_client_id("test_client");

        assert_eq!(config.port, 1884);
        assert_eq!(config.username, Some("user".to_string()));
        assert_eq!(config.client_id, Some("test_client".to_string()));
        assert_eq!(config.broker_addr(), "broker.local:1884");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_defaults_from_json() {
        let config: MqttConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, MqttConfig::default());
        assert_eq!(config.broker_addr(), "localhost:1883");
        assert_eq!(config.topic_prefix, "loxone");
        assert_eq!(config.qos, Qos::AtLeastOnce);
        assert!(config.retain_status);

        let config: MqttConfig =
            serde_json::from_str(r#"{"broker": "10.0.0.5", "topicPrefix": "lox", "reconnectIntervalMs": 100}"#)
                .unwrap();
        assert_eq!(config.topic_prefix, "lox");
        assert_eq!(config.reconnect_interval_ms, 100);
    }

    #[test]
    fn test_validate() {
        assert!(MqttConfig::new("").validate().is_err());
        assert!(MqttConfig::new("localhost").with_port(0).validate().is_err());
        assert!(MqttConfig::new("localhost").with_topic_prefix("a/b").validate().is_err());
        assert!(MqttConfig::new("localhost").with_topic_prefix("#").validate().is_err());
    }
}
