use thiserror::Error;

/// Result type for MQTT operations.
pub type Result<T> = std::result::Result<T, MqttError>;

/// MQTT bus errors.
#[derive(Debug, Error)]
pub enum MqttError {
    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Request could not be queued to the client.
    #[error("Client error: {0}")]
    Client(#[from] rumqttc::ClientError),
}

impl From<MqttError> for loxbridge_core::Error {
    fn from(e: MqttError) -> Self {
        match e {
            MqttError::InvalidConfiguration(msg) => loxbridge_core::Error::Config(msg),
            other => loxbridge_core::Error::Bus(other.to_string()),
        }
    }
}
