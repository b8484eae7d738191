use std::net::SocketAddr;

use thiserror::Error;

/// Result type for Miniserver transport operations.
pub type Result<T> = std::result::Result<T, MiniserverError>;

/// Miniserver transport errors.
#[derive(Debug, Error)]
pub enum MiniserverError {
    /// The socket could not be bound.
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// The Miniserver host could not be resolved.
    #[error("Failed to resolve {host}: {source}")]
    Resolve {
        host: String,
        #[source]
        source: std::io::Error,
    },

    /// The Miniserver host resolved to no address.
    #[error("No address found for {0}")]
    NoAddress(String),

    /// Invalid endpoint option.
    #[error("Invalid option: {0}")]
    InvalidOption(String),
}

impl From<MiniserverError> for loxbridge_core::Error {
    fn from(e: MiniserverError) -> Self {
        match e {
            MiniserverError::InvalidOption(msg) => loxbridge_core::Error::Config(msg),
            other => loxbridge_core::Error::Transport(other.to_string()),
        }
    }
}
