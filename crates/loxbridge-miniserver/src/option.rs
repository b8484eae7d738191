use std::net::SocketAddr;

use serde::{Deserialize, Serialize};

use crate::error::{MiniserverError, Result};

/// Miniserver endpoint.
///
/// The listener binds `port` on all interfaces; the sender targets
/// `host:port`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MiniserverOption {
    /// Hostname or IP address of the Miniserver.
    pub host: String,

    /// UDP port.
    pub port: u16,
}

impl MiniserverOption {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// `udp://0.0.0.0:<port>`
    pub fn local_endpoint(&self) -> String {
        format!("udp://0.0.0.0:{}", self.port)
    }

    /// `udp://<host>:<port>`
    pub fn remote_endpoint(&self) -> String {
        format!("udp://{}:{}", self.host, self.port)
    }

    /// Check that the option can address a remote Miniserver.
    pub fn validate_remote(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(MiniserverError::InvalidOption(
                "host must not be empty".to_string(),
            ));
        }
        if self.port == 0 {
            return Err(MiniserverError::InvalidOption(
                "port must be between 1 and 65535".to_string(),
            ));
        }
        Ok(())
    }

    /// Resolve `host:port` to the address datagrams are sent to.
    ///
    /// The first IPv4 address wins; an IPv6 address is used only when the
    /// host has no IPv4 address at all.
    pub async fn resolve_remote(&self) -> Result<SocketAddr> {
        let addrs = tokio::net::lookup_host((self.host.as_str(), self.port))
            .await
            .map_err(|source| MiniserverError::Resolve {
                host: self.host.clone(),
                source,
            })?;
        prefer_ipv4(addrs).ok_or_else(|| MiniserverError::NoAddress(self.host.clone()))
    }
}

/// Pick the first IPv4 address, falling back to the first address of any family.
pub fn prefer_ipv4(addrs: impl IntoIterator<Item = SocketAddr>) -> Option<SocketAddr> {
    let mut fallback = None;
    for addr in addrs {
        if addr.is_ipv4() {
            return Some(addr);
        }
        fallback.get_or_insert(addr);
    }
    fallback
}
