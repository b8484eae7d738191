//! Outbound UDP sender.

use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;

use async_trait::async_trait;
use loxbridge_core::{
    ActionMessage, Component, ComponentLifecycle, LifecycleOptions, StatusMessage,
    TransportMetrics, TransportMetricsRecorder,
};
use parking_lot::Mutex;
use tokio::net::UdpSocket;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::MiniserverError;
use crate::option::MiniserverOption;

/// Datagrams waiting for the socket. Sends beyond this are dropped.
pub const SEND_QUEUE_CAPACITY: usize = 1024;

struct SenderInner {
    option: MiniserverOption,
    lifecycle: ComponentLifecycle,
    metrics: TransportMetricsRecorder,
    remote_addr: Mutex<Option<SocketAddr>>,
    queue: Mutex<Option<mpsc::Sender<Vec<u8>>>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

/// Sends encoded messages to the Miniserver, fire-and-forget.
///
/// `send_status` and `send_action` never block: datagrams are handed to a
/// single writer task, which keeps them in call order.
#[derive(Clone)]
pub struct MiniserverSender {
    inner: Arc<SenderInner>,
}

impl MiniserverSender {
    pub fn new(option: MiniserverOption) -> Self {
        let lifecycle = ComponentLifecycle::new(
            LifecycleOptions::new(format!("MiniserverSender({})", option.host))
                .with_remote_endpoint(option.remote_endpoint()),
        );

        Self {
            inner: Arc::new(SenderInner {
                option,
                lifecycle,
                metrics: TransportMetricsRecorder::new(),
                remote_addr: Mutex::new(None),
                queue: Mutex::new(None),
                task: Mutex::new(None),
            }),
        }
    }

    pub fn option(&self) -> &MiniserverOption {
        &self.inner.option
    }

    pub fn metrics(&self) -> TransportMetrics {
        self.inner.metrics.snapshot()
    }

    /// Resolved Miniserver address, once initialized.
    pub fn remote_addr(&self) -> Option<SocketAddr> {
        *self.inner.remote_addr.lock()
    }

    /// Send a status message.
    pub fn send_status(&self, message: &StatusMessage) {
        self.transmit("status", message.to_string());
    }

    /// Send an action message.
    pub fn send_action(&self, message: &ActionMessage) {
        self.transmit("action", message.to_string());
    }

    /// Stop the writer task after it drained queued datagrams.
    pub async fn close(&self) {
        self.inner.queue.lock().take();
        let task = self.inner.task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                error!(component = %self.name(), error = %e, "Sender task failed");
            }
            self.inner.lifecycle.on_unbind();
        }
    }

    fn transmit(&self, kind: &str, text: String) {
        let queue = self.inner.queue.lock().clone();
        let Some(queue) = queue else {
            if self.is_initialized() {
                warn!(component = %self.name(), "Sender closed, dropping {} message", kind);
            } else {
                warn!(
                    component = %self.name(),
                    "Not initialized, unable to send a {} message.",
                    kind
                );
            }
            self.inner.metrics.record_dropped();
            return;
        };

        match queue.try_send(text.into_bytes()) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!(component = %self.name(), "Send queue full, dropping {} message", kind);
                self.inner.metrics.record_dropped();
            }
            Err(TrySendError::Closed(_)) => {
                warn!(component = %self.name(), "Sender closed, dropping {} message", kind);
                self.inner.metrics.record_dropped();
            }
        }
    }
}

async fn transmit_loop(
    inner: Arc<SenderInner>,
    socket: UdpSocket,
    remote: SocketAddr,
    mut rx: mpsc::Receiver<Vec<u8>>,
) {
    while let Some(datagram) = rx.recv().await {
        match socket.send_to(&datagram, remote).await {
            Ok(len) => {
                inner.metrics.record_sent(len);
                inner.lifecycle.on_active();
            }
            Err(e) => {
                inner.metrics.record_send_error();
                error!(
                    component = %inner.lifecycle.name(),
                    error = %e,
                    "Failed to send datagram to {}",
                    remote
                );
            }
        }
    }

    debug!(component = %inner.lifecycle.name(), "Sender queue closed");
}

#[async_trait]
impl Component for MiniserverSender {
    fn lifecycle(&self) -> &ComponentLifecycle {
        &self.inner.lifecycle
    }

    async fn initialize(&self) -> loxbridge_core::Result<()> {
        let lifecycle = &self.inner.lifecycle;
        if !lifecycle.begin_initialize() {
            return Ok(());
        }

        if let Err(e) = self.inner.option.validate_remote() {
            error!(component = %lifecycle.name(), error = %e, "Invalid Miniserver endpoint");
            lifecycle.fail_initialize();
            return Err(e.into());
        }

        let remote = match self.inner.option.resolve_remote().await {
            Ok(remote) => remote,
            Err(e) => {
                error!(component = %lifecycle.name(), error = %e, "Cannot resolve Miniserver host");
                lifecycle.fail_initialize();
                return Err(e.into());
            }
        };

        // The send socket must match the family of the resolved address.
        let addr = if remote.is_ipv4() {
            SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0))
        } else {
            SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0))
        };
        let socket = match UdpSocket::bind(addr).await {
            Ok(socket) => socket,
            Err(source) => {
                error!(component = %lifecycle.name(), error = %source, "Failed to create send socket");
                lifecycle.fail_initialize();
                return Err(MiniserverError::Bind { addr, source }.into());
            }
        };

        let (tx, rx) = mpsc::channel(SEND_QUEUE_CAPACITY);
        let task = tokio::spawn(transmit_loop(self.inner.clone(), socket, remote, rx));
        *self.inner.remote_addr.lock() = Some(remote);
        *self.inner.task.lock() = Some(task);
        *self.inner.queue.lock() = Some(tx);

        lifecycle.on_initialize();
        lifecycle.on_bind();

        info!(
            component = %lifecycle.name(),
            "Sending to {} ({})",
            self.inner.option.remote_endpoint(),
            remote
        );
        Ok(())
    }

    async fn shutdown(&self) {
        self.close().await;
    }
}

impl std::fmt::Debug for MiniserverSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MiniserverSender")
            .field("option", &self.inner.option)
            .field("state", &self.inner.lifecycle.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_and_endpoint() {
        let sender = MiniserverSender::new(MiniserverOption::new("192.168.1.77", 7000));
        assert_eq!(sender.name(), "MiniserverSender(192.168.1.77)");
        assert_eq!(
            sender.lifecycle().remote_endpoint(),
            Some("udp://192.168.1.77:7000")
        );
        assert!(sender.lifecycle().outdated().is_zero());
    }

    #[test]
    fn test_send_before_initialize_is_dropped() {
        let sender = MiniserverSender::new(MiniserverOption::new("127.0.0.1", 7000));
        sender.send_action(&ActionMessage::new("home", "kitchen", "light1", "power", "toggle"));
        sender.send_status(&StatusMessage::new("home", "kitchen", "light1", "power", "on"));

        let metrics = sender.metrics();
        assert_eq!(metrics.dropped, 2);
        assert_eq!(metrics.sent, 0);
    }

    #[tokio::test]
    async fn test_invalid_option_fails_initialize() {
        let sender = MiniserverSender::new(MiniserverOption::new("", 7000));
        assert!(sender.initialize().await.is_err());
        assert!(!sender.is_initialized());
    }
}
