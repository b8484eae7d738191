//! Inbound UDP listener.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use loxbridge_core::codec;
use loxbridge_core::{
    ActionMessage, Component, ComponentLifecycle, EventDispatcher, LifecycleOptions,
    MiniserverMessage, StatusMessage, TransportMetrics, TransportMetricsRecorder,
};
use parking_lot::Mutex;
use tokio::net::UdpSocket;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::error::MiniserverError;
use crate::option::MiniserverOption;

/// Liveness window of the listener. The Miniserver is considered stale when
/// no datagram arrived for this long.
pub const LISTENER_OUTDATED: Duration = Duration::from_secs(65);

/// Receive buffer size, the largest possible UDP payload.
pub const MAX_DATAGRAM_SIZE: usize = 65_535;

/// Pause after a failed receive before polling the socket again.
pub const RECEIVE_ERROR_BACKOFF: Duration = Duration::from_millis(100);

struct ListenerInner {
    option: MiniserverOption,
    lifecycle: ComponentLifecycle,
    status_event: EventDispatcher<StatusMessage>,
    action_event: EventDispatcher<ActionMessage>,
    metrics: TransportMetricsRecorder,
    local_addr: Mutex<Option<SocketAddr>>,
    shutdown_tx: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

/// Receives datagrams from the Miniserver and raises typed events.
///
/// Cloning shares the socket and the subscriber lists.
#[derive(Clone)]
pub struct MiniserverListener {
    inner: Arc<ListenerInner>,
}

impl MiniserverListener {
    pub fn new(option: MiniserverOption) -> Self {
        Self::with_outdated(option, LISTENER_OUTDATED)
    }

    /// Create a listener with a custom liveness window.
    pub fn with_outdated(option: MiniserverOption, outdated: Duration) -> Self {
        let lifecycle = ComponentLifecycle::new(
            LifecycleOptions::new(format!("MiniserverListener({})", option.host))
                .with_local_endpoint(option.local_endpoint())
                .with_outdated(outdated),
        );
        let (shutdown_tx, _) = watch::channel(false);

        Self {
            inner: Arc::new(ListenerInner {
                option,
                lifecycle,
                status_event: EventDispatcher::new(),
                action_event: EventDispatcher::new(),
                metrics: TransportMetricsRecorder::new(),
                local_addr: Mutex::new(None),
                shutdown_tx,
                task: Mutex::new(None),
            }),
        }
    }

    pub fn option(&self) -> &MiniserverOption {
        &self.inner.option
    }

    /// Status messages received from the Miniserver.
    pub fn on_status_message_event(&self) -> &EventDispatcher<StatusMessage> {
        &self.inner.status_event
    }

    /// Action messages received from the Miniserver.
    pub fn on_action_message_event(&self) -> &EventDispatcher<ActionMessage> {
        &self.inner.action_event
    }

    /// Address the socket is bound to, once initialized.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.inner.local_addr.lock()
    }

    pub fn metrics(&self) -> TransportMetrics {
        self.inner.metrics.snapshot()
    }

    /// Stop receiving and close the socket.
    pub async fn close(&self) {
        self.inner.shutdown_tx.send_replace(true);
        let task = self.inner.task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                error!(component = %self.name(), error = %e, "Listener task failed");
                self.inner.lifecycle.on_unbind();
            }
        }
    }

    /// Handle one datagram. Every datagram counts as activity, decodable or not.
    pub fn handle_datagram(&self, data: &[u8], peer: SocketAddr) {
        self.inner.handle_datagram(data, peer);
    }
}

impl ListenerInner {
    async fn on_receive_error(&self, e: &std::io::Error) {
        self.metrics.record_receive_error();
        error!(
            component = %self.lifecycle.name(),
            error = %e,
            "Error receiving Miniserver datagram"
        );
        tokio::time::sleep(RECEIVE_ERROR_BACKOFF).await;
    }

    fn handle_datagram(&self, data: &[u8], peer: SocketAddr) {
        self.lifecycle.on_active();
        self.metrics.record_received(data.len());

        let text = String::from_utf8_lossy(data);
        match codec::decode(&text) {
            Ok(MiniserverMessage::Status(message)) => {
                self.status_event.dispatch(self.lifecycle.source(), &message);
            }
            Ok(MiniserverMessage::Action(message)) => {
                self.action_event.dispatch(self.lifecycle.source(), &message);
            }
            Err(_) => {
                self.metrics.record_malformed();
                warn!(
                    component = %self.lifecycle.name(),
                    "Invalid message received from {}: {}",
                    peer.ip(),
                    text
                );
            }
        }
    }
}

async fn receive_loop(
    inner: Arc<ListenerInner>,
    socket: UdpSocket,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];

    loop {
        tokio::select! {
            result = socket.recv_from(&mut buf) => {
                match result {
                    Ok((len, peer)) => inner.handle_datagram(&buf[..len], peer),
                    Err(e) => inner.on_receive_error(&e).await,
                }
            }
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }
        }
    }

    drop(socket);
    info!(component = %inner.lifecycle.name(), "Listener socket closed");
    inner.lifecycle.on_unbind();
}

#[async_trait]
impl Component for MiniserverListener {
    fn lifecycle(&self) -> &ComponentLifecycle {
        &self.inner.lifecycle
    }

    async fn initialize(&self) -> loxbridge_core::Result<()> {
        let lifecycle = &self.inner.lifecycle;
        if !lifecycle.begin_initialize() {
            return Ok(());
        }

        let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, self.inner.option.port));
        let socket = match UdpSocket::bind(addr).await {
            Ok(socket) => socket,
            Err(source) => {
                error!(component = %lifecycle.name(), error = %source, "Failed to bind {}", addr);
                lifecycle.fail_initialize();
                return Err(MiniserverError::Bind { addr, source }.into());
            }
        };

        let local_addr = socket.local_addr().unwrap_or(addr);
        *self.inner.local_addr.lock() = Some(local_addr);

        self.inner.shutdown_tx.send_replace(false);
        let shutdown_rx = self.inner.shutdown_tx.subscribe();

        lifecycle.on_initialize();
        lifecycle.on_bind();
        lifecycle.on_active();

        let task = tokio::spawn(receive_loop(self.inner.clone(), socket, shutdown_rx));
        *self.inner.task.lock() = Some(task);

        info!(component = %lifecycle.name(), "Listening on udp://{}", local_addr);
        Ok(())
    }

    async fn shutdown(&self) {
        self.close().await;
    }
}

impl std::fmt::Debug for MiniserverListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MiniserverListener")
            .field("option", &self.inner.option)
            .field("state", &self.inner.lifecycle.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn peer() -> SocketAddr {
        SocketAddr::from(([192, 168, 1, 77], 50000))
    }

    #[test]
    fn test_name_and_endpoint() {
        let listener = MiniserverListener::new(MiniserverOption::new("192.168.1.77", 7000));
        assert_eq!(listener.name(), "MiniserverListener(192.168.1.77)");
        assert_eq!(
            listener.lifecycle().local_endpoint(),
            Some("udp://0.0.0.0:7000")
        );
        assert_eq!(listener.lifecycle().outdated(), LISTENER_OUTDATED);
    }

    #[test]
    fn test_handle_datagram_dispatch() {
        let listener = MiniserverListener::new(MiniserverOption::new("ms", 7000));
        let statuses = Arc::new(AtomicUsize::new(0));
        let actions = Arc::new(AtomicUsize::new(0));

        let s = statuses.clone();
        listener
            .on_status_message_event()
            .subscribe(move |_, _| {
                s.fetch_add(1, Ordering::SeqCst);
            });
        let a = actions.clone();
        listener
            .on_action_message_event()
            .subscribe(move |_, _| {
                a.fetch_add(1, Ordering::SeqCst);
            });

        listener.handle_datagram(b"home/kitchen/light1/power=on", peer());
        listener.handle_datagram(b"home/kitchen/light1/power/toggle", peer());
        listener.handle_datagram(b"nonsense", peer());
        listener.handle_datagram(&[0xff, 0xfe], peer());

        assert_eq!(statuses.load(Ordering::SeqCst), 1);
        assert_eq!(actions.load(Ordering::SeqCst), 1);

        let metrics = listener.metrics();
        assert_eq!(metrics.received, 4);
        assert_eq!(metrics.malformed, 2);
    }

    #[test]
    fn test_source_is_listener() {
        let listener = MiniserverListener::new(MiniserverOption::new("ms", 7000));
        let seen = Arc::new(Mutex::new(None));
        let s = seen.clone();
        listener
            .on_status_message_event()
            .subscribe(move |source, _| *s.lock() = Some(source.name.clone()));

        listener.handle_datagram(b"a/b/c/d=1", peer());
        assert_eq!(seen.lock().as_deref(), Some("MiniserverListener(ms)"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_receive_error_backs_off() {
        let listener = MiniserverListener::new(MiniserverOption::new("ms", 7000));
        let error = std::io::Error::from(std::io::ErrorKind::ConnectionReset);

        let started = tokio::time::Instant::now();
        listener.inner.on_receive_error(&error).await;
        listener.inner.on_receive_error(&error).await;

        assert!(started.elapsed() >= RECEIVE_ERROR_BACKOFF * 2);
        assert_eq!(listener.metrics().receive_errors, 2);
        assert_eq!(listener.metrics().received, 0);
    }
}
