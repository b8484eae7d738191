//! Store client used by the bridge.
//!
//! [`TimeSeriesClient::write`] never blocks the caller. Messages are handed to
//! a single writer task that owns all database writes.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use loxbridge_core::{
    Component, ComponentLifecycle, LifecycleOptions, SampleStore, StatusMessage,
    TransportMetrics, TransportMetricsRecorder,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::timeseries::TimeSeriesStore;

/// How often retention is applied.
pub const RETENTION_INTERVAL: Duration = Duration::from_secs(3600);

/// Store configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreConfig {
    /// Database file.
    #[serde(default = "default_path")]
    pub path: PathBuf,

    /// Keep samples for this many hours. `None` keeps everything.
    #[serde(default)]
    pub retention_hours: Option<u64>,

    /// Messages waiting for the writer task.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Keep the database in memory instead of `path`.
    #[serde(default)]
    pub in_memory: bool,
}

fn default_path() -> PathBuf {
    PathBuf::from("loxbridge.redb")
}

fn default_queue_capacity() -> usize {
    4096
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_path(),
            retention_hours: None,
            queue_capacity: default_queue_capacity(),
            in_memory: false,
        }
    }
}

impl StoreConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    pub fn memory() -> Self {
        Self {
            in_memory: true,
            ..Default::default()
        }
    }

    pub fn with_retention_hours(mut self, hours: u64) -> Self {
        self.retention_hours = Some(hours);
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    fn endpoint(&self) -> String {
        if self.in_memory {
            "redb://memory".to_string()
        } else {
            format!("redb://{}", self.path.display())
        }
    }
}

struct ClientInner {
    config: StoreConfig,
    lifecycle: ComponentLifecycle,
    metrics: TransportMetricsRecorder,
    store: Mutex<Option<Arc<TimeSeriesStore>>>,
    queue: Mutex<Option<mpsc::Sender<StatusMessage>>>,
    writer: Mutex<Option<JoinHandle<()>>>,
    retention: Mutex<Option<JoinHandle<()>>>,
}

/// Fire-and-forget writer of status samples.
#[derive(Clone)]
pub struct TimeSeriesClient {
    inner: Arc<ClientInner>,
}

impl TimeSeriesClient {
    pub fn new(config: StoreConfig) -> Self {
        let lifecycle = ComponentLifecycle::new(
            LifecycleOptions::new("TimeSeriesClient").with_local_endpoint(config.endpoint()),
        );

        Self {
            inner: Arc::new(ClientInner {
                config,
                lifecycle,
                metrics: TransportMetricsRecorder::new(),
                store: Mutex::new(None),
                queue: Mutex::new(None),
                writer: Mutex::new(None),
                retention: Mutex::new(None),
            }),
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    /// The open store, once initialized.
    pub fn store(&self) -> Option<Arc<TimeSeriesStore>> {
        self.inner.store.lock().clone()
    }

    /// `sent` counts written samples, `send_errors` failed writes.
    pub fn metrics(&self) -> TransportMetrics {
        self.inner.metrics.snapshot()
    }

    fn open_store(&self) -> crate::Result<TimeSeriesStore> {
        if self.inner.config.in_memory {
            TimeSeriesStore::memory()
        } else {
            TimeSeriesStore::open(&self.inner.config.path)
        }
    }
}

async fn write_loop(
    inner: Arc<ClientInner>,
    store: Arc<TimeSeriesStore>,
    mut rx: mpsc::Receiver<StatusMessage>,
) {
    let mut last_timestamp = i64::MIN;

    while let Some(message) = rx.recv().await {
        // Keep keys unique when several messages share a microsecond.
        let timestamp = chrono::Utc::now().timestamp_micros().max(last_timestamp + 1);
        last_timestamp = timestamp;

        match store.write_status(&message, timestamp).await {
            Ok(()) => {
                inner.metrics.record_sent(message.value.len());
                inner.lifecycle.on_active();
            }
            Err(e) => {
                inner.metrics.record_send_error();
                error!(
                    component = %inner.lifecycle.name(),
                    series = %message.path(),
                    error = %e,
                    "Failed to write sample"
                );
            }
        }
    }

    debug!(component = %inner.lifecycle.name(), "Writer queue closed");
}

async fn retention_loop(inner: Arc<ClientInner>, store: Arc<TimeSeriesStore>, hours: u64) {
    let window_us = (hours as i64).saturating_mul(3_600_000_000);
    let mut interval = tokio::time::interval(RETENTION_INTERVAL);

    loop {
        interval.tick().await;
        let cutoff = chrono::Utc::now().timestamp_micros().saturating_sub(window_us);
        match store.delete_before(cutoff).await {
            Ok(0) => {}
            Ok(count) => {
                info!(component = %inner.lifecycle.name(), count, "Pruned samples older than {}h", hours);
            }
            Err(e) => {
                error!(component = %inner.lifecycle.name(), error = %e, "Retention pass failed");
            }
        }
    }
}

#[async_trait]
impl Component for TimeSeriesClient {
    fn lifecycle(&self) -> &ComponentLifecycle {
        &self.inner.lifecycle
    }

    async fn initialize(&self) -> loxbridge_core::Result<()> {
        let lifecycle = &self.inner.lifecycle;
        if !lifecycle.begin_initialize() {
            return Ok(());
        }

        let store = match self.open_store() {
            Ok(store) => Arc::new(store),
            Err(e) => {
                error!(component = %lifecycle.name(), error = %e, "Failed to open store");
                lifecycle.fail_initialize();
                return Err(e.into());
            }
        };
        *self.inner.store.lock() = Some(store.clone());

        let (tx, rx) = mpsc::channel(self.inner.config.queue_capacity.max(1));
        let writer = tokio::spawn(write_loop(self.inner.clone(), store.clone(), rx));
        *self.inner.writer.lock() = Some(writer);
        *self.inner.queue.lock() = Some(tx);

        if let Some(hours) = self.inner.config.retention_hours {
            let retention = tokio::spawn(retention_loop(self.inner.clone(), store, hours));
            *self.inner.retention.lock() = Some(retention);
        }

        lifecycle.on_initialize();
        lifecycle.on_bind();
        info!(
            component = %lifecycle.name(),
            retention_hours = ?self.inner.config.retention_hours,
            "Store opened at {}",
            self.inner.config.endpoint()
        );
        Ok(())
    }

    async fn shutdown(&self) {
        self.inner.queue.lock().take();
        if let Some(retention) = self.inner.retention.lock().take() {
            retention.abort();
        }
        let writer = self.inner.writer.lock().take();
        if let Some(writer) = writer {
            if let Err(e) = writer.await {
                error!(component = %self.name(), error = %e, "Writer task failed");
            }
            self.inner.lifecycle.on_unbind();
        }
    }
}

impl SampleStore for TimeSeriesClient {
    fn write(&self, message: &StatusMessage) {
        let queue = self.inner.queue.lock().clone();
        let Some(queue) = queue else {
            warn!(
                component = %self.name(),
                "Not initialized, unable to write a status message."
            );
            self.inner.metrics.record_dropped();
            return;
        };

        match queue.try_send(message.clone()) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!(component = %self.name(), series = %message.path(), "Write queue full, dropping sample");
                self.inner.metrics.record_dropped();
            }
            Err(TrySendError::Closed(_)) => {
                warn!(component = %self.name(), series = %message.path(), "Store closed, dropping sample");
                self.inner.metrics.record_dropped();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config: StoreConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, StoreConfig::default());
        assert_eq!(config.path, PathBuf::from("loxbridge.redb"));
        assert!(config.retention_hours.is_none());

        let config: StoreConfig =
            serde_json::from_str(r#"{"path": "/var/lib/lox.redb", "retentionHours": 720}"#).unwrap();
        assert_eq!(config.retention_hours, Some(720));
    }

    #[test]
    fn test_write_before_initialize_is_dropped() {
        let client = TimeSeriesClient::new(StoreConfig::memory());
        client.write(&StatusMessage::new("home", "kitchen", "light1", "power", "on"));
        assert_eq!(client.metrics().dropped, 1);
        assert!(client.store().is_none());
    }

    #[test]
    fn test_endpoint() {
        let client = TimeSeriesClient::new(StoreConfig::new("data/lox.redb"));
        assert_eq!(client.lifecycle().local_endpoint(), Some("redb://data/lox.redb"));
    }
}
