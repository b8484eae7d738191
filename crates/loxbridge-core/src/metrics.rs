//! Transport counters.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Counters kept by a transport component.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportMetrics {
    /// Messages received.
    pub received: u64,

    /// Bytes received.
    pub bytes_received: u64,

    /// Received messages that could not be decoded.
    pub malformed: u64,

    /// Transport receive failures.
    pub receive_errors: u64,

    /// Messages handed to the transport.
    pub sent: u64,

    /// Bytes handed to the transport.
    pub bytes_sent: u64,

    /// Transport send failures.
    pub send_errors: u64,

    /// Messages dropped before reaching the transport.
    pub dropped: u64,

    /// Last activity timestamp (unix seconds).
    pub last_activity: Option<i64>,
}

/// Shared, cloneable recorder for [`TransportMetrics`].
#[derive(Debug, Clone, Default)]
pub struct TransportMetricsRecorder {
    metrics: Arc<Mutex<TransportMetrics>>,
}

impl TransportMetricsRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> TransportMetrics {
        self.metrics.lock().clone()
    }

    pub fn record_received(&self, bytes: usize) {
        let mut m = self.metrics.lock();
        m.received += 1;
        m.bytes_received += bytes as u64;
        m.last_activity = Some(chrono::Utc::now().timestamp());
    }

    pub fn record_malformed(&self) {
        self.metrics.lock().malformed += 1;
    }

    pub fn record_receive_error(&self) {
        self.metrics.lock().receive_errors += 1;
    }

    pub fn record_sent(&self, bytes: usize) {
        let mut m = self.metrics.lock();
        m.sent += 1;
        m.bytes_sent += bytes as u64;
        m.last_activity = Some(chrono::Utc::now().timestamp());
    }

    pub fn record_send_error(&self) {
        self.metrics.lock().send_errors += 1;
    }

    pub fn record_dropped(&self) {
        self.metrics.lock().dropped += 1;
    }

    pub fn reset(&self) {
        *self.metrics.lock() = TransportMetrics::default();
    }
}
