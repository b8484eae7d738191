//! MQTT bus client using rumqttc.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use loxbridge_core::{
    ActionMessage, Component, ComponentLifecycle, EventDispatcher, LifecycleOptions, MessageBus,
    StatusMessage, TransportMetrics, TransportMetricsRecorder,
};
use parking_lot::Mutex;
use rumqttc::{AsyncClient, Event, EventLoop, Outgoing, Packet};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::MqttConfig;
use crate::topic;

/// How long shutdown waits for the event loop to flush the disconnect.
const DISCONNECT_TIMEOUT: Duration = Duration::from_secs(2);

struct BusInner {
    config: MqttConfig,
    lifecycle: ComponentLifecycle,
    client: Mutex<Option<AsyncClient>>,
    connected: AtomicBool,
    prefixes: Mutex<Vec<String>>,
    action_event: EventDispatcher<ActionMessage>,
    metrics: TransportMetricsRecorder,
    task: Mutex<Option<JoinHandle<()>>>,
}

/// Message bus client publishing Miniserver messages to an MQTT broker.
///
/// Publishing is fire-and-forget: while the broker connection is down,
/// messages are dropped with a warning.
#[derive(Clone)]
pub struct MqttBrokerClient {
    inner: Arc<BusInner>,
}

impl MqttBrokerClient {
    pub fn new(config: MqttConfig) -> Self {
        let lifecycle = ComponentLifecycle::new(
            LifecycleOptions::new(format!("MqttBrokerClient({})", config.broker))
                .with_remote_endpoint(format!("mqtt://{}", config.broker_addr())),
        );

        Self {
            inner: Arc::new(BusInner {
                config,
                lifecycle,
                client: Mutex::new(None),
                connected: AtomicBool::new(false),
                prefixes: Mutex::new(Vec::new()),
                action_event: EventDispatcher::new(),
                metrics: TransportMetricsRecorder::new(),
                task: Mutex::new(None),
            }),
        }
    }

    pub fn config(&self) -> &MqttConfig {
        &self.inner.config
    }

    pub fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::SeqCst)
    }

    /// Prefixes registered through `subscribe_action`.
    pub fn action_prefixes(&self) -> Vec<String> {
        self.inner.prefixes.lock().clone()
    }

    /// `sent` counts publishes, `received` inbound actions.
    pub fn metrics(&self) -> TransportMetrics {
        self.inner.metrics.snapshot()
    }

    /// Handle an inbound publish.
    pub fn handle_publish(&self, topic: &str, payload: &[u8]) {
        self.inner.handle_publish(topic, payload);
    }

    fn publish(&self, kind: &str, topic: String, payload: &str, retain: bool) {
        let client = self.inner.client.lock().clone();
        let client = match client {
            Some(client) if self.is_connected() => client,
            _ => {
                warn!(
                    component = %self.name(),
                    topic = %topic,
                    "Not connected, unable to publish a {} message.",
                    kind
                );
                self.inner.metrics.record_dropped();
                return;
            }
        };

        let qos = self.inner.config.qos.into();
        match client.try_publish(topic.as_str(), qos, retain, payload.as_bytes().to_vec()) {
            Ok(()) => self.inner.metrics.record_sent(payload.len()),
            Err(e) => {
                warn!(component = %self.name(), topic = %topic, error = %e, "Publish dropped");
                self.inner.metrics.record_dropped();
            }
        }
    }
}

impl BusInner {
    fn handle_publish(&self, topic: &str, payload: &[u8]) {
        self.lifecycle.on_active();
        match topic::parse_action_topic(topic, payload) {
            Some(action) => {
                self.metrics.record_received(payload.len());
                self.action_event.dispatch(self.lifecycle.source(), &action);
            }
            None => {
                debug!(component = %self.lifecycle.name(), topic = %topic, "Ignoring publish");
            }
        }
    }

    fn subscribe(&self, client: &AsyncClient, prefix: &str) {
        let filter = topic::action_filter(prefix);
        match client.try_subscribe(filter.as_str(), self.config.qos.into()) {
            Ok(()) => info!(component = %self.lifecycle.name(), "Subscribed to {}", filter),
            Err(e) => {
                warn!(component = %self.lifecycle.name(), error = %e, "Failed to subscribe to {}", filter)
            }
        }
    }

    fn on_connected(&self) {
        self.connected.store(true, Ordering::SeqCst);
        self.lifecycle.on_bind();
        self.lifecycle.on_active();

        let client = self.client.lock().clone();
        if let Some(client) = client {
            let prefixes = self.prefixes.lock().clone();
            for prefix in &prefixes {
                self.subscribe(&client, prefix);
            }
        }
    }

    fn on_disconnected(&self) {
        if self.connected.swap(false, Ordering::SeqCst) {
            self.lifecycle.on_unbind();
        }
    }
}

async fn event_loop(inner: Arc<BusInner>, mut eventloop: EventLoop) {
    let reconnect_interval = Duration::from_millis(inner.config.reconnect_interval_ms);

    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                info!(
                    component = %inner.lifecycle.name(),
                    "MQTT broker {} connection acknowledged",
                    inner.config.broker_addr()
                );
                inner.on_connected();
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                inner.handle_publish(&publish.topic, &publish.payload);
            }
            Ok(Event::Incoming(Packet::PingResp)) => inner.lifecycle.on_active(),
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                inner.on_disconnected();
                break;
            }
            Ok(_) => {}
            Err(e) => {
                inner.on_disconnected();
                error!(
                    component = %inner.lifecycle.name(),
                    error = %e,
                    "MQTT broker {} connection error, retrying in {:?}",
                    inner.config.broker_addr(),
                    reconnect_interval
                );
                tokio::time::sleep(reconnect_interval).await;
            }
        }
    }

    debug!(component = %inner.lifecycle.name(), "MQTT event loop stopped");
}

#[async_trait]
impl Component for MqttBrokerClient {
    fn lifecycle(&self) -> &ComponentLifecycle {
        &self.inner.lifecycle
    }

    async fn initialize(&self) -> loxbridge_core::Result<()> {
        let lifecycle = &self.inner.lifecycle;
        if !lifecycle.begin_initialize() {
            return Ok(());
        }

        if let Err(e) = self.inner.config.validate() {
            error!(component = %lifecycle.name(), error = %e, "Invalid MQTT configuration");
            lifecycle.fail_initialize();
            return Err(e.into());
        }

        let options = self.inner.config.mqtt_options();
        let (client, eventloop) = AsyncClient::new(options, self.inner.config.request_capacity.max(1));
        *self.inner.client.lock() = Some(client);

        let task = tokio::spawn(event_loop(self.inner.clone(), eventloop));
        *self.inner.task.lock() = Some(task);

        lifecycle.on_initialize();
        info!(
            component = %lifecycle.name(),
            "Connecting to MQTT broker {}",
            self.inner.config.broker_addr()
        );
        Ok(())
    }

    async fn shutdown(&self) {
        let client = self.inner.client.lock().take();
        let task = self.inner.task.lock().take();

        if let Some(mut task) = task {
            let disconnecting = match client {
                Some(client) if self.is_connected() => client.try_disconnect().is_ok(),
                _ => false,
            };
            if !disconnecting
                || tokio::time::timeout(DISCONNECT_TIMEOUT, &mut task).await.is_err()
            {
                task.abort();
            }
        }
        self.inner.on_disconnected();
    }
}

impl MessageBus for MqttBrokerClient {
    fn publish_status(&self, message: &StatusMessage) {
        let retain = self.inner.config.retain_status;
        self.publish("status", topic::status_topic(message), &message.value, retain);
    }

    fn publish_action(&self, message: &ActionMessage) {
        self.publish("action", topic::action_topic(message), &message.action, false);
    }

    fn subscribe_action(&self, topic_prefix: &str) {
        {
            let mut prefixes = self.inner.prefixes.lock();
            if prefixes.iter().any(|p| p == topic_prefix) {
                return;
            }
            prefixes.push(topic_prefix.to_string());
        }

        if self.is_connected() {
            let client = self.inner.client.lock().clone();
            if let Some(client) = client {
                self.inner.subscribe(&client, topic_prefix);
            }
        }
    }

    fn on_action_message_event(&self) -> &EventDispatcher<ActionMessage> {
        &self.inner.action_event
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_before_initialize_is_dropped() {
        let client = MqttBrokerClient::new(MqttConfig::new("localhost"));
        client.publish_status(&StatusMessage::new("home", "kitchen", "light1", "power", "on"));
        client.publish_action(&ActionMessage::new("home", "kitchen", "light1", "power", "toggle"));
        assert_eq!(client.metrics().dropped, 2);
        assert_eq!(client.metrics().sent, 0);
    }

    #[test]
    fn test_subscribe_action_deduplicates() {
        let client = MqttBrokerClient::new(MqttConfig::new("localhost"));
        client.subscribe_action("loxone");
        client.subscribe_action("loxone");
        client.subscribe_action("garage");
        assert_eq!(client.action_prefixes(), vec!["loxone", "garage"]);
    }

    #[test]
    fn test_inbound_action_dispatch() {
        let client = MqttBrokerClient::new(MqttConfig::new("localhost"));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = seen.clone();
        client
            .on_action_message_event()
            .subscribe(move |_, action: &ActionMessage| s.lock().push(action.clone()));

        client.handle_publish("action/loxone/kitchen/light1/power", b"toggle");
        client.handle_publish("status/loxone/kitchen/light1/power", b"on");

        assert_eq!(
            *seen.lock(),
            vec![ActionMessage::new("loxone", "kitchen", "light1", "power", "toggle")]
        );
        assert_eq!(client.metrics().received, 1);
    }
}
