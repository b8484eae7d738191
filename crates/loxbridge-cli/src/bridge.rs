//! Composition root.
//!
//! ```text
//! Miniserver ──UDP──▶ Listener ──status──▶ bus.publish_status + store.write
//!                              └─action──▶ bus.publish_action
//! bus action event ──▶ Sender ──UDP──▶ Miniserver
//! ```

use std::sync::Arc;

use loxbridge_core::{Component, ComponentLifecycle, ComponentState, MessageBus, SampleStore};
use loxbridge_miniserver::{MiniserverListener, MiniserverSender};
use loxbridge_mqtt::MqttBrokerClient;
use loxbridge_storage::TimeSeriesClient;
use tracing::{error, info, warn};

use crate::config::{BridgeConfig, ConfigError};

/// The wired set of bridge components.
pub struct Bridge {
    bus: Arc<dyn MessageBus>,
    store: Arc<dyn SampleStore>,
    listener: MiniserverListener,
    sender: MiniserverSender,
}

impl Bridge {
    /// Wire the components together and register the action subscription.
    ///
    /// Nothing is started; see [`Bridge::start`].
    pub fn new(
        bus: Arc<dyn MessageBus>,
        store: Arc<dyn SampleStore>,
        listener: MiniserverListener,
        sender: MiniserverSender,
        topic_prefix: &str,
    ) -> Self {
        let b = bus.clone();
        listener
            .on_status_message_event()
            .subscribe(move |_, message| b.publish_status(message));

        let s = store.clone();
        listener
            .on_status_message_event()
            .subscribe(move |_, message| s.write(message));

        let b = bus.clone();
        listener
            .on_action_message_event()
            .subscribe(move |_, message| b.publish_action(message));

        let tx = sender.clone();
        bus.on_action_message_event()
            .subscribe(move |_, message| tx.send_action(message));

        bus.subscribe_action(topic_prefix);

        let bridge = Self {
            bus,
            store,
            listener,
            sender,
        };
        for lifecycle in bridge.lifecycles() {
            log_state_changes(lifecycle);
        }
        bridge
    }

    /// Build the production components from a validated configuration.
    pub fn from_config(config: &BridgeConfig) -> Result<Self, ConfigError> {
        let option = config.miniserver_option()?;

        let bus = Arc::new(MqttBrokerClient::new(config.mqtt.clone()));
        let store = Arc::new(TimeSeriesClient::new(config.store.clone()));
        let listener = MiniserverListener::new(option.clone());
        let sender = MiniserverSender::new(option);

        Ok(Self::new(
            bus,
            store,
            listener,
            sender,
            &config.mqtt.topic_prefix,
        ))
    }

    pub fn listener(&self) -> &MiniserverListener {
        &self.listener
    }

    pub fn sender(&self) -> &MiniserverSender {
        &self.sender
    }

    fn lifecycles(&self) -> [&ComponentLifecycle; 4] {
        [
            self.bus.lifecycle(),
            self.store.lifecycle(),
            self.listener.lifecycle(),
            self.sender.lifecycle(),
        ]
    }

    /// Initialize bus, store, listener and sender, in that order.
    ///
    /// A component that fails to initialize is logged and skipped; the others
    /// still start. Returns the names of the failed components.
    pub async fn start(&self) -> Vec<String> {
        let mut failed = Vec::new();
        initialize(self.bus.as_ref(), &mut failed).await;
        initialize(self.store.as_ref(), &mut failed).await;
        initialize(&self.listener, &mut failed).await;
        initialize(&self.sender, &mut failed).await;

        if failed.is_empty() {
            info!("Bridge started");
        } else {
            warn!(failed = ?failed, "Bridge started with failed components");
        }
        failed
    }

    /// Stop receiving first, then drain and close the outputs.
    pub async fn shutdown(&self) {
        self.listener.shutdown().await;
        self.sender.shutdown().await;
        self.store.shutdown().await;
        self.bus.shutdown().await;
        info!("Bridge stopped");
    }

    /// Current state of every component, in start order.
    pub fn states(&self) -> Vec<(String, ComponentState)> {
        self.lifecycles()
            .iter()
            .map(|l| (l.name().to_string(), l.state()))
            .collect()
    }
}

async fn initialize<C: Component + ?Sized>(component: &C, failed: &mut Vec<String>) {
    if let Err(e) = component.initialize().await {
        error!(component = %component.name(), error = %e, "Initialization failed");
        failed.push(component.name().to_string());
    }
}

fn log_state_changes(lifecycle: &ComponentLifecycle) {
    lifecycle.on_state_changed().subscribe(|source, state| match state {
        ComponentState::Stale | ComponentState::Unbound => {
            warn!(component = %source.name, state = %state, "Component state changed");
        }
        _ => {
            info!(component = %source.name, state = %state, "Component state changed");
        }
    });
}
