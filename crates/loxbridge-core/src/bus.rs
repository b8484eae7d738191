//! Collaborator seams consumed by the bridge wiring.
//!
//! Both collaborators are fire-and-forget: calls never block and never fail
//! towards the caller. A message that cannot be forwarded is dropped with a
//! logged warning.

use crate::event::EventDispatcher;
use crate::lifecycle::Component;
use crate::message::{ActionMessage, StatusMessage};

/// Smart-home message bus client.
pub trait MessageBus: Component {
    /// Publish a device state change.
    fn publish_status(&self, message: &StatusMessage);

    /// Publish an action the Miniserver requested.
    fn publish_action(&self, message: &ActionMessage);

    /// Start receiving actions addressed to `topic_prefix`.
    ///
    /// May be called before `initialize`; the subscription is applied once the
    /// bus is connected.
    fn subscribe_action(&self, topic_prefix: &str);

    /// Actions received from the bus.
    fn on_action_message_event(&self) -> &EventDispatcher<ActionMessage>;
}

/// Time-series store client.
pub trait SampleStore: Component {
    fn write(&self, message: &StatusMessage);
}
