//! Synchronous observer lists.
//!
//! Each component owns one [`EventDispatcher`] per event type. Handlers run on
//! the task that raises the event, in subscription order, before `dispatch`
//! returns.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Identifies the component that raised an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventSource {
    /// Component name, e.g. `MiniserverListener(192.168.1.77)`.
    pub name: String,
    /// Endpoint URI, e.g. `udp://0.0.0.0:7000`.
    pub endpoint: Option<String>,
}

impl EventSource {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            endpoint: None,
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }
}

impl fmt::Display for EventSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.endpoint {
            Some(endpoint) => write!(f, "{} [{}]", self.name, endpoint),
            None => f.write_str(&self.name),
        }
    }
}

/// Handle returned by [`EventDispatcher::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Handler<T> = Arc<dyn Fn(&EventSource, &T) + Send + Sync>;

/// An ordered list of event handlers.
pub struct EventDispatcher<T> {
    handlers: RwLock<Vec<(SubscriptionId, Handler<T>)>>,
    next_id: AtomicU64,
}

impl<T> EventDispatcher<T> {
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a handler. Handlers are invoked in registration order.
    pub fn subscribe<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&EventSource, &T) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.handlers.write().push((id, Arc::new(handler)));
        id
    }

    /// Remove a handler. Returns false if it was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut handlers = self.handlers.write();
        let before = handlers.len();
        handlers.retain(|(hid, _)| *hid != id);
        handlers.len() != before
    }

    /// Invoke every handler with the event.
    ///
    /// The handler list is snapshotted first, so a handler may subscribe or
    /// unsubscribe without deadlocking. Changes apply from the next dispatch.
    pub fn dispatch(&self, source: &EventSource, event: &T) {
        let snapshot: Vec<Handler<T>> = self
            .handlers
            .read()
            .iter()
            .map(|(_, h)| Arc::clone(h))
            .collect();

        for handler in snapshot {
            handler(source, event);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.handlers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.read().is_empty()
    }
}

impl<T> Default for EventDispatcher<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for EventDispatcher<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn test_dispatch_in_subscription_order() {
        let dispatcher = EventDispatcher::<u32>::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for tag in ["first", "second", "third"] {
            let seen = seen.clone();
            dispatcher.subscribe(move |_, value: &u32| seen.lock().push((tag, *value)));
        }

        dispatcher.dispatch(&EventSource::new("test"), &7);
        assert_eq!(
            *seen.lock(),
            vec![("first", 7), ("second", 7), ("third", 7)]
        );
    }

    #[test]
    fn test_unsubscribe() {
        let dispatcher = EventDispatcher::<()>::new();
        let count = Arc::new(AtomicU64::new(0));

        let c = count.clone();
        let id = dispatcher.subscribe(move |_, _| {
            c.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(dispatcher.subscriber_count(), 1);

        dispatcher.dispatch(&EventSource::new("test"), &());
        assert!(dispatcher.unsubscribe(id));
        assert!(!dispatcher.unsubscribe(id));
        dispatcher.dispatch(&EventSource::new("test"), &());

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(dispatcher.is_empty());
    }

    #[test]
    fn test_subscribe_from_handler() {
        let dispatcher = Arc::new(EventDispatcher::<()>::new());
        let d = dispatcher.clone();
        dispatcher.subscribe(move |_, _| {
            d.subscribe(|_, _| {});
        });

        dispatcher.dispatch(&EventSource::new("test"), &());
        assert_eq!(dispatcher.subscriber_count(), 2);
    }

    #[test]
    fn test_source_display() {
        let source = EventSource::new("MiniserverListener(10.0.0.2)").with_endpoint("udp://0.0.0.0:7000");
        assert_eq!(
            source.to_string(),
            "MiniserverListener(10.0.0.2) [udp://0.0.0.0:7000]"
        );
    }
}
