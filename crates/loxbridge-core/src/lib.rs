//! Core traits and types for Loxbridge.
//!
//! This crate defines the foundational abstractions shared by the bridge
//! crates:
//!
//! - **Message model**: [`StatusMessage`], [`ActionMessage`] and the
//!   [`MiniserverMessage`] wire classification
//! - **Codec**: pure encode/decode between the Miniserver text format and the
//!   message model
//! - **Events**: [`EventDispatcher`], a synchronous observer list per event type
//! - **Lifecycle**: [`ComponentLifecycle`] (initialize-once guard, bind/unbind,
//!   liveness watchdog) and the [`Component`] trait
//! - **Collaborators**: the [`MessageBus`] and [`SampleStore`] seams used by the
//!   bridge wiring

pub mod bus;
pub mod codec;
pub mod error;
pub mod event;
pub mod lifecycle;
pub mod message;
pub mod metrics;

pub use bus::{MessageBus, SampleStore};
pub use codec::{decode, encode, DecodeError};
pub use error::{Error, Result};
pub use event::{EventDispatcher, EventSource, SubscriptionId};
pub use lifecycle::{Component, ComponentLifecycle, ComponentState, LifecycleOptions};
pub use message::{ActionMessage, MiniserverMessage, StatusMessage};
pub use metrics::{TransportMetrics, TransportMetricsRecorder};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Re-exports commonly used types.
pub mod prelude {
    pub use crate::bus::{MessageBus, SampleStore};
    pub use crate::error::{Error, Result};
    pub use crate::event::{EventDispatcher, EventSource};
    pub use crate::lifecycle::{Component, ComponentLifecycle, ComponentState, LifecycleOptions};
    pub use crate::message::{ActionMessage, MiniserverMessage, StatusMessage};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
