//! Component lifecycle and liveness tracking.
//!
//! Components hold a [`ComponentLifecycle`] rather than inheriting behaviour.
//! The lifecycle guards against double initialization, records bind/unbind
//! transitions and tracks activity. When an `outdated` window is configured a
//! watchdog task marks the component stale once no activity has been seen for
//! that long.
//!
//! ```text
//! Uninitialized ─▶ Initialized ─▶ Bound ─▶ Active ⇄ Stale
//!                                   │         │
//!                                   └────▶ Unbound ◀┘
//! ```

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::error::Result;
use crate::event::{EventDispatcher, EventSource};

/// Observable state of a component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentState {
    Uninitialized,
    Initialized,
    Bound,
    Active,
    Stale,
    Unbound,
}

impl fmt::Display for ComponentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Uninitialized => "uninitialized",
            Self::Initialized => "initialized",
            Self::Bound => "bound",
            Self::Active => "active",
            Self::Stale => "stale",
            Self::Unbound => "unbound",
        };
        f.write_str(s)
    }
}

/// Construction options for a [`ComponentLifecycle`].
#[derive(Debug, Clone)]
pub struct LifecycleOptions {
    pub name: String,
    pub local_endpoint: Option<String>,
    pub remote_endpoint: Option<String>,
    /// Liveness window. Zero disables staleness tracking.
    pub outdated: Duration,
}

impl LifecycleOptions {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            local_endpoint: None,
            remote_endpoint: None,
            outdated: Duration::ZERO,
        }
    }

    pub fn with_local_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.local_endpoint = Some(endpoint.into());
        self
    }

    pub fn with_remote_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.remote_endpoint = Some(endpoint.into());
        self
    }

    pub fn with_outdated(mut self, outdated: Duration) -> Self {
        self.outdated = outdated;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Uninitialized,
    Initializing,
    Initialized,
}

struct LifecycleInner {
    source: EventSource,
    local_endpoint: Option<String>,
    remote_endpoint: Option<String>,
    outdated: Duration,
    phase: Mutex<Phase>,
    bound: AtomicBool,
    unbound: AtomicBool,
    stale: AtomicBool,
    bound_at: Mutex<Option<Instant>>,
    last_active: Mutex<Option<Instant>>,
    activity: Notify,
    watchdog: Mutex<Option<JoinHandle<()>>>,
    state_changed: EventDispatcher<ComponentState>,
}

/// Shared lifecycle state of one component. Cloning shares the state.
#[derive(Clone)]
pub struct ComponentLifecycle {
    inner: Arc<LifecycleInner>,
}

impl ComponentLifecycle {
    pub fn new(options: LifecycleOptions) -> Self {
        let endpoint = options
            .local_endpoint
            .clone()
            .or_else(|| options.remote_endpoint.clone());
        let mut source = EventSource::new(options.name);
        source.endpoint = endpoint;

        Self {
            inner: Arc::new(LifecycleInner {
                source,
                local_endpoint: options.local_endpoint,
                remote_endpoint: options.remote_endpoint,
                outdated: options.outdated,
                phase: Mutex::new(Phase::Uninitialized),
                bound: AtomicBool::new(false),
                unbound: AtomicBool::new(false),
                stale: AtomicBool::new(false),
                bound_at: Mutex::new(None),
                last_active: Mutex::new(None),
                activity: Notify::new(),
                watchdog: Mutex::new(None),
                state_changed: EventDispatcher::new(),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.source.name
    }

    pub fn source(&self) -> &EventSource {
        &self.inner.source
    }

    pub fn local_endpoint(&self) -> Option<&str> {
        self.inner.local_endpoint.as_deref()
    }

    pub fn remote_endpoint(&self) -> Option<&str> {
        self.inner.remote_endpoint.as_deref()
    }

    pub fn outdated(&self) -> Duration {
        self.inner.outdated
    }

    /// Claim the right to initialize.
    ///
    /// Returns false, after logging a warning, when the component is already
    /// initialized or an initialization is in progress.
    pub fn begin_initialize(&self) -> bool {
        let mut phase = self.inner.phase.lock();
        if *phase != Phase::Uninitialized {
            tracing::warn!(component = %self.name(), "Already initialized.");
            return false;
        }
        *phase = Phase::Initializing;
        true
    }

    pub fn on_initialize(&self) {
        *self.inner.phase.lock() = Phase::Initialized;
        self.emit(ComponentState::Initialized);
    }

    /// Return to uninitialized after a failed attempt so it can be retried.
    pub fn fail_initialize(&self) {
        *self.inner.phase.lock() = Phase::Uninitialized;
    }

    pub fn is_initialized(&self) -> bool {
        *self.inner.phase.lock() == Phase::Initialized
    }

    pub fn on_bind(&self) {
        self.inner.unbound.store(false, Ordering::SeqCst);
        self.inner.bound.store(true, Ordering::SeqCst);
        self.inner.stale.store(false, Ordering::SeqCst);
        *self.inner.bound_at.lock() = Some(Instant::now());
        self.emit(ComponentState::Bound);
        self.start_watchdog();
    }

    pub fn on_unbind(&self) {
        if self.inner.unbound.swap(true, Ordering::SeqCst) {
            return;
        }
        self.inner.bound.store(false, Ordering::SeqCst);
        self.inner.stale.store(false, Ordering::SeqCst);
        self.stop_watchdog();
        self.emit(ComponentState::Unbound);
    }

    /// Record activity. Restarts the liveness window.
    pub fn on_active(&self) {
        let previous = self.state();
        *self.inner.last_active.lock() = Some(Instant::now());
        let was_stale = self.inner.stale.swap(false, Ordering::SeqCst);
        self.inner.activity.notify_one();

        if was_stale || previous == ComponentState::Stale {
            tracing::info!(component = %self.name(), "Activity resumed");
        }
        if previous != ComponentState::Active && previous != ComponentState::Unbound {
            self.emit(ComponentState::Active);
        }
    }

    pub fn state(&self) -> ComponentState {
        let inner = &self.inner;
        if inner.unbound.load(Ordering::SeqCst) {
            return ComponentState::Unbound;
        }
        if *inner.phase.lock() != Phase::Initialized {
            return ComponentState::Uninitialized;
        }
        if let Some(last) = *inner.last_active.lock() {
            if inner.outdated.is_zero() || last.elapsed() < inner.outdated {
                return ComponentState::Active;
            }
            return ComponentState::Stale;
        }
        if inner.bound.load(Ordering::SeqCst) {
            ComponentState::Bound
        } else {
            ComponentState::Initialized
        }
    }

    pub fn is_active(&self) -> bool {
        self.state() == ComponentState::Active
    }

    pub fn is_stale(&self) -> bool {
        self.state() == ComponentState::Stale
    }

    pub fn last_active(&self) -> Option<Instant> {
        *self.inner.last_active.lock()
    }

    /// State transitions raised by this lifecycle.
    pub fn on_state_changed(&self) -> &EventDispatcher<ComponentState> {
        &self.inner.state_changed
    }

    fn emit(&self, state: ComponentState) {
        self.inner.state_changed.dispatch(&self.inner.source, &state);
    }

    fn start_watchdog(&self) {
        if self.inner.outdated.is_zero() {
            return;
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            tracing::debug!(component = %self.name(), "No runtime, liveness watchdog disabled");
            return;
        };

        let lifecycle = self.clone();
        let task = handle.spawn(async move { lifecycle.watch().await });
        if let Some(old) = self.inner.watchdog.lock().replace(task) {
            old.abort();
        }
    }

    fn stop_watchdog(&self) {
        if let Some(task) = self.inner.watchdog.lock().take() {
            task.abort();
        }
    }

    fn deadline(&self) -> Instant {
        let since = self
            .last_active()
            .or(*self.inner.bound_at.lock())
            .unwrap_or_else(Instant::now);
        since + self.inner.outdated
    }

    async fn watch(self) {
        loop {
            let deadline = self.deadline();
            tokio::select! {
                _ = self.inner.activity.notified() => {}
                _ = tokio::time::sleep_until(deadline) => {
                    if Instant::now() < self.deadline() {
                        continue;
                    }
                    if !self.inner.stale.swap(true, Ordering::SeqCst) {
                        tracing::warn!(
                            component = %self.name(),
                            window_secs = self.inner.outdated.as_secs_f64(),
                            "No activity within liveness window, marking stale"
                        );
                        self.emit(ComponentState::Stale);
                    }
                    self.inner.activity.notified().await;
                }
            }
        }
    }
}

impl fmt::Debug for ComponentLifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentLifecycle")
            .field("name", &self.name())
            .field("state", &self.state())
            .finish()
    }
}

/// A bridge component with a managed lifecycle.
#[async_trait]
pub trait Component: Send + Sync {
    fn lifecycle(&self) -> &ComponentLifecycle;

    fn name(&self) -> &str {
        self.lifecycle().name()
    }

    fn is_initialized(&self) -> bool {
        self.lifecycle().is_initialized()
    }

    /// Acquire resources. A second call logs a warning and does nothing.
    async fn initialize(&self) -> Result<()>;

    /// Release resources.
    async fn shutdown(&self);
}
