//! Publish/subscribe event registry.
//!
//! Listeners are registered per event kind (or for every kind) and invoked
//! synchronously, in registration order, on the task that emitted the event.
//! The registry lock is never held while a listener runs, so listeners may
//! register or unregister other listeners.

use crate::connection::ConnectionState;
use crate::error::ErrorCategory;
use crate::message::InboundMessage;
use crate::metrics::PerformanceMetrics;
use parking_lot::RwLock;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// An event that can be routed by kind.
pub trait Event: Send + Sync + 'static {
    type Kind: Copy + Eq + Hash + Debug + Send + Sync + 'static;

    fn kind(&self) -> Self::Kind;
}

/// Handle returned by registration, used to unregister.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Callback<E> = Arc<dyn Fn(&E) + Send + Sync>;

struct Listener<E: Event> {
    id: ListenerId,
    kind: Option<E::Kind>,
    callback: Callback<E>,
}

/// Event registry owned by a component instance.
pub struct EventEmitter<E: Event> {
    next_id: AtomicU64,
    listeners: RwLock<Vec<Listener<E>>>,
}

impl<E: Event> Default for EventEmitter<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Event> EventEmitter<E> {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            listeners: RwLock::new(Vec::new()),
        }
    }

    /// Register `callback` for events of `kind`.
    pub fn on<F>(&self, kind: E::Kind, callback: F) -> ListenerId
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        self.register(Some(kind), Arc::new(callback))
    }

    /// Register `callback` for every event.
    pub fn on_any<F>(&self, callback: F) -> ListenerId
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        self.register(None, Arc::new(callback))
    }

    /// Forward matching events into an unbounded channel.
    ///
    /// The listener unregisters itself lazily: once the receiver is dropped
    /// sends fail silently until [`EventEmitter::off`] is called.
    pub fn channel(&self, kind: Option<E::Kind>) -> (ListenerId, mpsc::UnboundedReceiver<E>)
    where
        E: Clone,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.register(
            kind,
            Arc::new(move |event: &E| {
                let _ = tx.send(event.clone());
            }),
        );
        (id, rx)
    }

    fn register(&self, kind: Option<E::Kind>, callback: Callback<E>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.write().push(Listener { id, kind, callback });
        id
    }

    /// Unregister a listener. Returns `false` if it was not registered.
    pub fn off(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|l| l.id != id);
        listeners.len() != before
    }

    /// Deliver `event` to every matching listener.
    pub fn emit(&self, event: &E) {
        let kind = event.kind();
        let targets: Vec<Callback<E>> = self
            .listeners
            .read()
            .iter()
            .filter(|l| l.kind.map_or(true, |k| k == kind))
            .map(|l| l.callback.clone())
            .collect();

        for callback in targets {
            callback(event);
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    pub fn has_listeners(&self, kind: E::Kind) -> bool {
        self.listeners
            .read()
            .iter()
            .any(|l| l.kind.map_or(true, |k| k == kind))
    }

    pub fn clear(&self) {
        self.listeners.write().clear();
    }
}

/// Non-fatal quality or capacity signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionWarning {
    /// Heartbeat send latency exceeded the quality threshold.
    HighLatency { latency_ms: u64 },
    /// Outbound queue full; further sends are dropped until reconnect.
    OutboundQueueFull { capacity: usize },
    /// Inbound ring started evicting its oldest entries.
    InboundBufferFull { capacity: usize },
    /// Processing queue crossed the threshold; inbound messages are dropped.
    Backpressure { queued: usize, threshold: usize },
}

/// Error delivered as an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorEvent {
    pub category: ErrorCategory,
    pub message: String,
}

/// Events emitted by the connection manager.
#[derive(Debug, Clone)]
pub enum ConnectionEvent {
    StatusChanged {
        previous: ConnectionState,
        current: ConnectionState,
    },
    Message(InboundMessage),
    Error(ErrorEvent),
    PerformanceUpdate(PerformanceMetrics),
    Heartbeat { latency_ms: u64 },
    Warning(ConnectionWarning),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionEventKind {
    StatusChanged,
    Message,
    Error,
    PerformanceUpdate,
    Heartbeat,
    Warning,
}

impl Event for ConnectionEvent {
    type Kind = ConnectionEventKind;

    fn kind(&self) -> ConnectionEventKind {
        match self {
            Self::StatusChanged { .. } => ConnectionEventKind::StatusChanged,
            Self::Message(_) => ConnectionEventKind::Message,
            Self::Error(_) => ConnectionEventKind::Error,
            Self::PerformanceUpdate(_) => ConnectionEventKind::PerformanceUpdate,
            Self::Heartbeat { .. } => ConnectionEventKind::Heartbeat,
            Self::Warning(_) => ConnectionEventKind::Warning,
        }
    }
}
