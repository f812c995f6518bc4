//! The bridge event bus.
//!
//! Topic-keyed listeners plus a wildcard list. Emission is synchronous so
//! per-request ordering matches the request lifecycle; listener panics are
//! swallowed and logged so observation can never break a request.

use std::sync::{
    Arc, Weak,
    atomic::{AtomicU64, Ordering},
};

use parking_lot::Mutex;
use tracing::warn;
use weft_ir::ErrorCode;

/// Everything a bridge announces about its requests.
#[derive(Debug, Clone)]
pub enum BridgeEvent {
    RequestStart { request_id: String },
    RequestSuccess { request_id: String, latency_ms: u128 },
    RequestError { request_id: String, code: ErrorCode },
    RequestCancelled { request_id: String },

    StreamStart { request_id: String },
    StreamChunk { request_id: String, sequence: u64 },
    StreamComplete { request_id: String },
    StreamError { request_id: String, code: ErrorCode },

    BackendSelected { request_id: String, backend: String },
    BackendFailover { request_id: String, from: String, to: String },

    MiddlewareExecuted { request_id: String, name: String },
}

/// Subscription topics, one per event variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    RequestStart,
    RequestSuccess,
    RequestError,
    RequestCancelled,
    StreamStart,
    StreamChunk,
    StreamComplete,
    StreamError,
    BackendSelected,
    BackendFailover,
    MiddlewareExecuted,
}

impl EventKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RequestStart => "request:start",
            Self::RequestSuccess => "request:success",
            Self::RequestError => "request:error",
            Self::RequestCancelled => "request:cancelled",
            Self::StreamStart => "stream:start",
            Self::StreamChunk => "stream:chunk",
            Self::StreamComplete => "stream:complete",
            Self::StreamError => "stream:error",
            Self::BackendSelected => "backend:selected",
            Self::BackendFailover => "backend:failover",
            Self::MiddlewareExecuted => "middleware:executed",
        }
    }
}

impl BridgeEvent {
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self {
            Self::RequestStart { .. } => EventKind::RequestStart,
            Self::RequestSuccess { .. } => EventKind::RequestSuccess,
            Self::RequestError { .. } => EventKind::RequestError,
            Self::RequestCancelled { .. } => EventKind::RequestCancelled,
            Self::StreamStart { .. } => EventKind::StreamStart,
            Self::StreamChunk { .. } => EventKind::StreamChunk,
            Self::StreamComplete { .. } => EventKind::StreamComplete,
            Self::StreamError { .. } => EventKind::StreamError,
            Self::BackendSelected { .. } => EventKind::BackendSelected,
            Self::BackendFailover { .. } => EventKind::BackendFailover,
            Self::MiddlewareExecuted { .. } => EventKind::MiddlewareExecuted,
        }
    }
}

pub type Listener = Arc<dyn Fn(&BridgeEvent) + Send + Sync>;

struct Registration {
    id: u64,
    /// `None` subscribes to every event.
    kind: Option<EventKind>,
    once: bool,
    listener: Listener,
}

#[derive(Default)]
struct BusInner {
    registrations: Mutex<Vec<Registration>>,
    next_id: AtomicU64,
}

/// Cheaply cloneable; clones share the listener registry.
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl EventBus {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Listen for one event kind. The returned [`Subscription`] is the
    /// disposer.
    pub fn on(&self, kind: EventKind, listener: Listener) -> Subscription {
        self.subscribe(Some(kind), false, listener)
    }

    /// Listen for every event.
    pub fn on_any(&self, listener: Listener) -> Subscription {
        self.subscribe(None, false, listener)
    }

    /// Self-removing listener: fires at most once.
    pub fn once(&self, kind: EventKind, listener: Listener) -> Subscription {
        self.subscribe(Some(kind), true, listener)
    }

    fn subscribe(&self, kind: Option<EventKind>, once: bool, listener: Listener) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        self.inner.registrations.lock().push(Registration {
            id,
            kind,
            once,
            listener,
        });

        Subscription {
            inner: Arc::downgrade(&self.inner),
            id,
        }
    }

    /// Fire-and-forget emission. Matching `once` listeners are removed
    /// before invocation; listener panics are logged and swallowed.
    pub fn emit(&self, event: &BridgeEvent) {
        let kind = event.kind();

        let matching: Vec<Listener> = {
            let mut registrations = self.inner.registrations.lock();
            let matching = registrations
                .iter()
                .filter(|r| r.kind.is_none_or(|k| k == kind))
                .map(|r| Arc::clone(&r.listener))
                .collect();
            registrations.retain(|r| !(r.once && r.kind.is_none_or(|k| k == kind)));
            matching
        };

        for listener in matching {
            let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                listener(event);
            }));
            if outcome.is_err() {
                warn!(event = kind.as_str(), "Event listener panicked; ignoring.");
            }
        }
    }

    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.inner.registrations.lock().len()
    }
}

/// Disposer for a registered listener. Dropping it does nothing; call
/// [`Subscription::dispose`] to unsubscribe.
pub struct Subscription {
    inner: Weak<BusInner>,
    id: u64,
}

impl Subscription {
    pub fn dispose(self) {
        if let Some(inner) = self.inner.upgrade() {
            inner.registrations.lock().retain(|r| r.id != self.id);
        }
    }
}
