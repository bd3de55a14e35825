//! Typed publish/subscribe surface.
//!
//! Listeners register against an event-kind string (or against every kind via
//! [`EventBus::on_any`]). [`EventBus::emit`] runs the listeners for the event's
//! kind synchronously, in the order they were registered, then the wildcard
//! listeners, all on the caller's task.
//!
//! There is no buffering and no replay: an event emitted while nobody listens
//! for its kind is dropped. Subscribe before starting whatever produces the
//! events if none may be missed.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

/// An event that can travel through an [`EventBus`].
pub trait Event: Send + Sync + 'static {
    /// Kind string listeners subscribe to.
    fn kind(&self) -> &str;
}

/// Callback invoked for each delivered event.
pub type Listener<E> = Arc<dyn Fn(&E) + Send + Sync>;

/// Handle returned by registration, used to remove the listener again.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

struct Registration<E> {
    id: ListenerId,
    /// `None` matches every kind.
    kind: Option<String>,
    once: bool,
    listener: Listener<E>,
}

impl<E> Registration<E> {
    fn matches(&self, kind: &str) -> bool {
        self.kind.as_deref().is_none_or(|k| k == kind)
    }
}

/// Synchronous, ordered event registry.
pub struct EventBus<E> {
    registrations: Mutex<Vec<Registration<E>>>,
    next_id: AtomicU64,
    emit_count: AtomicU64,
}

impl<E: Event> EventBus<E> {
    /// Create an empty bus.
    pub fn new() -> Self {
        Self {
            registrations: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            emit_count: AtomicU64::new(0),
        }
    }

    /// Register a listener for every event of `kind`.
    pub fn on(&self, kind: impl Into<String>, listener: impl Fn(&E) + Send + Sync + 'static) -> ListenerId {
        self.register(Some(kind.into()), false, Arc::new(listener))
    }

    /// Register a listener that is removed after its first delivery.
    pub fn once(&self, kind: impl Into<String>, listener: impl Fn(&E) + Send + Sync + 'static) -> ListenerId {
        self.register(Some(kind.into()), true, Arc::new(listener))
    }

    /// Register a listener for events of any kind.
    pub fn on_any(&self, listener: impl Fn(&E) + Send + Sync + 'static) -> ListenerId {
        self.register(None, false, Arc::new(listener))
    }

    /// Remove a listener. Returns `false` if it was already gone.
    pub fn off(&self, id: ListenerId) -> bool {
        let mut registrations = self.registrations.lock();
        let before = registrations.len();
        registrations.retain(|r| r.id != id);
        registrations.len() != before
    }

    /// Remove every listener registered for `kind` (wildcards are kept).
    pub fn off_kind(&self, kind: &str) -> usize {
        let mut registrations = self.registrations.lock();
        let before = registrations.len();
        registrations.retain(|r| r.kind.as_deref() != Some(kind));
        before - registrations.len()
    }

    /// Deliver `event` to the listeners of its kind, then to wildcard
    /// listeners, each group in registration order.
    ///
    /// Returns the number of listeners invoked. The registry lock is released
    /// before any listener runs, so listeners may call back into the bus.
    pub fn emit(&self, event: &E) -> usize {
        let _ = self.emit_count.fetch_add(1, Ordering::Relaxed);
        let kind = event.kind();

        let targets: Vec<Listener<E>> = {
            let mut registrations = self.registrations.lock();
            let targets = registrations
                .iter()
                .filter(|r| r.kind.as_deref() == Some(kind))
                .chain(registrations.iter().filter(|r| r.kind.is_none()))
                .map(|r| Arc::clone(&r.listener))
                .collect();
            registrations.retain(|r| !(r.once && r.matches(kind)));
            targets
        };

        for listener in &targets {
            listener(event);
        }
        targets.len()
    }

    /// Number of listeners that would receive an event of `kind`.
    pub fn listener_count(&self, kind: &str) -> usize {
        self.registrations
            .lock()
            .iter()
            .filter(|r| r.matches(kind))
            .count()
    }

    /// Total number of events emitted, delivered or not.
    pub fn emit_count(&self) -> u64 {
        self.emit_count.load(Ordering::Relaxed)
    }

    fn register(&self, kind: Option<String>, once: bool, listener: Listener<E>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.registrations.lock().push(Registration {
            id,
            kind,
            once,
            listener,
        });
        id
    }
}

impl<E: Event> Default for EventBus<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> std::fmt::Debug for EventBus<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.registrations.lock().len())
            .field("emit_count", &self.emit_count.load(Ordering::Relaxed))
            .finish()
    }
}
