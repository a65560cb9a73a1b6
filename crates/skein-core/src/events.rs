//! Typed handler registration shared by the observable services.
//!
//! Network Monitor, Exit Detection, and the Sync Service all notify
//! subscribers through plain handler lists. Rust closures have no stable
//! identity, so registration hands back a [`HandlerId`] token that
//! `unregister` consumes.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Token returned by handler registration; pass it back to unregister.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

/// A list of subscribed handlers with token-based removal.
pub(crate) struct HandlerRegistry<F: ?Sized> {
    next_id: AtomicU64,
    handlers: Mutex<Vec<(u64, Arc<F>)>>,
}

impl<F: ?Sized> HandlerRegistry<F> {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            handlers: Mutex::new(Vec::new()),
        }
    }

    /// Add a handler and return its removal token.
    pub fn register(&self, handler: Arc<F>) -> HandlerId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.handlers
            .lock()
            .expect("handler registry poisoned")
            .push((id, handler));
        HandlerId(id)
    }

    /// Remove a handler; returns whether it was present.
    pub fn unregister(&self, id: HandlerId) -> bool {
        let mut handlers = self.handlers.lock().expect("handler registry poisoned");
        let before = handlers.len();
        handlers.retain(|(handler_id, _)| *handler_id != id.0);
        handlers.len() != before
    }

    /// Snapshot the current handlers for invocation outside the lock.
    pub fn snapshot(&self) -> Vec<Arc<F>> {
        self.handlers
            .lock()
            .expect("handler registry poisoned")
            .iter()
            .map(|(_, handler)| Arc::clone(handler))
            .collect()
    }
}
