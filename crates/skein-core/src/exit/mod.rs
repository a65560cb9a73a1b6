//! Exit detection
//!
//! Ensures the most recent unsaved snapshot reaches the operation queue and
//! local store even when the process goes away without a clean shutdown
//! path. Host shells feed lifecycle signals in through [`ExitDetector::trigger`];
//! a periodic timer acts as the durable fallback for the signals that never
//! arrive. Handlers run synchronously and must be best-effort — an
//! unload-path flush cannot wait on long async work.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, Weak};
use std::time::Duration;

use crate::config::EngineConfig;
use crate::events::{HandlerId, HandlerRegistry};

/// Lifecycle signal that can force a flush of unsaved state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitEvent {
    /// The surface became hidden (tab switched away, window minimized)
    VisibilityHidden,
    /// The host is about to unload
    BeforeUnload,
    /// The page received its hide signal
    PageHide,
    /// The periodic fallback timer fired
    Periodic,
    /// An explicit `force_save` call
    Manual,
}

impl fmt::Display for ExitEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::VisibilityHidden => write!(f, "VISIBILITY_CHANGE"),
            Self::BeforeUnload => write!(f, "BEFORE_UNLOAD"),
            Self::PageHide => write!(f, "PAGE_HIDE"),
            Self::Periodic => write!(f, "PERIODIC"),
            Self::Manual => write!(f, "MANUAL"),
        }
    }
}

type ExitHandler<T> = dyn Fn(T, ExitEvent) + Send + Sync;

struct ExitState<T> {
    current: Option<T>,
    dirty: bool,
}

struct ExitInner<T> {
    state: StdMutex<ExitState<T>>,
    handlers: HandlerRegistry<ExitHandler<T>>,
    flush_on_visibility_hidden: bool,
    flush_on_before_unload: bool,
    flush_on_page_hide: bool,
    periodic_interval: Option<Duration>,
    confirm_on_exit: bool,
    confirmation_message: String,
    started: AtomicBool,
}

/// Dirty-tracked holder of the latest unsaved snapshot.
///
/// Generic over the snapshot type; the engine instantiates it with its draft
/// snapshot record.
pub struct ExitDetector<T: Clone + Send + Sync + 'static> {
    inner: Arc<ExitInner<T>>,
}

impl<T: Clone + Send + Sync + 'static> Clone for ExitDetector<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> ExitDetector<T> {
    /// Create a detector configured from the engine config.
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            inner: Arc::new(ExitInner {
                state: StdMutex::new(ExitState {
                    current: None,
                    dirty: false,
                }),
                handlers: HandlerRegistry::new(),
                flush_on_visibility_hidden: config.flush_on_visibility_hidden,
                flush_on_before_unload: config.flush_on_before_unload,
                flush_on_page_hide: config.flush_on_page_hide,
                periodic_interval: config.periodic_save_interval,
                confirm_on_exit: config.confirm_on_exit,
                confirmation_message: config.exit_confirmation_message.clone(),
                started: AtomicBool::new(false),
            }),
        }
    }

    /// Record the latest in-memory snapshot and mark state dirty.
    pub fn update_current_data(&self, data: T) {
        let mut state = self.inner.state.lock().expect("exit state poisoned");
        state.current = Some(data);
        state.dirty = true;
    }

    /// Clear the dirty flag. Every flush trigger is a no-op until
    /// `update_current_data` runs again.
    pub fn mark_changes_saved(&self) {
        self.inner
            .state
            .lock()
            .expect("exit state poisoned")
            .dirty = false;
    }

    /// Whether unsaved state is currently held.
    pub fn has_unsaved_changes(&self) -> bool {
        self.inner.state.lock().expect("exit state poisoned").dirty
    }

    /// Subscribe to flushes. Handlers receive the snapshot and the trigger.
    pub fn register_handler(
        &self,
        handler: impl Fn(T, ExitEvent) + Send + Sync + 'static,
    ) -> HandlerId {
        self.inner.handlers.register(Arc::new(handler))
    }

    /// Remove a previously registered handler.
    pub fn unregister_handler(&self, id: HandlerId) -> bool {
        self.inner.handlers.unregister(id)
    }

    /// Feed a lifecycle signal in. Returns the number of handlers invoked —
    /// zero when the trigger is disabled or nothing is unsaved.
    pub fn trigger(&self, event: ExitEvent) -> usize {
        if !self.trigger_enabled(event) {
            return 0;
        }
        self.flush(event)
    }

    /// Flush unconditionally of trigger toggles, still honoring the
    /// already-saved short-circuit.
    pub fn force_save(&self) -> usize {
        self.flush(ExitEvent::Manual)
    }

    /// Start the periodic fallback timer, when configured. Idempotent; must
    /// be called from within a tokio runtime.
    pub fn start_periodic(&self) {
        let Some(interval) = self.inner.periodic_interval else {
            return;
        };
        if self.inner.started.swap(true, Ordering::SeqCst) {
            return;
        }

        let weak: Weak<ExitInner<T>> = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                flush_inner(&inner, ExitEvent::Periodic);
            }
        });
    }

    /// The exit confirmation prompt for host shells, present only while
    /// confirmation is enabled and unsaved state exists.
    pub fn confirmation_message(&self) -> Option<String> {
        if self.inner.confirm_on_exit && self.has_unsaved_changes() {
            Some(self.inner.confirmation_message.clone())
        } else {
            None
        }
    }

    fn trigger_enabled(&self, event: ExitEvent) -> bool {
        match event {
            ExitEvent::VisibilityHidden => self.inner.flush_on_visibility_hidden,
            ExitEvent::BeforeUnload => self.inner.flush_on_before_unload,
            ExitEvent::PageHide => self.inner.flush_on_page_hide,
            ExitEvent::Periodic => self.inner.periodic_interval.is_some(),
            ExitEvent::Manual => true,
        }
    }

    fn flush(&self, event: ExitEvent) -> usize {
        flush_inner(&self.inner, event)
    }
}

/// Shared flush body, reachable from the periodic task without the wrapper.
fn flush_inner<T: Clone + Send + Sync + 'static>(inner: &ExitInner<T>, event: ExitEvent) -> usize {
    let snapshot = {
        let state = inner.state.lock().expect("exit state poisoned");
        if !state.dirty {
            return 0;
        }
        state.current.clone()
    };
    let Some(data) = snapshot else {
        return 0;
    };

    let handlers = inner.handlers.snapshot();
    tracing::debug!(trigger = %event, handlers = handlers.len(), "Flushing unsaved state");
    for handler in &handlers {
        handler(data.clone(), event);
    }
    handlers.len()
}
