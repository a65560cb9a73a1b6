//! Network monitor
//!
//! A single source of truth for connectivity that smooths over noisy
//! platform signals: heartbeat probes confirm what the platform claims, a
//! cancellable deadline bounds hung probes, and subscribers hear about
//! transitions exactly once. Scheduled passes never propagate errors —
//! failures become status, per the engine's background-pass rule.

mod probe;

pub use probe::HttpProbe;

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, Weak};
use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::config::EngineConfig;
use crate::error::Result;
use crate::events::{HandlerId, HandlerRegistry};

/// Connectivity state as the monitor understands it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// The remote service is reachable
    Online,
    /// The remote service is not reachable
    Offline,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Online => write!(f, "ONLINE"),
            Self::Offline => write!(f, "OFFLINE"),
        }
    }
}

/// The kind of transition a notification describes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkEvent {
    /// Any transition between states
    StatusChange,
    /// Specifically an Offline -> Online transition
    Reconnected,
}

/// Point-in-time view of the monitor's bookkeeping
#[derive(Debug, Clone)]
pub struct StatusSnapshot {
    /// Current state
    pub status: ConnectionStatus,
    /// Heartbeat failures since the last success
    pub consecutive_failures: u32,
    /// When the state last changed
    pub last_transition: Option<Instant>,
    /// When the last Offline -> Online transition happened
    pub last_reconnect: Option<Instant>,
}

/// One lightweight reachability check. `Err` means unreachable.
#[async_trait]
pub trait ConnectivityProbe: Send + Sync {
    async fn check(&self) -> Result<()>;
}

type StatusHandler = dyn Fn(ConnectionStatus, NetworkEvent) + Send + Sync;

struct MonitorState {
    status: ConnectionStatus,
    consecutive_failures: u32,
    last_transition: Option<Instant>,
    last_reconnect: Option<Instant>,
}

struct MonitorInner {
    probe: Arc<dyn ConnectivityProbe>,
    heartbeat_interval: Duration,
    heartbeat_timeout: Duration,
    trust_platform_online: bool,
    platform_online: AtomicBool,
    state: StdMutex<MonitorState>,
    handlers: HandlerRegistry<StatusHandler>,
    started: AtomicBool,
}

/// Connectivity detector combining heartbeat probing with platform events.
#[derive(Clone)]
pub struct NetworkMonitor {
    inner: Arc<MonitorInner>,
}

impl NetworkMonitor {
    /// Create a monitor over the given probe. Starts `Offline` until a
    /// heartbeat or platform signal says otherwise.
    pub fn new(probe: Arc<dyn ConnectivityProbe>, config: &EngineConfig) -> Self {
        Self {
            inner: Arc::new(MonitorInner {
                probe,
                heartbeat_interval: config.heartbeat_interval,
                heartbeat_timeout: config.heartbeat_timeout,
                trust_platform_online: config.trust_platform_online,
                platform_online: AtomicBool::new(false),
                state: StdMutex::new(MonitorState {
                    status: ConnectionStatus::Offline,
                    consecutive_failures: 0,
                    last_transition: None,
                    last_reconnect: None,
                }),
                handlers: HandlerRegistry::new(),
                started: AtomicBool::new(false),
            }),
        }
    }

    /// Start monitoring: one immediate heartbeat, then the interval loop.
    ///
    /// Idempotent — repeated calls do not stack loops. Must be called from
    /// within a tokio runtime.
    pub async fn init(&self) {
        if self.inner.started.swap(true, Ordering::SeqCst) {
            return;
        }
        self.inner.run_heartbeat().await;

        let weak: Weak<MonitorInner> = Arc::downgrade(&self.inner);
        let interval = self.inner.heartbeat_interval;
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                inner.run_heartbeat().await;
            }
        });
    }

    /// Subscribe to status transitions.
    pub fn register_handler(
        &self,
        handler: impl Fn(ConnectionStatus, NetworkEvent) + Send + Sync + 'static,
    ) -> HandlerId {
        self.inner.handlers.register(Arc::new(handler))
    }

    /// Remove a previously registered handler.
    pub fn unregister_handler(&self, id: HandlerId) -> bool {
        self.inner.handlers.unregister(id)
    }

    /// Run one heartbeat immediately and return the resulting status.
    pub async fn force_check(&self) -> ConnectionStatus {
        self.inner.run_heartbeat().await
    }

    /// The platform reported connectivity; verify with a heartbeat.
    pub async fn platform_online(&self) -> ConnectionStatus {
        self.inner.platform_online.store(true, Ordering::SeqCst);
        self.inner.run_heartbeat().await
    }

    /// The platform reported loss of connectivity; authoritative.
    pub fn platform_offline(&self) {
        self.inner.platform_online.store(false, Ordering::SeqCst);
        self.inner.force_offline();
    }

    /// Current state without probing.
    pub fn status(&self) -> ConnectionStatus {
        self.inner.state.lock().expect("monitor state poisoned").status
    }

    /// Current state plus transition metadata.
    pub fn status_snapshot(&self) -> StatusSnapshot {
        let state = self.inner.state.lock().expect("monitor state poisoned");
        StatusSnapshot {
            status: state.status,
            consecutive_failures: state.consecutive_failures,
            last_transition: state.last_transition,
            last_reconnect: state.last_reconnect,
        }
    }

    /// Time since the last Offline -> Online transition, `None` before the
    /// first reconnection.
    pub fn time_since_reconnect(&self) -> Option<Duration> {
        self.inner
            .state
            .lock()
            .expect("monitor state poisoned")
            .last_reconnect
            .map(|at| at.elapsed())
    }
}

impl MonitorInner {
    /// One probe bounded by the heartbeat deadline; converts the result into
    /// a status transition. Never returns an error.
    async fn run_heartbeat(&self) -> ConnectionStatus {
        match tokio::time::timeout(self.heartbeat_timeout, self.probe.check()).await {
            Ok(Ok(())) => self.apply_probe_success(),
            Ok(Err(error)) => {
                tracing::debug!(error = %error, "Heartbeat probe failed");
                self.apply_probe_failure(false)
            }
            Err(_elapsed) => {
                tracing::debug!(
                    timeout = ?self.heartbeat_timeout,
                    "Heartbeat probe timed out"
                );
                self.apply_probe_failure(true)
            }
        }
    }

    fn apply_probe_success(&self) -> ConnectionStatus {
        let notification = {
            let mut state = self.state.lock().expect("monitor state poisoned");
            state.consecutive_failures = 0;
            if state.status == ConnectionStatus::Offline {
                let now = Instant::now();
                state.status = ConnectionStatus::Online;
                state.last_transition = Some(now);
                state.last_reconnect = Some(now);
                Some((ConnectionStatus::Online, NetworkEvent::Reconnected))
            } else {
                None
            }
        };

        if let Some((status, event)) = notification {
            tracing::info!("Connectivity restored");
            self.notify(status, event);
        }
        ConnectionStatus::Online
    }

    fn apply_probe_failure(&self, inconclusive: bool) -> ConnectionStatus {
        // An aborted probe with the platform still claiming connectivity is
        // inconclusive; keep the current state when configured to trust it.
        if inconclusive
            && self.trust_platform_online
            && self.platform_online.load(Ordering::SeqCst)
        {
            let mut state = self.state.lock().expect("monitor state poisoned");
            state.consecutive_failures += 1;
            return state.status;
        }

        self.force_offline()
    }

    fn force_offline(&self) -> ConnectionStatus {
        let notification = {
            let mut state = self.state.lock().expect("monitor state poisoned");
            state.consecutive_failures += 1;
            if state.status == ConnectionStatus::Online {
                state.status = ConnectionStatus::Offline;
                state.last_transition = Some(Instant::now());
                Some((ConnectionStatus::Offline, NetworkEvent::StatusChange))
            } else {
                None
            }
        };

        if let Some((status, event)) = notification {
            tracing::info!("Connectivity lost");
            self.notify(status, event);
        }
        ConnectionStatus::Offline
    }

    fn notify(&self, status: ConnectionStatus, event: NetworkEvent) {
        for handler in self.handlers.snapshot() {
            handler(status, event);
        }
    }
}
