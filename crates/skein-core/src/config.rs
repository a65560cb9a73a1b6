//! Engine configuration surface.
//!
//! Every knob is optional with a working default; client shells override the
//! handful they care about through the `with_*` builders.

use std::time::Duration;

use crate::models::ConflictStrategy;

/// Default heartbeat probe target (a captive-portal style 204 endpoint).
const DEFAULT_HEARTBEAT_URL: &str = "https://www.gstatic.com/generate_204";

/// Tunables for the sync engine and its component services.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// URL probed by the connectivity heartbeat
    pub heartbeat_url: String,
    /// Delay between heartbeat probes
    pub heartbeat_interval: Duration,
    /// Deadline after which a heartbeat probe is aborted and counted inconclusive
    pub heartbeat_timeout: Duration,
    /// Treat the platform's online flag as authoritative when probes are inconclusive
    pub trust_platform_online: bool,
    /// Interval for the periodic exit-flush timer; `None` disables it
    pub periodic_save_interval: Option<Duration>,
    /// Whether host shells should prompt before exit while unsaved state exists
    pub confirm_on_exit: bool,
    /// Message host shells show when `confirm_on_exit` applies
    pub exit_confirmation_message: String,
    /// Flush trigger toggles, one per lifecycle signal
    pub flush_on_visibility_hidden: bool,
    /// See `flush_on_visibility_hidden`
    pub flush_on_before_unload: bool,
    /// See `flush_on_visibility_hidden`
    pub flush_on_page_hide: bool,
    /// Strategy applied to conflicts in tables without a custom handler
    pub default_strategy: ConflictStrategy,
    /// Schedule a sync pass automatically after a reconnection
    pub auto_sync_on_reconnect: bool,
    /// Debounce delay between the reconnect event and the scheduled pass
    pub reconnect_sync_delay: Duration,
    /// Request deadline for the HTTP remote store
    pub remote_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            heartbeat_url: DEFAULT_HEARTBEAT_URL.to_string(),
            heartbeat_interval: Duration::from_secs(30),
            heartbeat_timeout: Duration::from_secs(5),
            trust_platform_online: true,
            periodic_save_interval: Some(Duration::from_secs(30)),
            confirm_on_exit: false,
            exit_confirmation_message: "You have unsaved changes. Leave anyway?".to_string(),
            flush_on_visibility_hidden: true,
            flush_on_before_unload: true,
            flush_on_page_hide: true,
            default_strategy: ConflictStrategy::TimestampBased,
            auto_sync_on_reconnect: true,
            reconnect_sync_delay: Duration::from_secs(2),
            remote_timeout: Duration::from_secs(10),
        }
    }
}

impl EngineConfig {
    /// Create a config with every default.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the heartbeat probe target.
    #[must_use]
    pub fn with_heartbeat_url(mut self, url: impl Into<String>) -> Self {
        self.heartbeat_url = url.into();
        self
    }

    /// Set the heartbeat cadence.
    #[must_use]
    pub const fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Set the heartbeat probe deadline.
    #[must_use]
    pub const fn with_heartbeat_timeout(mut self, timeout: Duration) -> Self {
        self.heartbeat_timeout = timeout;
        self
    }

    /// Set the periodic exit-flush interval.
    #[must_use]
    pub const fn with_periodic_save_interval(mut self, interval: Duration) -> Self {
        self.periodic_save_interval = Some(interval);
        self
    }

    /// Disable the periodic exit-flush timer.
    #[must_use]
    pub const fn without_periodic_save(mut self) -> Self {
        self.periodic_save_interval = None;
        self
    }

    /// Set the default conflict strategy.
    #[must_use]
    pub const fn with_default_strategy(mut self, strategy: ConflictStrategy) -> Self {
        self.default_strategy = strategy;
        self
    }

    /// Enable or disable the automatic post-reconnect sync pass.
    #[must_use]
    pub const fn with_auto_sync_on_reconnect(mut self, enabled: bool) -> Self {
        self.auto_sync_on_reconnect = enabled;
        self
    }

    /// Set the debounce delay for the post-reconnect sync pass.
    #[must_use]
    pub const fn with_reconnect_sync_delay(mut self, delay: Duration) -> Self {
        self.reconnect_sync_delay = delay;
        self
    }

    /// Enable the exit confirmation prompt with the given message.
    #[must_use]
    pub fn with_exit_confirmation(mut self, message: impl Into<String>) -> Self {
        self.confirm_on_exit = true;
        self.exit_confirmation_message = message.into();
        self
    }
}
