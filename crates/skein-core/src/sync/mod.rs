//! Sync service
//!
//! The reconciliation engine. A pass pushes every local unsynced entity to
//! the remote service, resolving conflicts deterministically, then merges
//! remote records back into the local store. Entities are processed one at a
//! time — each logical entity has exactly one writer active — and failures
//! are captured per entity so a pass reports partial success instead of
//! aborting.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::events::{HandlerId, HandlerRegistry};
use crate::models::{
    entities_equal, entity_content, fields, mark_synced, record_id_of, tables, updated_at_of,
    ConflictStrategy, SyncIssue, SyncReport,
};
use crate::net::{NetworkEvent, NetworkMonitor};
use crate::remote::{Filter, RemoteStore};
use crate::store::LocalStore;

/// Lifecycle notification emitted during a sync pass
#[derive(Debug, Clone)]
pub enum SyncEvent {
    /// A pass began
    SyncStarted,
    /// A pass completed; carries the tally
    SyncFinished(SyncReport),
    /// Local and remote copies of one entity diverged
    ConflictDetected {
        /// Collection holding the entity
        table: String,
        /// The divergent record
        record_id: String,
        /// The local copy
        local: Value,
        /// The remote copy
        remote: Value,
    },
    /// A detected conflict was reconciled
    ConflictResolved {
        /// Collection holding the entity
        table: String,
        /// The reconciled record
        record_id: String,
        /// The local copy that was in conflict
        local: Value,
        /// The remote copy that was in conflict
        remote: Value,
        /// Name of the strategy that decided the outcome
        strategy: String,
        /// The single authoritative entity written back
        resolved: Value,
    },
}

/// Custom merge logic for one table's conflicts.
///
/// The merged entity is written to both stores and marked synced.
#[async_trait]
pub trait ConflictHandler: Send + Sync {
    async fn resolve(&self, server: &Value, client: &Value) -> Result<Value>;
}

type SyncSubscriber = dyn Fn(&SyncEvent) + Send + Sync;

struct SyncInner {
    store: LocalStore,
    remote: Arc<dyn RemoteStore>,
    default_strategy: ConflictStrategy,
    auto_sync_on_reconnect: bool,
    reconnect_sync_delay: Duration,
    sync_tables: StdMutex<Vec<String>>,
    conflict_handlers: StdMutex<HashMap<String, Arc<dyn ConflictHandler>>>,
    subscribers: HandlerRegistry<SyncSubscriber>,
    in_progress: AtomicBool,
    reconnect_scheduled: AtomicBool,
    last_sync_at: StdMutex<Option<Instant>>,
}

/// Push/pull reconciliation over the registered entity tables.
#[derive(Clone)]
pub struct SyncService {
    inner: Arc<SyncInner>,
}

impl SyncService {
    /// Create a service syncing the default entity tables.
    pub fn new(store: LocalStore, remote: Arc<dyn RemoteStore>, config: &EngineConfig) -> Self {
        Self {
            inner: Arc::new(SyncInner {
                store,
                remote,
                default_strategy: config.default_strategy,
                auto_sync_on_reconnect: config.auto_sync_on_reconnect,
                reconnect_sync_delay: config.reconnect_sync_delay,
                sync_tables: StdMutex::new(vec![
                    tables::STORIES.to_string(),
                    tables::STORY_SEGMENTS.to_string(),
                ]),
                conflict_handlers: StdMutex::new(HashMap::new()),
                subscribers: HandlerRegistry::new(),
                in_progress: AtomicBool::new(false),
                reconnect_scheduled: AtomicBool::new(false),
                last_sync_at: StdMutex::new(None),
            }),
        }
    }

    /// Add a table to the sync pass. Idempotent.
    pub fn register_table(&self, table: impl Into<String>) {
        let table = table.into();
        let mut sync_tables = self
            .inner
            .sync_tables
            .lock()
            .expect("table registry poisoned");
        if !sync_tables.contains(&table) {
            sync_tables.push(table);
        }
    }

    /// Override conflict resolution for one table with custom merge logic.
    pub fn register_conflict_handler(
        &self,
        table: impl Into<String>,
        handler: Arc<dyn ConflictHandler>,
    ) {
        self.inner
            .conflict_handlers
            .lock()
            .expect("conflict handlers poisoned")
            .insert(table.into(), handler);
    }

    /// Subscribe to sync lifecycle events.
    pub fn register_handler(
        &self,
        handler: impl Fn(&SyncEvent) + Send + Sync + 'static,
    ) -> HandlerId {
        self.inner.subscribers.register(Arc::new(handler))
    }

    /// Remove a previously registered subscriber.
    pub fn unregister_handler(&self, id: HandlerId) -> bool {
        self.inner.subscribers.unregister(id)
    }

    /// Wire the reconnect trigger: when enabled, a `Reconnected` event
    /// schedules exactly one pass after the configured debounce delay.
    pub fn init(&self, monitor: &NetworkMonitor) {
        if !self.inner.auto_sync_on_reconnect {
            return;
        }
        let service = self.clone();
        monitor.register_handler(move |_status, event| {
            if event == NetworkEvent::Reconnected {
                service.schedule_reconnect_sync();
            }
        });
    }

    /// Whether a pass is currently running.
    pub fn is_sync_in_progress(&self) -> bool {
        self.inner.in_progress.load(Ordering::SeqCst)
    }

    /// When the last pass completed, `None` before the first.
    pub fn last_sync_at(&self) -> Option<Instant> {
        *self
            .inner
            .last_sync_at
            .lock()
            .expect("last sync timestamp poisoned")
    }

    /// Run one full reconciliation pass.
    ///
    /// A second call while one is running is rejected with
    /// [`Error::SyncInProgress`] — overlapping passes over the same entity
    /// could double-apply a resolution.
    pub async fn sync_all(&self) -> Result<SyncReport> {
        if self.inner.in_progress.swap(true, Ordering::SeqCst) {
            return Err(Error::SyncInProgress);
        }
        let result = self.run_pass().await;
        self.inner.in_progress.store(false, Ordering::SeqCst);
        result
    }

    async fn run_pass(&self) -> Result<SyncReport> {
        self.emit(&SyncEvent::SyncStarted);
        let mut report = SyncReport::new();
        let sync_tables = self
            .inner
            .sync_tables
            .lock()
            .expect("table registry poisoned")
            .clone();

        for table in &sync_tables {
            self.push_table(table, &mut report).await;
        }
        for table in &sync_tables {
            self.pull_table(table, &mut report).await;
        }

        report.finish();
        *self
            .inner
            .last_sync_at
            .lock()
            .expect("last sync timestamp poisoned") = Some(Instant::now());
        tracing::info!(
            stories = report.synced_stories,
            segments = report.synced_segments,
            conflicts = report.conflicts,
            errors = report.errors.len(),
            "Sync pass finished"
        );
        self.emit(&SyncEvent::SyncFinished(report.clone()));
        Ok(report)
    }

    /// Deliver every local unsynced entity of one table.
    async fn push_table(&self, table: &str, report: &mut SyncReport) {
        let unsynced = match self
            .inner
            .store
            .query_by_index(table, fields::IS_SYNCED, &json!(false))
            .await
        {
            Ok(records) => records,
            Err(error) => {
                report
                    .errors
                    .push(SyncIssue::new(table, None, error.to_string()));
                return;
            }
        };

        for local in unsynced {
            let Some(id) = record_id_of(&local).map(ToString::to_string) else {
                report.errors.push(SyncIssue::new(
                    table,
                    None,
                    "local record is missing a string `id`",
                ));
                continue;
            };
            if let Err(error) = self.push_entity(table, &id, &local, report).await {
                report
                    .errors
                    .push(SyncIssue::new(table, Some(id), error.to_string()));
            }
        }
    }

    async fn push_entity(
        &self,
        table: &str,
        id: &str,
        local: &Value,
        report: &mut SyncReport,
    ) -> Result<()> {
        match self.inner.remote.fetch_by_id(table, id).await? {
            None => {
                self.inner
                    .remote
                    .insert(table, &entity_content(local))
                    .await?;
                self.inner.store.put(table, mark_synced(local)).await?;
                bump_tally(report, table);
            }
            Some(remote_entity) => {
                if entities_equal(local, &remote_entity) {
                    // Content already identical on both sides; no write needed
                    self.inner.store.put(table, mark_synced(local)).await?;
                    bump_tally(report, table);
                } else {
                    self.resolve_conflict(table, id, local, &remote_entity)
                        .await?;
                    report.conflicts += 1;
                    bump_tally(report, table);
                }
            }
        }
        Ok(())
    }

    /// Reconcile one divergence into a single authoritative entity.
    async fn resolve_conflict(
        &self,
        table: &str,
        id: &str,
        local: &Value,
        remote_entity: &Value,
    ) -> Result<()> {
        tracing::debug!(table, record = id, "Conflict detected");
        self.emit(&SyncEvent::ConflictDetected {
            table: table.to_string(),
            record_id: id.to_string(),
            local: local.clone(),
            remote: remote_entity.clone(),
        });

        let custom = self
            .inner
            .conflict_handlers
            .lock()
            .expect("conflict handlers poisoned")
            .get(table)
            .cloned();

        let (resolved, strategy_name) = if let Some(handler) = custom {
            let merged = handler
                .resolve(remote_entity, local)
                .await
                .map_err(|error| Error::ConflictResolution(error.to_string()))?;
            // The merged entity becomes authoritative on both sides
            self.inner
                .remote
                .update(table, id, &entity_content(&merged))
                .await?;
            (merged, "CUSTOM".to_string())
        } else {
            let strategy = self.inner.default_strategy;
            let client_wins = match strategy {
                ConflictStrategy::ServerWins => false,
                ConflictStrategy::ClientWins => true,
                // Ties fall back to the server copy
                ConflictStrategy::TimestampBased => {
                    updated_at_of(local) > updated_at_of(remote_entity)
                }
            };
            if client_wins {
                self.inner
                    .remote
                    .update(table, id, &entity_content(local))
                    .await?;
                (local.clone(), strategy.as_str().to_string())
            } else {
                (remote_entity.clone(), strategy.as_str().to_string())
            }
        };

        let stored = self.inner.store.put(table, mark_synced(&resolved)).await?;
        tracing::debug!(table, record = id, strategy = strategy_name, "Conflict resolved");
        self.emit(&SyncEvent::ConflictResolved {
            table: table.to_string(),
            record_id: id.to_string(),
            local: local.clone(),
            remote: remote_entity.clone(),
            strategy: strategy_name,
            resolved: stored,
        });
        Ok(())
    }

    /// Merge remote records of one table into the local store.
    async fn pull_table(&self, table: &str, report: &mut SyncReport) {
        let remote_rows = match self.inner.remote.select(table, &Filter::new()).await {
            Ok(rows) => rows,
            Err(error) => {
                report.errors.push(SyncIssue::new(
                    table,
                    None,
                    format!("pull failed: {error}"),
                ));
                return;
            }
        };

        for remote_entity in remote_rows {
            let Some(id) = record_id_of(&remote_entity).map(ToString::to_string) else {
                report.errors.push(SyncIssue::new(
                    table,
                    None,
                    "remote record is missing a string `id`",
                ));
                continue;
            };
            match self.pull_entity(table, &id, &remote_entity).await {
                Ok(true) => bump_tally(report, table),
                Ok(false) => {}
                Err(error) => {
                    report
                        .errors
                        .push(SyncIssue::new(table, Some(id), error.to_string()));
                }
            }
        }
    }

    /// Returns whether the local store was written.
    async fn pull_entity(&self, table: &str, id: &str, remote_entity: &Value) -> Result<bool> {
        match self.inner.store.get(table, id).await? {
            None => {
                self.inner
                    .store
                    .put(table, mark_synced(remote_entity))
                    .await?;
                Ok(true)
            }
            Some(local) => {
                let locally_synced = local
                    .get(fields::IS_SYNCED)
                    .and_then(Value::as_bool)
                    .unwrap_or(false);
                if locally_synced && !entities_equal(&local, remote_entity) {
                    // No local edits pending; the server copy moved on
                    self.inner
                        .store
                        .put(table, mark_synced(remote_entity))
                        .await?;
                    Ok(true)
                } else {
                    // Unsynced local edits belong to the push phase
                    Ok(false)
                }
            }
        }
    }

    /// Coalesced debounce: one scheduled pass per reconnection burst.
    fn schedule_reconnect_sync(&self) {
        if self.inner.reconnect_scheduled.swap(true, Ordering::SeqCst) {
            return;
        }
        let service = self.clone();
        let delay = self.inner.reconnect_sync_delay;
        tracing::debug!(delay = ?delay, "Scheduling post-reconnect sync");
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            service
                .inner
                .reconnect_scheduled
                .store(false, Ordering::SeqCst);
            match service.sync_all().await {
                Ok(report) => {
                    tracing::info!(
                        stories = report.synced_stories,
                        segments = report.synced_segments,
                        "Post-reconnect sync finished"
                    );
                }
                // Background passes convert failures into signals, never panics
                Err(error) => tracing::warn!(error = %error, "Post-reconnect sync failed"),
            }
        });
    }

    fn emit(&self, event: &SyncEvent) {
        for subscriber in self.inner.subscribers.snapshot() {
            subscriber(event);
        }
    }
}

/// Count a reconciled entity against the right report column.
fn bump_tally(report: &mut SyncReport, table: &str) {
    match table {
        tables::STORIES => report.synced_stories += 1,
        tables::STORY_SEGMENTS => report.synced_segments += 1,
        _ => {}
    }
}
