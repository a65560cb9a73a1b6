//! Engine composition root
//!
//! [`SyncEngine`] is the explicitly constructed, dependency-injected owner of
//! every component: local store, operation queue, network monitor, exit
//! detector, and sync service. Application shells build one at startup, hand
//! it a remote store, and consume the narrow collaborator APIs — nothing in
//! the engine is process-global.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::config::EngineConfig;
use crate::error::Result;
use crate::exit::{ExitDetector, ExitEvent};
use crate::models::{
    entity_content, fields, mark_unsynced, tables, Operation, OperationType, SegmentId, Story,
    StoryId, StorySegment, SyncReport,
};
use crate::net::{ConnectivityProbe, HttpProbe, NetworkMonitor};
use crate::queue::{OperationExecutor, OperationQueue};
use crate::remote::RemoteStore;
use crate::store::LocalStore;
use crate::sync::SyncService;

/// Latest unsaved in-memory state, bound to its destination record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DraftSnapshot {
    /// Destination collection
    pub table: String,
    /// Destination record id
    pub record_id: String,
    /// Full entity content to persist
    pub payload: Value,
}

/// Default queue executor: delivers operations to the remote boundary.
pub struct RemoteOperationExecutor {
    remote: Arc<dyn RemoteStore>,
}

impl RemoteOperationExecutor {
    /// Create an executor delivering to the given remote.
    pub fn new(remote: Arc<dyn RemoteStore>) -> Self {
        Self { remote }
    }
}

#[async_trait]
impl OperationExecutor for RemoteOperationExecutor {
    async fn execute(&self, operation: &Operation) -> Result<()> {
        match operation.op {
            OperationType::Insert => {
                self.remote
                    .insert(&operation.table, &entity_content(&operation.payload))
                    .await
            }
            OperationType::Update => {
                self.remote
                    .update(
                        &operation.table,
                        &operation.record_id,
                        &entity_content(&operation.payload),
                    )
                    .await
            }
            OperationType::Delete => {
                self.remote
                    .delete(&operation.table, &operation.record_id)
                    .await
            }
        }
    }
}

/// The assembled sync engine.
#[derive(Clone)]
pub struct SyncEngine {
    store: LocalStore,
    queue: OperationQueue,
    monitor: NetworkMonitor,
    exit: ExitDetector<DraftSnapshot>,
    sync: SyncService,
    config: EngineConfig,
    initialized: Arc<AtomicBool>,
}

impl SyncEngine {
    /// Open an engine over a database file at the given path.
    pub async fn open_path(
        db_path: impl Into<PathBuf>,
        remote: Arc<dyn RemoteStore>,
        config: EngineConfig,
    ) -> Result<Self> {
        let store = LocalStore::open_path(db_path).await?;
        Self::assemble(store, remote, config).await
    }

    /// Open an engine over an in-memory database (primarily for tests).
    pub async fn open_in_memory(
        remote: Arc<dyn RemoteStore>,
        config: EngineConfig,
    ) -> Result<Self> {
        let store = LocalStore::open_in_memory().await?;
        Self::assemble(store, remote, config).await
    }

    async fn assemble(
        store: LocalStore,
        remote: Arc<dyn RemoteStore>,
        config: EngineConfig,
    ) -> Result<Self> {
        store
            .register_index(tables::STORIES, fields::IS_SYNCED)
            .await?;
        store
            .register_index(tables::STORY_SEGMENTS, fields::IS_SYNCED)
            .await?;
        store
            .register_index(tables::STORY_SEGMENTS, "story_id")
            .await?;

        let queue = OperationQueue::new(store.clone()).await?;
        queue
            .set_executor(Arc::new(RemoteOperationExecutor::new(remote.clone())))
            .await;

        let probe: Arc<dyn ConnectivityProbe> =
            Arc::new(HttpProbe::new(config.heartbeat_url.clone())?);
        let monitor = NetworkMonitor::new(probe, &config);
        let exit = ExitDetector::new(&config);
        let sync = SyncService::new(store.clone(), remote, &config);

        Ok(Self {
            store,
            queue,
            monitor,
            exit,
            sync,
            config,
            initialized: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Start the background machinery: heartbeat loop, reconnect trigger,
    /// periodic exit flush, and the draft-flush wiring. Idempotent; must be
    /// called from within a tokio runtime.
    pub async fn init(&self) {
        if self.initialized.swap(true, Ordering::SeqCst) {
            return;
        }
        self.monitor.init().await;
        self.sync.init(&self.monitor);
        self.exit.start_periodic();
        self.wire_exit_flush();
        tracing::info!("Sync engine initialized");
    }

    /// Exit flushes persist the draft and enqueue its delivery, best-effort.
    fn wire_exit_flush(&self) {
        let store = self.store.clone();
        let queue = self.queue.clone();
        let exit = self.exit.clone();
        self.exit.register_handler(move |snapshot, trigger| {
            let store = store.clone();
            let queue = queue.clone();
            let exit = exit.clone();
            tokio::spawn(async move {
                match flush_draft(&store, &queue, snapshot).await {
                    Ok(()) => exit.mark_changes_saved(),
                    Err(error) => {
                        tracing::warn!(trigger = %trigger, error = %error, "Exit flush failed");
                    }
                }
            });
        });
    }

    // -----------------------------------------------------------------------
    // Entity APIs
    // -----------------------------------------------------------------------

    /// Persist a story locally (marked unsynced) and enqueue its delivery.
    pub async fn save_story(&self, story: &Story) -> Result<()> {
        self.save_record(tables::STORIES, &story.id.as_str(), story.to_record()?)
            .await
    }

    /// Persist a segment locally (marked unsynced) and enqueue its delivery.
    pub async fn save_segment(&self, segment: &StorySegment) -> Result<()> {
        self.save_record(
            tables::STORY_SEGMENTS,
            &segment.id.as_str(),
            segment.to_record()?,
        )
        .await
    }

    async fn save_record(&self, table: &str, id: &str, record: Value) -> Result<()> {
        let record = mark_unsynced(&record);
        let existed = self.store.get(table, id).await?.is_some();
        self.store.put(table, record.clone()).await?;

        let op = if existed {
            OperationType::Update
        } else {
            OperationType::Insert
        };
        self.queue.add_operation(op, table, id, record).await?;
        Ok(())
    }

    /// Fetch a story by id.
    pub async fn get_story(&self, id: &StoryId) -> Result<Option<Story>> {
        self.store
            .get(tables::STORIES, &id.as_str())
            .await?
            .map(Story::from_record)
            .transpose()
    }

    /// Every locally stored story.
    pub async fn list_stories(&self) -> Result<Vec<Story>> {
        self.store
            .list(tables::STORIES)
            .await?
            .into_iter()
            .map(Story::from_record)
            .collect()
    }

    /// Stories not yet reconciled with the remote service.
    pub async fn unsynced_stories(&self) -> Result<Vec<Story>> {
        self.store
            .query_by_index(tables::STORIES, fields::IS_SYNCED, &Value::Bool(false))
            .await?
            .into_iter()
            .map(Story::from_record)
            .collect()
    }

    /// A story's segments ordered by position.
    pub async fn segments_of(&self, story_id: &StoryId) -> Result<Vec<StorySegment>> {
        let mut segments = self
            .store
            .query_by_index(
                tables::STORY_SEGMENTS,
                "story_id",
                &Value::String(story_id.as_str()),
            )
            .await?
            .into_iter()
            .map(StorySegment::from_record)
            .collect::<Result<Vec<_>>>()?;
        segments.sort_by_key(|segment| segment.position);
        Ok(segments)
    }

    /// Delete a story and its segments locally, enqueueing remote deletes.
    pub async fn delete_story(&self, id: &StoryId) -> Result<()> {
        for segment in self.segments_of(id).await? {
            self.delete_record(tables::STORY_SEGMENTS, &segment.id.as_str())
                .await?;
        }
        self.delete_record(tables::STORIES, &id.as_str()).await
    }

    /// Delete one segment locally, enqueueing the remote delete.
    pub async fn delete_segment(&self, id: &SegmentId) -> Result<()> {
        self.delete_record(tables::STORY_SEGMENTS, &id.as_str()).await
    }

    async fn delete_record(&self, table: &str, id: &str) -> Result<()> {
        self.store.remove(table, id).await?;
        self.queue
            .add_operation(OperationType::Delete, table, id, Value::Null)
            .await?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Draft flush APIs
    // -----------------------------------------------------------------------

    /// Record the latest in-memory snapshot for exit flushing.
    pub fn record_draft(&self, snapshot: DraftSnapshot) {
        self.exit.update_current_data(snapshot);
    }

    /// The collaborator confirmed the draft was saved through another path.
    pub fn draft_saved(&self) {
        self.exit.mark_changes_saved();
    }

    /// Feed a host lifecycle signal into exit detection.
    pub fn handle_exit_event(&self, event: ExitEvent) -> usize {
        self.exit.trigger(event)
    }

    // -----------------------------------------------------------------------
    // Sync APIs
    // -----------------------------------------------------------------------

    /// Drain the operation queue, then run a reconciliation pass.
    pub async fn sync_now(&self) -> Result<SyncReport> {
        self.queue.process_queue().await?;
        self.sync.sync_all().await
    }

    /// Run a reconciliation pass without draining the queue first.
    pub async fn sync_all(&self) -> Result<SyncReport> {
        self.sync.sync_all().await
    }

    // -----------------------------------------------------------------------
    // Component accessors
    // -----------------------------------------------------------------------

    /// The durable local store.
    pub const fn store(&self) -> &LocalStore {
        &self.store
    }

    /// The operation queue.
    pub const fn queue(&self) -> &OperationQueue {
        &self.queue
    }

    /// The connectivity monitor.
    pub const fn network(&self) -> &NetworkMonitor {
        &self.monitor
    }

    /// The exit detector.
    pub const fn exit(&self) -> &ExitDetector<DraftSnapshot> {
        &self.exit
    }

    /// The sync service.
    pub const fn sync_service(&self) -> &SyncService {
        &self.sync
    }

    /// The configuration the engine was built with.
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }
}

/// Persist a flushed draft and enqueue its delivery.
async fn flush_draft(
    store: &LocalStore,
    queue: &OperationQueue,
    snapshot: DraftSnapshot,
) -> Result<()> {
    let existed = store
        .get(&snapshot.table, &snapshot.record_id)
        .await?
        .is_some();
    store
        .put(&snapshot.table, mark_unsynced(&snapshot.payload))
        .await?;

    let op = if existed {
        OperationType::Update
    } else {
        OperationType::Insert
    };
    queue
        .add_operation(op, snapshot.table, snapshot.record_id, snapshot.payload)
        .await?;
    Ok(())
}
