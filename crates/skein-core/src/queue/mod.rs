//! Durable operation queue
//!
//! Every local mutation is recorded here before any delivery attempt, so no
//! user edit is lost across process restarts. Delivery goes through a
//! pluggable [`OperationExecutor`]; failures are isolated per operation and
//! retained for retry. An operation leaves the queue only once its effect is
//! durably confirmed — uncertain outcomes (an operation stuck `IN_PROGRESS`
//! after a crash) are parked rather than redelivered automatically, keeping
//! delivery at-most-once; `retry_operation` re-drives them explicitly.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;

use crate::error::{Error, Result};
use crate::models::{tables, Operation, OperationId, OperationStatus, OperationType};
use crate::store::LocalStore;

/// Index over the operation status field, used for counters and drains.
const STATUS_INDEX: &str = "status";

/// Delivers one queued operation to its destination.
///
/// Returning an error marks the operation `FAILED` with the error retained;
/// it does not stop the rest of the batch.
#[async_trait]
pub trait OperationExecutor: Send + Sync {
    async fn execute(&self, operation: &Operation) -> Result<()>;
}

/// Per-operation result of a queue drain.
#[derive(Debug, Clone)]
pub struct OperationOutcome {
    /// The operation that was attempted
    pub operation_id: OperationId,
    /// Whether delivery was confirmed
    pub success: bool,
    /// Error message when delivery failed
    pub error: Option<String>,
}

/// Durable, ordered queue of pending mutations.
#[derive(Clone)]
pub struct OperationQueue {
    store: LocalStore,
    executor: Arc<Mutex<Option<Arc<dyn OperationExecutor>>>>,
    drain_lock: Arc<Mutex<()>>,
}

impl OperationQueue {
    /// Create a queue over the store's reserved operations collection.
    pub async fn new(store: LocalStore) -> Result<Self> {
        store
            .register_index(tables::SYNC_OPERATIONS, STATUS_INDEX)
            .await?;
        Ok(Self {
            store,
            executor: Arc::new(Mutex::new(None)),
            drain_lock: Arc::new(Mutex::new(())),
        })
    }

    /// Register the delivery function. Without one, drains are no-ops.
    pub async fn set_executor(&self, executor: Arc<dyn OperationExecutor>) {
        *self.executor.lock().await = Some(executor);
    }

    /// Persist a new pending operation; returns its id.
    ///
    /// Admission never touches entity collections, and duplicates for the
    /// same record are allowed — they apply in creation order at delivery.
    pub async fn add_operation(
        &self,
        op: OperationType,
        table: impl Into<String>,
        record_id: impl Into<String>,
        payload: Value,
    ) -> Result<OperationId> {
        let operation = Operation::new(op, table, record_id, payload);
        let id = operation.id;
        self.store
            .put(tables::SYNC_OPERATIONS, operation.to_record()?)
            .await?;
        tracing::debug!(
            operation = %id,
            op = %operation.op,
            table = operation.table,
            record = operation.record_id,
            "Enqueued operation"
        );
        Ok(id)
    }

    /// Drain every `PENDING` and `FAILED` operation in creation order.
    ///
    /// One failing operation never blocks the others; the returned list has
    /// exactly one outcome per attempted operation.
    pub async fn process_queue(&self) -> Result<Vec<OperationOutcome>> {
        let Some(executor) = self.current_executor().await else {
            return Ok(Vec::new());
        };

        let _drain = self.drain_lock.lock().await;
        let deliverable = self
            .load_by_status(&[OperationStatus::Pending, OperationStatus::Failed])
            .await?;

        let mut outcomes = Vec::with_capacity(deliverable.len());
        for operation in deliverable {
            outcomes.push(self.deliver(executor.as_ref(), operation).await?);
        }
        Ok(outcomes)
    }

    /// Re-drive one retained operation (`FAILED`, or `IN_PROGRESS` after a
    /// crash) through the executor.
    pub async fn retry_operation(&self, id: OperationId) -> Result<OperationOutcome> {
        let Some(executor) = self.current_executor().await else {
            return Err(Error::InvalidInput(
                "no executor registered for retry".to_string(),
            ));
        };

        let _drain = self.drain_lock.lock().await;
        let record = self
            .store
            .get(tables::SYNC_OPERATIONS, &id.as_str())
            .await?
            .ok_or_else(|| Error::NotFound(id.as_str()))?;
        let operation = Operation::from_record(record)?;
        if operation.status == OperationStatus::Pending {
            return Err(Error::InvalidInput(format!(
                "operation {id} is still pending; use process_queue"
            )));
        }
        self.deliver(executor.as_ref(), operation).await
    }

    /// Re-drive every `FAILED` operation in creation order.
    pub async fn retry_all_failed(&self) -> Result<Vec<OperationOutcome>> {
        let Some(executor) = self.current_executor().await else {
            return Ok(Vec::new());
        };

        let _drain = self.drain_lock.lock().await;
        let failed = self.load_by_status(&[OperationStatus::Failed]).await?;

        let mut outcomes = Vec::with_capacity(failed.len());
        for operation in failed {
            outcomes.push(self.deliver(executor.as_ref(), operation).await?);
        }
        Ok(outcomes)
    }

    /// Number of operations awaiting their first delivery attempt.
    pub async fn pending_count(&self) -> Result<usize> {
        self.count_status(OperationStatus::Pending).await
    }

    /// Number of operations retained after a failed delivery.
    pub async fn failed_count(&self) -> Result<usize> {
        self.count_status(OperationStatus::Failed).await
    }

    /// Whether any operation is still awaiting delivery.
    pub async fn has_pending(&self) -> Result<bool> {
        Ok(self.pending_count().await? > 0)
    }

    /// Every retained operation in creation order, for inspection surfaces.
    pub async fn list_operations(&self) -> Result<Vec<Operation>> {
        let records = self.store.list(tables::SYNC_OPERATIONS).await?;
        let mut operations = records
            .into_iter()
            .map(Operation::from_record)
            .collect::<Result<Vec<_>>>()?;
        sort_by_creation(&mut operations);
        Ok(operations)
    }

    async fn current_executor(&self) -> Option<Arc<dyn OperationExecutor>> {
        self.executor.lock().await.clone()
    }

    async fn load_by_status(&self, statuses: &[OperationStatus]) -> Result<Vec<Operation>> {
        let mut operations = Vec::new();
        for status in statuses {
            let records = self
                .store
                .query_by_index(
                    tables::SYNC_OPERATIONS,
                    STATUS_INDEX,
                    &serde_json::to_value(status)?,
                )
                .await?;
            for record in records {
                operations.push(Operation::from_record(record)?);
            }
        }
        sort_by_creation(&mut operations);
        Ok(operations)
    }

    async fn count_status(&self, status: OperationStatus) -> Result<usize> {
        self.store
            .count_by_index(
                tables::SYNC_OPERATIONS,
                STATUS_INDEX,
                &serde_json::to_value(status)?,
            )
            .await
    }

    /// One delivery attempt with durable bookkeeping on both sides.
    async fn deliver(
        &self,
        executor: &dyn OperationExecutor,
        mut operation: Operation,
    ) -> Result<OperationOutcome> {
        operation.status = OperationStatus::InProgress;
        self.store
            .put(tables::SYNC_OPERATIONS, operation.to_record()?)
            .await?;

        match executor.execute(&operation).await {
            Ok(()) => {
                self.store
                    .remove(tables::SYNC_OPERATIONS, &operation.id.as_str())
                    .await?;
                tracing::debug!(operation = %operation.id, "Operation delivered");
                Ok(OperationOutcome {
                    operation_id: operation.id,
                    success: true,
                    error: None,
                })
            }
            Err(error) => {
                let message = error.to_string();
                operation.retry_count += 1;
                operation.status = OperationStatus::Failed;
                operation.last_error = Some(message.clone());
                self.store
                    .put(tables::SYNC_OPERATIONS, operation.to_record()?)
                    .await?;
                tracing::warn!(
                    operation = %operation.id,
                    retries = operation.retry_count,
                    error = message,
                    "Operation delivery failed"
                );
                Ok(OperationOutcome {
                    operation_id: operation.id,
                    success: false,
                    error: Some(message),
                })
            }
        }
    }
}

/// Creation order: enqueue timestamp, then the time-sortable id.
fn sort_by_creation(operations: &mut [Operation]) {
    operations.sort_by(|a, b| {
        a.created_at
            .cmp(&b.created_at)
            .then_with(|| a.id.cmp(&b.id))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashSet;
    use std::sync::Mutex as StdMutex;

    /// Records delivered operations; fails those whose record id is listed.
    struct ScriptedExecutor {
        delivered: StdMutex<Vec<(String, String)>>,
        failing: StdMutex<HashSet<String>>,
    }

    impl ScriptedExecutor {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                delivered: StdMutex::new(Vec::new()),
                failing: StdMutex::new(HashSet::new()),
            })
        }

        fn fail_record(&self, record_id: &str) {
            self.failing.lock().unwrap().insert(record_id.to_string());
        }

        fn heal(&self) {
            self.failing.lock().unwrap().clear();
        }

        fn delivered(&self) -> Vec<(String, String)> {
            self.delivered.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl OperationExecutor for ScriptedExecutor {
        async fn execute(&self, operation: &Operation) -> Result<()> {
            if self.failing.lock().unwrap().contains(&operation.record_id) {
                return Err(Error::Network("scripted failure".to_string()));
            }
            self.delivered
                .lock()
                .unwrap()
                .push((operation.record_id.clone(), operation.payload.to_string()));
            Ok(())
        }
    }

    async fn setup() -> (OperationQueue, Arc<ScriptedExecutor>) {
        let store = LocalStore::open_in_memory().await.unwrap();
        let queue = OperationQueue::new(store).await.unwrap();
        let executor = ScriptedExecutor::new();
        queue.set_executor(executor.clone()).await;
        (queue, executor)
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn without_executor_process_is_a_noop() {
        let store = LocalStore::open_in_memory().await.unwrap();
        let queue = OperationQueue::new(store).await.unwrap();

        queue
            .add_operation(OperationType::Insert, "stories", "s-1", json!({}))
            .await
            .unwrap();

        let outcomes = queue.process_queue().await.unwrap();
        assert!(outcomes.is_empty());
        assert_eq!(queue.pending_count().await.unwrap(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn successful_delivery_removes_operations() {
        let (queue, executor) = setup().await;

        queue
            .add_operation(OperationType::Insert, "stories", "s-1", json!({"n": 1}))
            .await
            .unwrap();
        queue
            .add_operation(OperationType::Update, "stories", "s-2", json!({"n": 2}))
            .await
            .unwrap();

        let outcomes = queue.process_queue().await.unwrap();
        assert_eq!(outcomes.len(), 2);
        assert!(outcomes.iter().all(|outcome| outcome.success));
        assert_eq!(executor.delivered().len(), 2);

        assert!(!queue.has_pending().await.unwrap());
        assert!(queue.list_operations().await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn one_failure_never_blocks_the_rest() {
        let (queue, executor) = setup().await;
        executor.fail_record("s-2");

        for record in ["s-1", "s-2", "s-3"] {
            queue
                .add_operation(OperationType::Update, "stories", record, json!({}))
                .await
                .unwrap();
        }

        let outcomes = queue.process_queue().await.unwrap();
        assert_eq!(outcomes.len(), 3);
        assert_eq!(
            outcomes.iter().filter(|outcome| outcome.success).count(),
            2
        );

        let failed = outcomes.iter().find(|outcome| !outcome.success).unwrap();
        assert!(failed.error.as_deref().unwrap().contains("scripted"));

        assert_eq!(queue.failed_count().await.unwrap(), 1);
        assert_eq!(queue.pending_count().await.unwrap(), 0);

        let retained = queue.list_operations().await.unwrap();
        assert_eq!(retained.len(), 1);
        assert_eq!(retained[0].record_id, "s-2");
        assert_eq!(retained[0].status, OperationStatus::Failed);
        assert_eq!(retained[0].retry_count, 1);
        assert!(retained[0].last_error.is_some());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn same_record_operations_deliver_in_enqueue_order() {
        let (queue, executor) = setup().await;

        queue
            .add_operation(OperationType::Insert, "stories", "s-1", json!({"v": "A"}))
            .await
            .unwrap();
        queue
            .add_operation(OperationType::Update, "stories", "s-1", json!({"v": "B"}))
            .await
            .unwrap();

        queue.process_queue().await.unwrap();

        let delivered = executor.delivered();
        assert_eq!(delivered.len(), 2);
        assert!(delivered[0].1.contains("\"A\""));
        assert!(delivered[1].1.contains("\"B\""));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn duplicate_admissions_are_preserved() {
        let (queue, _executor) = setup().await;

        let first = queue
            .add_operation(OperationType::Update, "stories", "s-1", json!({"v": 1}))
            .await
            .unwrap();
        let second = queue
            .add_operation(OperationType::Update, "stories", "s-1", json!({"v": 2}))
            .await
            .unwrap();

        assert_ne!(first, second);
        assert_eq!(queue.pending_count().await.unwrap(), 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn retry_all_failed_empties_queue_once_executor_heals() {
        let (queue, executor) = setup().await;
        executor.fail_record("s-1");

        queue
            .add_operation(OperationType::Insert, "stories", "s-1", json!({}))
            .await
            .unwrap();

        queue.process_queue().await.unwrap();
        assert_eq!(queue.failed_count().await.unwrap(), 1);

        executor.heal();
        let outcomes = queue.retry_all_failed().await.unwrap();
        assert_eq!(outcomes.len(), 1);
        assert!(outcomes[0].success);

        assert_eq!(queue.failed_count().await.unwrap(), 0);
        assert!(queue.list_operations().await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn retry_single_operation_by_id() {
        let (queue, executor) = setup().await;
        executor.fail_record("s-1");

        let id = queue
            .add_operation(OperationType::Delete, "stories", "s-1", json!(null))
            .await
            .unwrap();
        queue.process_queue().await.unwrap();

        executor.heal();
        let outcome = queue.retry_operation(id).await.unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.operation_id, id);

        let missing = queue.retry_operation(OperationId::new()).await;
        assert!(matches!(missing, Err(Error::NotFound(_))));
    }
}
