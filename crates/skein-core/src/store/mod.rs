//! Local store layer for Skein
//!
//! Durable, indexed storage keyed by logical collection name. Every record is
//! a JSON object with a string `id`; secondary indexes are registered per
//! collection over top-level fields and answer equality queries. The
//! operation queue lives in a reserved collection on the same database, so a
//! single file carries everything the engine persists.

mod connection;
mod migrations;

pub use connection::Database;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex as StdMutex};

use libsql::params;
use serde_json::Value;
use tokio::sync::Mutex;

use crate::error::{Error, Result};
use crate::models::record_id_of;

/// Generic CRUD plus secondary-index queries over named collections.
#[derive(Clone)]
pub struct LocalStore {
    db: Arc<Mutex<Database>>,
    indexes: Arc<StdMutex<HashMap<String, Vec<String>>>>,
}

impl LocalStore {
    /// Open a store backed by a database file at the given path.
    pub async fn open_path(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db = Database::open(&db_path).await?;
        Ok(Self::from_database(db))
    }

    /// Open an in-memory store (primarily for tests).
    pub async fn open_in_memory() -> Result<Self> {
        let db = Database::open_in_memory().await?;
        Ok(Self::from_database(db))
    }

    fn from_database(db: Database) -> Self {
        Self {
            db: Arc::new(Mutex::new(db)),
            indexes: Arc::new(StdMutex::new(HashMap::new())),
        }
    }

    /// Register a secondary index over a top-level field of a collection.
    ///
    /// Idempotent. Existing records are backfilled so the index answers
    /// queries immediately, even when registration happens after data was
    /// written.
    pub async fn register_index(&self, collection: &str, field: &str) -> Result<()> {
        {
            let mut indexes = self.indexes.lock().expect("index registry poisoned");
            let fields = indexes.entry(collection.to_string()).or_default();
            if fields.iter().any(|existing| existing == field) {
                return Ok(());
            }
            fields.push(field.to_string());
        }

        // Backfill: index every record already in the collection
        let existing = self.list(collection).await?;
        let db = self.db.lock().await;
        let conn = db.connection();
        for record in &existing {
            let Some(id) = record_id_of(record) else {
                continue;
            };
            if let Some(value) = index_value(record.get(field)) {
                conn.execute(
                    "INSERT OR REPLACE INTO record_indexes (collection, index_name, value, record_id)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![collection, field, value, id],
                )
                .await?;
            }
        }

        tracing::debug!(collection, field, rows = existing.len(), "Registered index");
        Ok(())
    }

    /// Upsert a record by its `id` field; returns the stored record.
    ///
    /// Refreshes every registered index row for the record.
    pub async fn put(&self, collection: &str, item: Value) -> Result<Value> {
        let id = record_id_of(&item)
            .ok_or_else(|| {
                Error::InvalidInput(format!("record for '{collection}' is missing a string `id`"))
            })?
            .to_string();
        let data = serde_json::to_string(&item)?;
        let fields = self.indexed_fields(collection);

        let db = self.db.lock().await;
        let conn = db.connection();
        conn.execute(
            "INSERT INTO records (collection, id, data) VALUES (?1, ?2, ?3)
             ON CONFLICT(collection, id) DO UPDATE SET data = excluded.data",
            params![collection, id.as_str(), data],
        )
        .await?;

        conn.execute(
            "DELETE FROM record_indexes WHERE collection = ?1 AND record_id = ?2",
            params![collection, id.as_str()],
        )
        .await?;
        for field in &fields {
            if let Some(value) = index_value(item.get(field)) {
                conn.execute(
                    "INSERT OR REPLACE INTO record_indexes (collection, index_name, value, record_id)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![collection, field.as_str(), value, id.as_str()],
                )
                .await?;
            }
        }

        Ok(item)
    }

    /// Fetch a record by id; a miss is `None`, never an error.
    pub async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>> {
        let db = self.db.lock().await;
        let mut rows = db
            .connection()
            .query(
                "SELECT data FROM records WHERE collection = ?1 AND id = ?2",
                params![collection, id],
            )
            .await?;

        match rows.next().await? {
            Some(row) => {
                let data: String = row.get(0)?;
                Ok(Some(parse_record(collection, &data)?))
            }
            None => Ok(None),
        }
    }

    /// Delete a record and its index rows. Removing an absent id is a no-op.
    pub async fn remove(&self, collection: &str, id: &str) -> Result<()> {
        let db = self.db.lock().await;
        let conn = db.connection();
        conn.execute(
            "DELETE FROM record_indexes WHERE collection = ?1 AND record_id = ?2",
            params![collection, id],
        )
        .await?;
        conn.execute(
            "DELETE FROM records WHERE collection = ?1 AND id = ?2",
            params![collection, id],
        )
        .await?;
        Ok(())
    }

    /// All records whose indexed field equals `value`. Order is unspecified.
    pub async fn query_by_index(
        &self,
        collection: &str,
        index: &str,
        value: &Value,
    ) -> Result<Vec<Value>> {
        self.ensure_index(collection, index)?;
        let needle = index_value(Some(value)).ok_or_else(|| {
            Error::InvalidInput(format!("value for index '{index}' is not indexable"))
        })?;

        let db = self.db.lock().await;
        let mut rows = db
            .connection()
            .query(
                "SELECT r.data FROM records r
                 JOIN record_indexes ri
                   ON ri.collection = r.collection AND ri.record_id = r.id
                 WHERE r.collection = ?1 AND ri.index_name = ?2 AND ri.value = ?3",
                params![collection, index, needle],
            )
            .await?;

        let mut records = Vec::new();
        while let Some(row) = rows.next().await? {
            let data: String = row.get(0)?;
            records.push(parse_record(collection, &data)?);
        }
        Ok(records)
    }

    /// Count records whose indexed field equals `value` without loading them.
    pub async fn count_by_index(
        &self,
        collection: &str,
        index: &str,
        value: &Value,
    ) -> Result<usize> {
        self.ensure_index(collection, index)?;
        let needle = index_value(Some(value)).ok_or_else(|| {
            Error::InvalidInput(format!("value for index '{index}' is not indexable"))
        })?;

        let db = self.db.lock().await;
        let mut rows = db
            .connection()
            .query(
                "SELECT COUNT(*) FROM record_indexes
                 WHERE collection = ?1 AND index_name = ?2 AND value = ?3",
                params![collection, index, needle],
            )
            .await?;

        let count: i64 = match rows.next().await? {
            Some(row) => row.get(0)?,
            None => 0,
        };
        Ok(usize::try_from(count).unwrap_or(0))
    }

    /// All records in a collection. Order is unspecified.
    pub async fn list(&self, collection: &str) -> Result<Vec<Value>> {
        let db = self.db.lock().await;
        let mut rows = db
            .connection()
            .query(
                "SELECT data FROM records WHERE collection = ?1",
                params![collection],
            )
            .await?;

        let mut records = Vec::new();
        while let Some(row) = rows.next().await? {
            let data: String = row.get(0)?;
            records.push(parse_record(collection, &data)?);
        }
        Ok(records)
    }

    /// Empty a collection, records and index rows both.
    pub async fn clear(&self, collection: &str) -> Result<()> {
        let db = self.db.lock().await;
        let conn = db.connection();
        conn.execute(
            "DELETE FROM record_indexes WHERE collection = ?1",
            params![collection],
        )
        .await?;
        conn.execute(
            "DELETE FROM records WHERE collection = ?1",
            params![collection],
        )
        .await?;
        Ok(())
    }

    fn indexed_fields(&self, collection: &str) -> Vec<String> {
        self.indexes
            .lock()
            .expect("index registry poisoned")
            .get(collection)
            .cloned()
            .unwrap_or_default()
    }

    fn ensure_index(&self, collection: &str, index: &str) -> Result<()> {
        let registered = self
            .indexes
            .lock()
            .expect("index registry poisoned")
            .get(collection)
            .is_some_and(|fields| fields.iter().any(|field| field == index));
        if registered {
            Ok(())
        } else {
            Err(Error::InvalidInput(format!(
                "no index '{index}' registered for collection '{collection}'"
            )))
        }
    }
}

/// A stored body that no longer parses is a storage failure, not bad input.
fn parse_record(collection: &str, data: &str) -> Result<Value> {
    serde_json::from_str(data).map_err(|error| {
        Error::Storage(format!("corrupt record in '{collection}': {error}"))
    })
}

/// Encode a JSON field value into its index representation.
///
/// Strings index as-is, numbers and booleans by their canonical text form.
/// Null, missing, and compound values are not indexable.
fn index_value(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(text) => Some(text.clone()),
        Value::Bool(flag) => Some(flag.to_string()),
        Value::Number(number) => Some(number.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    async fn setup() -> LocalStore {
        LocalStore::open_in_memory().await.unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn put_and_get_round_trip() {
        let store = setup().await;

        let stored = store
            .put("stories", json!({"id": "s-1", "title": "Tides"}))
            .await
            .unwrap();
        assert_eq!(stored["title"], "Tides");

        let fetched = store.get("stories", "s-1").await.unwrap().unwrap();
        assert_eq!(fetched, json!({"id": "s-1", "title": "Tides"}));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn get_miss_is_none_not_error() {
        let store = setup().await;
        assert!(store.get("stories", "nope").await.unwrap().is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn put_upserts_by_id() {
        let store = setup().await;
        store
            .put("stories", json!({"id": "s-1", "title": "First"}))
            .await
            .unwrap();
        store
            .put("stories", json!({"id": "s-1", "title": "Second"}))
            .await
            .unwrap();

        let fetched = store.get("stories", "s-1").await.unwrap().unwrap();
        assert_eq!(fetched["title"], "Second");
        assert_eq!(store.list("stories").await.unwrap().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn put_rejects_records_without_id() {
        let store = setup().await;
        let error = store
            .put("stories", json!({"title": "No id"}))
            .await
            .unwrap_err();
        assert!(error.to_string().contains("missing a string `id`"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn query_by_index_matches_equal_values() {
        let store = setup().await;
        store.register_index("stories", "is_synced").await.unwrap();

        store
            .put("stories", json!({"id": "a", "is_synced": false}))
            .await
            .unwrap();
        store
            .put("stories", json!({"id": "b", "is_synced": true}))
            .await
            .unwrap();
        store
            .put("stories", json!({"id": "c", "is_synced": false}))
            .await
            .unwrap();

        let unsynced = store
            .query_by_index("stories", "is_synced", &json!(false))
            .await
            .unwrap();
        assert_eq!(unsynced.len(), 2);
        assert!(unsynced.iter().all(|record| record["is_synced"] == false));

        let count = store
            .count_by_index("stories", "is_synced", &json!(false))
            .await
            .unwrap();
        assert_eq!(count, 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn index_rows_follow_updates() {
        let store = setup().await;
        store.register_index("stories", "is_synced").await.unwrap();

        store
            .put("stories", json!({"id": "a", "is_synced": false}))
            .await
            .unwrap();
        store
            .put("stories", json!({"id": "a", "is_synced": true}))
            .await
            .unwrap();

        let unsynced = store
            .query_by_index("stories", "is_synced", &json!(false))
            .await
            .unwrap();
        assert!(unsynced.is_empty());

        let synced = store
            .query_by_index("stories", "is_synced", &json!(true))
            .await
            .unwrap();
        assert_eq!(synced.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn register_index_backfills_existing_records() {
        let store = setup().await;

        store
            .put("segments", json!({"id": "x", "story_id": "s-1"}))
            .await
            .unwrap();
        store
            .put("segments", json!({"id": "y", "story_id": "s-2"}))
            .await
            .unwrap();

        store.register_index("segments", "story_id").await.unwrap();

        let matched = store
            .query_by_index("segments", "story_id", &json!("s-1"))
            .await
            .unwrap();
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0]["id"], "x");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn query_requires_registered_index() {
        let store = setup().await;
        let error = store
            .query_by_index("stories", "title", &json!("x"))
            .await
            .unwrap_err();
        assert!(error.to_string().contains("no index"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn remove_deletes_record_and_index_rows() {
        let store = setup().await;
        store.register_index("stories", "is_synced").await.unwrap();
        store
            .put("stories", json!({"id": "a", "is_synced": false}))
            .await
            .unwrap();

        store.remove("stories", "a").await.unwrap();
        assert!(store.get("stories", "a").await.unwrap().is_none());
        assert_eq!(
            store
                .count_by_index("stories", "is_synced", &json!(false))
                .await
                .unwrap(),
            0
        );

        // Removing again is a no-op
        store.remove("stories", "a").await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn clear_empties_only_the_named_collection() {
        let store = setup().await;
        store.put("stories", json!({"id": "a"})).await.unwrap();
        store.put("segments", json!({"id": "b"})).await.unwrap();

        store.clear("stories").await.unwrap();
        assert!(store.list("stories").await.unwrap().is_empty());
        assert_eq!(store.list("segments").await.unwrap().len(), 1);
    }

    #[test]
    fn index_value_encoding() {
        assert_eq!(index_value(Some(&json!("text"))), Some("text".to_string()));
        assert_eq!(index_value(Some(&json!(true))), Some("true".to_string()));
        assert_eq!(index_value(Some(&json!(7))), Some("7".to_string()));
        assert_eq!(index_value(Some(&json!(null))), None);
        assert_eq!(index_value(Some(&json!(["a"]))), None);
        assert_eq!(index_value(None), None);
    }
}
