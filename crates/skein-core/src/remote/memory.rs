//! In-memory remote store
//!
//! The "mock the transport" double: a `RemoteStore` holding its tables in
//! process memory, with injectable failure modes so delivery, retry, and
//! conflict paths are testable without a network. Also handy for demos.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;

use super::{Filter, RemoteStore};
use crate::error::{Error, Result};
use crate::models::record_id_of;

/// In-memory `RemoteStore` implementation.
#[derive(Clone, Default)]
pub struct MemoryRemoteStore {
    tables: Arc<Mutex<HashMap<String, BTreeMap<String, Value>>>>,
    offline: Arc<AtomicBool>,
    rejected: Arc<Mutex<HashSet<String>>>,
}

impl MemoryRemoteStore {
    /// An empty remote.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Put a record directly into a table, bypassing failure modes.
    pub fn seed(&self, table: &str, record: Value) -> Result<()> {
        let id = record_id_of(&record)
            .ok_or_else(|| Error::InvalidInput("seed record is missing a string `id`".into()))?
            .to_string();
        self.tables
            .lock()
            .expect("remote tables poisoned")
            .entry(table.to_string())
            .or_default()
            .insert(id, record);
        Ok(())
    }

    /// Everything currently stored in a table, in id order.
    #[must_use]
    pub fn records(&self, table: &str) -> Vec<Value> {
        self.tables
            .lock()
            .expect("remote tables poisoned")
            .get(table)
            .map(|rows| rows.values().cloned().collect())
            .unwrap_or_default()
    }

    /// One record by id.
    #[must_use]
    pub fn record(&self, table: &str, id: &str) -> Option<Value> {
        self.tables
            .lock()
            .expect("remote tables poisoned")
            .get(table)
            .and_then(|rows| rows.get(id).cloned())
    }

    /// Simulate total unreachability: every call fails with a network error.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Reject writes touching this record id with a remote error.
    pub fn reject_record(&self, id: &str) {
        self.rejected
            .lock()
            .expect("rejection set poisoned")
            .insert(id.to_string());
    }

    /// Stop rejecting writes.
    pub fn clear_rejections(&self) {
        self.rejected.lock().expect("rejection set poisoned").clear();
    }

    fn check_reachable(&self) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            Err(Error::Network("remote unreachable (offline)".to_string()))
        } else {
            Ok(())
        }
    }

    fn check_writable(&self, id: &str) -> Result<()> {
        if self.rejected.lock().expect("rejection set poisoned").contains(id) {
            Err(Error::RemoteRejection {
                status: 422,
                message: format!("record '{id}' rejected by policy"),
            })
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl RemoteStore for MemoryRemoteStore {
    async fn select(&self, table: &str, filter: &Filter) -> Result<Vec<Value>> {
        self.check_reachable()?;
        let tables = self.tables.lock().expect("remote tables poisoned");
        let mut rows: Vec<Value> = tables
            .get(table)
            .map(|rows| {
                rows.values()
                    .filter(|record| filter.matches(record))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        if let Some(limit) = filter.row_limit() {
            rows.truncate(limit);
        }
        Ok(rows)
    }

    async fn insert(&self, table: &str, record: &Value) -> Result<()> {
        self.check_reachable()?;
        let id = record_id_of(record)
            .ok_or_else(|| Error::InvalidInput("insert record is missing a string `id`".into()))?
            .to_string();
        self.check_writable(&id)?;
        self.tables
            .lock()
            .expect("remote tables poisoned")
            .entry(table.to_string())
            .or_default()
            .insert(id, record.clone());
        Ok(())
    }

    async fn update(&self, table: &str, id: &str, record: &Value) -> Result<()> {
        self.check_reachable()?;
        self.check_writable(id)?;
        self.tables
            .lock()
            .expect("remote tables poisoned")
            .entry(table.to_string())
            .or_default()
            .insert(id.to_string(), record.clone());
        Ok(())
    }

    async fn delete(&self, table: &str, id: &str) -> Result<()> {
        self.check_reachable()?;
        self.check_writable(id)?;
        if let Some(rows) = self
            .tables
            .lock()
            .expect("remote tables poisoned")
            .get_mut(table)
        {
            rows.remove(id);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test(flavor = "multi_thread")]
    async fn crud_round_trip() {
        let remote = MemoryRemoteStore::new();

        remote
            .insert("stories", &json!({"id": "s-1", "title": "Tides"}))
            .await
            .unwrap();
        assert_eq!(
            remote.fetch_by_id("stories", "s-1").await.unwrap().unwrap()["title"],
            "Tides"
        );

        remote
            .update("stories", "s-1", &json!({"id": "s-1", "title": "Ebb"}))
            .await
            .unwrap();
        assert_eq!(remote.record("stories", "s-1").unwrap()["title"], "Ebb");

        remote.delete("stories", "s-1").await.unwrap();
        assert!(remote.fetch_by_id("stories", "s-1").await.unwrap().is_none());
        // Absent delete is fine
        remote.delete("stories", "s-1").await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn select_applies_filter_and_limit() {
        let remote = MemoryRemoteStore::new();
        for (id, story) in [("a", "s-1"), ("b", "s-1"), ("c", "s-2")] {
            remote
                .seed("segments", json!({"id": id, "story_id": story}))
                .unwrap();
        }

        let matched = remote
            .select("segments", &Filter::new().eq("story_id", "s-1"))
            .await
            .unwrap();
        assert_eq!(matched.len(), 2);

        let limited = remote
            .select("segments", &Filter::new().eq("story_id", "s-1").limit(1))
            .await
            .unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn offline_mode_fails_every_call() {
        let remote = MemoryRemoteStore::new();
        remote.set_offline(true);

        let error = remote.select("stories", &Filter::new()).await.unwrap_err();
        assert!(matches!(error, Error::Network(_)));

        remote.set_offline(false);
        assert!(remote.select("stories", &Filter::new()).await.is_ok());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn rejected_records_fail_writes_only() {
        let remote = MemoryRemoteStore::new();
        remote.seed("stories", json!({"id": "s-1"})).unwrap();
        remote.reject_record("s-1");

        let error = remote
            .update("stories", "s-1", &json!({"id": "s-1"}))
            .await
            .unwrap_err();
        assert!(matches!(error, Error::RemoteRejection { status: 422, .. }));

        // Reads still work
        assert!(remote.fetch_by_id("stories", "s-1").await.unwrap().is_some());

        remote.clear_rejections();
        assert!(remote
            .update("stories", "s-1", &json!({"id": "s-1"}))
            .await
            .is_ok());
    }
}
