//! Remote service boundary
//!
//! The only point where the engine talks to the backing service: an abstract
//! CRUD interface over named collections with equality filters and a row
//! limit. Any networked store implementing this shape is pluggable — the
//! production HTTP client and the in-memory test double both live here.

mod http;
mod memory;

pub use http::HttpRemoteStore;
pub use memory::MemoryRemoteStore;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;
use crate::models::fields;

/// Equality filter plus optional row limit for remote selects.
#[derive(Debug, Clone, Default)]
pub struct Filter {
    eq: Vec<(String, Value)>,
    limit: Option<usize>,
}

impl Filter {
    /// An unfiltered select (every row of the table).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Require `field == value`.
    #[must_use]
    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.eq.push((field.into(), value.into()));
        self
    }

    /// Cap the number of returned rows.
    #[must_use]
    pub const fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// The equality constraints, in the order they were added.
    pub fn eq_pairs(&self) -> &[(String, Value)] {
        &self.eq
    }

    /// The row cap, if any.
    pub const fn row_limit(&self) -> Option<usize> {
        self.limit
    }

    /// Whether a record satisfies every equality constraint.
    pub fn matches(&self, record: &Value) -> bool {
        self.eq
            .iter()
            .all(|(field, expected)| record.get(field) == Some(expected))
    }
}

/// Abstract CRUD over the backing service's named collections.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Records matching the filter.
    async fn select(&self, table: &str, filter: &Filter) -> Result<Vec<Value>>;

    /// Create a record. Implementations treat a repeated insert for the same
    /// id as an upsert so retried deliveries stay idempotent.
    async fn insert(&self, table: &str, record: &Value) -> Result<()>;

    /// Replace a record's content by id.
    async fn update(&self, table: &str, id: &str, record: &Value) -> Result<()>;

    /// Remove a record by id. Deleting an absent id is not an error.
    async fn delete(&self, table: &str, id: &str) -> Result<()>;

    /// Single-record convenience: `select` narrowed to an id, limit 1.
    async fn fetch_by_id(&self, table: &str, id: &str) -> Result<Option<Value>> {
        let rows = self
            .select(table, &Filter::new().eq(fields::ID, id).limit(1))
            .await?;
        Ok(rows.into_iter().next())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn filter_matches_all_equality_pairs() {
        let filter = Filter::new().eq("story_id", "s-1").eq("position", 0);

        assert!(filter.matches(&json!({"story_id": "s-1", "position": 0, "body": "x"})));
        assert!(!filter.matches(&json!({"story_id": "s-1", "position": 1})));
        assert!(!filter.matches(&json!({"position": 0})));
    }

    #[test]
    fn empty_filter_matches_everything() {
        assert!(Filter::new().matches(&json!({"anything": true})));
        assert_eq!(Filter::new().row_limit(), None);
        assert_eq!(Filter::new().limit(1).row_limit(), Some(1));
    }
}
