//! Data model for Skein

mod conflict;
mod operation;
mod report;
mod story;

pub use conflict::ConflictStrategy;
pub use operation::{Operation, OperationId, OperationStatus, OperationType};
pub use report::{SyncIssue, SyncReport};
pub use story::{SegmentId, Story, StoryId, StorySegment};

use serde_json::Value;

/// Names of the durable collections the engine owns.
pub mod tables {
    /// Story entities
    pub const STORIES: &str = "stories";
    /// Story segment entities
    pub const STORY_SEGMENTS: &str = "story_segments";
    /// Reserved collection holding the operation queue
    pub const SYNC_OPERATIONS: &str = "sync_operations";
}

/// Conventional entity fields every synced record carries.
pub mod fields {
    /// Stable record identifier
    pub const ID: &str = "id";
    /// Last-modified Unix-ms timestamp
    pub const UPDATED_AT: &str = "updated_at";
    /// Client-local "delivered to remote" flag
    pub const IS_SYNCED: &str = "is_synced";
}

/// Extract a record's `id` field.
pub fn record_id_of(record: &Value) -> Option<&str> {
    record.get(fields::ID).and_then(Value::as_str)
}

/// Extract a record's `updated_at` timestamp, defaulting to 0 when absent.
pub fn updated_at_of(record: &Value) -> i64 {
    record
        .get(fields::UPDATED_AT)
        .and_then(Value::as_i64)
        .unwrap_or(0)
}

/// A record's shareable content: everything except the client-local
/// `is_synced` flag. This is what gets sent to the remote service and what
/// equality checks compare.
pub fn entity_content(record: &Value) -> Value {
    let mut content = record.clone();
    if let Some(object) = content.as_object_mut() {
        object.remove(fields::IS_SYNCED);
    }
    content
}

/// A copy of the record stamped `is_synced = true`.
pub fn mark_synced(record: &Value) -> Value {
    let mut stamped = record.clone();
    if let Some(object) = stamped.as_object_mut() {
        object.insert(fields::IS_SYNCED.to_string(), Value::Bool(true));
    }
    stamped
}

/// A copy of the record stamped `is_synced = false`.
pub fn mark_unsynced(record: &Value) -> Value {
    let mut stamped = record.clone();
    if let Some(object) = stamped.as_object_mut() {
        object.insert(fields::IS_SYNCED.to_string(), Value::Bool(false));
    }
    stamped
}

/// Field-level equality of two entities, ignoring the `is_synced` flag.
pub fn entities_equal(a: &Value, b: &Value) -> bool {
    entity_content(a) == entity_content(b)
}
