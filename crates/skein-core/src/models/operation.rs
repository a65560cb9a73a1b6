//! Queued mutation model

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::sync::{LazyLock, Mutex};
use uuid::timestamp::context::ContextV7;
use uuid::{Timestamp, Uuid};

use crate::error::Result;
use crate::util::now_ms;

/// Shared v7 context so ids minted in the same millisecond stay monotonic.
static V7_CONTEXT: LazyLock<Mutex<ContextV7>> = LazyLock::new(|| Mutex::new(ContextV7::new()));

/// A unique identifier for a queued operation, using UUID v7.
///
/// Ids sort by creation time within the process, which is what gives the
/// queue its creation-order drain when two operations share a `created_at`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OperationId(Uuid);

impl OperationId {
    /// Create a new unique operation ID using UUID v7
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v7(Timestamp::now(&*V7_CONTEXT)))
    }

    /// Get the string representation of this ID
    #[must_use]
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for OperationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for OperationId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// The kind of mutation a queued operation carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationType {
    /// Create the record remotely
    Insert,
    /// Replace the remote record's content
    Update,
    /// Remove the record remotely
    Delete,
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Insert => write!(f, "INSERT"),
            Self::Update => write!(f, "UPDATE"),
            Self::Delete => write!(f, "DELETE"),
        }
    }
}

/// Delivery state of a queued operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationStatus {
    /// Awaiting first delivery attempt
    Pending,
    /// Handed to the executor
    InProgress,
    /// Durably confirmed by the remote service
    Completed,
    /// Last delivery attempt failed; retained for retry
    Failed,
}

impl fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "PENDING"),
            Self::InProgress => write!(f, "IN_PROGRESS"),
            Self::Completed => write!(f, "COMPLETED"),
            Self::Failed => write!(f, "FAILED"),
        }
    }
}

/// A durable record of one pending mutation awaiting delivery
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    /// Unique identifier
    pub id: OperationId,
    /// Mutation kind
    pub op: OperationType,
    /// Target collection
    pub table: String,
    /// Target record within the collection
    pub record_id: String,
    /// Entity content carried by the mutation
    pub payload: Value,
    /// Enqueue timestamp (Unix ms)
    pub created_at: i64,
    /// Number of failed delivery attempts so far
    #[serde(default)]
    pub retry_count: u32,
    /// Delivery state
    pub status: OperationStatus,
    /// Error message from the most recent failed attempt
    #[serde(default)]
    pub last_error: Option<String>,
}

impl Operation {
    /// Create a new pending operation
    #[must_use]
    pub fn new(
        op: OperationType,
        table: impl Into<String>,
        record_id: impl Into<String>,
        payload: Value,
    ) -> Self {
        Self {
            id: OperationId::new(),
            op,
            table: table.into(),
            record_id: record_id.into(),
            payload,
            created_at: now_ms(),
            retry_count: 0,
            status: OperationStatus::Pending,
            last_error: None,
        }
    }

    /// Convert to a storable JSON record
    pub fn to_record(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// Parse an operation from a stored JSON record
    pub fn from_record(record: Value) -> Result<Self> {
        Ok(serde_json::from_value(record)?)
    }
}
