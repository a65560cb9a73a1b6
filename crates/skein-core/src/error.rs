//! Error types for skein-core

use thiserror::Error;

/// Result type alias using skein-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in skein-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Storage error (quota, corrupted collection, bad record shape)
    #[error("Storage error: {0}")]
    Storage(String),

    /// libSQL error
    #[error("libSQL error: {0}")]
    Database(#[from] libsql::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP transport error
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Network unreachable or probe failed
    #[error("Network error: {0}")]
    Network(String),

    /// A probe or request exceeded its deadline
    #[error("Timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// Remote service rejected a specific operation
    #[error("Remote rejected operation (HTTP {status}): {message}")]
    RemoteRejection {
        /// HTTP status code returned by the remote service
        status: u16,
        /// Error message extracted from the response body
        message: String,
    },

    /// A conflict handler failed to produce a merged entity
    #[error("Conflict resolution failed: {0}")]
    ConflictResolution(String),

    /// A sync pass is already running
    #[error("A sync pass is already in progress")]
    SyncInProgress,

    /// Record not found
    #[error("Record not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
