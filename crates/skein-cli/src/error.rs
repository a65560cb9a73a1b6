use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] skein_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Story title cannot be empty")]
    EmptyTitle,
    #[error("Story not found for id/prefix: {0}")]
    StoryNotFound(String),
    #[error("{0}")]
    AmbiguousStoryId(String),
    #[error("Operation ID is not valid: {0}")]
    InvalidOperationId(String),
    #[error(
        "Remote sync is not configured. Set SKEIN_REMOTE_URL (and optionally SKEIN_REMOTE_TOKEN) to enable it."
    )]
    SyncNotConfigured,
}
