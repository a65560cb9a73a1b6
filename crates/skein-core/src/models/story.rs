//! Story and segment models

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::Result;
use crate::util::now_ms;

/// A unique identifier for a story, using UUID v7 (time-sortable)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StoryId(Uuid);

impl StoryId {
    /// Create a new unique story ID using UUID v7
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the string representation of this ID
    #[must_use]
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for StoryId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for StoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for StoryId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// A unique identifier for a story segment, using UUID v7
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SegmentId(Uuid);

impl SegmentId {
    /// Create a new unique segment ID using UUID v7
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the string representation of this ID
    #[must_use]
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for SegmentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SegmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SegmentId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// A story in the system
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Story {
    /// Unique identifier
    pub id: StoryId,
    /// Display title
    pub title: String,
    /// Optional one-line summary
    #[serde(default)]
    pub summary: Option<String>,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
    /// Last update timestamp (Unix ms)
    pub updated_at: i64,
    /// Whether this copy has been reconciled with the remote service
    #[serde(default)]
    pub is_synced: bool,
}

impl Story {
    /// Create a new story with the given title
    #[must_use]
    pub fn new(title: impl Into<String>) -> Self {
        let now = now_ms();
        Self {
            id: StoryId::new(),
            title: title.into(),
            summary: None,
            created_at: now,
            updated_at: now,
            is_synced: false,
        }
    }

    /// Stamp a local edit: bump `updated_at` and clear the synced flag
    pub fn touch(&mut self) {
        self.updated_at = now_ms();
        self.is_synced = false;
    }

    /// Convert to a storable JSON record
    pub fn to_record(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// Parse a story from a stored JSON record
    pub fn from_record(record: Value) -> Result<Self> {
        Ok(serde_json::from_value(record)?)
    }
}

/// One ordered segment of a story's body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorySegment {
    /// Unique identifier
    pub id: SegmentId,
    /// Owning story
    pub story_id: StoryId,
    /// Position within the story, 0-based
    pub position: i64,
    /// Segment text
    pub body: String,
    /// Optional illustration URL
    #[serde(default)]
    pub image_url: Option<String>,
    /// Optional narration audio URL
    #[serde(default)]
    pub audio_url: Option<String>,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
    /// Last update timestamp (Unix ms)
    pub updated_at: i64,
    /// Whether this copy has been reconciled with the remote service
    #[serde(default)]
    pub is_synced: bool,
}

impl StorySegment {
    /// Create a new segment at the given position
    #[must_use]
    pub fn new(story_id: StoryId, position: i64, body: impl Into<String>) -> Self {
        let now = now_ms();
        Self {
            id: SegmentId::new(),
            story_id,
            position,
            body: body.into(),
            image_url: None,
            audio_url: None,
            created_at: now,
            updated_at: now,
            is_synced: false,
        }
    }

    /// Stamp a local edit: bump `updated_at` and clear the synced flag
    pub fn touch(&mut self) {
        self.updated_at = now_ms();
        self.is_synced = false;
    }

    /// Convert to a storable JSON record
    pub fn to_record(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// Parse a segment from a stored JSON record
    pub fn from_record(record: Value) -> Result<Self> {
        Ok(serde_json::from_value(record)?)
    }
}
