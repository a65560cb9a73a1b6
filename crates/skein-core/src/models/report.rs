//! Sync pass result model

use serde::{Deserialize, Serialize};

/// One entity-level failure captured during a sync pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncIssue {
    /// Collection the failing entity belongs to
    pub table: String,
    /// Failing record, when the failure is entity-specific
    pub record_id: Option<String>,
    /// Human-readable cause
    pub message: String,
}

impl SyncIssue {
    /// Capture an entity-level failure
    #[must_use]
    pub fn new(
        table: impl Into<String>,
        record_id: Option<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            table: table.into(),
            record_id,
            message: message.into(),
        }
    }
}

/// Tally returned from each synchronization pass; never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    /// True when the pass finished with zero captured issues
    pub success: bool,
    /// Stories reconciled this pass
    pub synced_stories: usize,
    /// Segments reconciled this pass
    pub synced_segments: usize,
    /// Conflicts detected (and resolved, absent issues) this pass
    pub conflicts: usize,
    /// Entity-level failures; the pass reports partial success
    pub errors: Vec<SyncIssue>,
}

impl SyncReport {
    /// Start an empty tally
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Finalize the success flag from the captured issues
    pub fn finish(&mut self) {
        self.success = self.errors.is_empty();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finish_derives_success_from_errors() {
        let mut clean = SyncReport::new();
        clean.synced_stories = 2;
        clean.finish();
        assert!(clean.success);

        let mut dirty = SyncReport::new();
        dirty.errors.push(SyncIssue::new("stories", None, "boom"));
        dirty.finish();
        assert!(!dirty.success);
    }
}
