use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use skein_core::models::Operation;
use skein_core::remote::{HttpRemoteStore, MemoryRemoteStore, RemoteStore};
use skein_core::{EngineConfig, Story, SyncEngine};

use crate::error::CliError;

const REMOTE_URL_VAR: &str = "SKEIN_REMOTE_URL";
const REMOTE_TOKEN_VAR: &str = "SKEIN_REMOTE_TOKEN";
const DB_PATH_VAR: &str = "SKEIN_DB_PATH";

/// CLI flag, then env var, then the platform data directory.
pub fn resolve_db_path(cli_path: Option<PathBuf>) -> PathBuf {
    if let Some(path) = cli_path {
        return path;
    }
    if let Ok(path) = env::var(DB_PATH_VAR) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }
    dirs::data_dir().map_or_else(
        || PathBuf::from("skein.db"),
        |dir| dir.join("skein").join("skein.db"),
    )
}

/// Whether a remote endpoint is configured in the environment.
pub fn remote_configured() -> bool {
    env::var(REMOTE_URL_VAR).is_ok_and(|url| !url.trim().is_empty())
}

fn build_remote() -> Result<Arc<dyn RemoteStore>, CliError> {
    if let Ok(url) = env::var(REMOTE_URL_VAR) {
        if !url.trim().is_empty() {
            let token = env::var(REMOTE_TOKEN_VAR).ok();
            let remote = HttpRemoteStore::new(url, token, Duration::from_secs(10))?;
            return Ok(Arc::new(remote));
        }
    }
    // Local-only mode: an empty in-memory remote keeps the engine assembled;
    // commands that actually need the network check `remote_configured`
    Ok(Arc::new(MemoryRemoteStore::new()))
}

/// Assemble an engine over the CLI database and environment remote.
pub async fn open_engine(db_path: &Path) -> Result<SyncEngine, CliError> {
    let remote = build_remote()?;
    Ok(SyncEngine::open_path(db_path, remote, EngineConfig::default()).await?)
}

#[derive(Debug, Serialize)]
pub struct StoryListItem {
    pub id: String,
    pub title: String,
    pub summary: Option<String>,
    pub updated_at: i64,
    pub relative_time: String,
    pub is_synced: bool,
}

pub fn story_to_item(story: &Story) -> StoryListItem {
    StoryListItem {
        id: story.id.as_str(),
        title: story.title.clone(),
        summary: story.summary.clone(),
        updated_at: story.updated_at,
        relative_time: format_relative_time(story.updated_at),
        is_synced: story.is_synced,
    }
}

#[derive(Debug, Serialize)]
pub struct OperationListItem {
    pub id: String,
    pub op: String,
    pub table: String,
    pub record_id: String,
    pub created_at: i64,
    pub retry_count: u32,
    pub status: String,
    pub last_error: Option<String>,
}

pub fn operation_to_item(operation: &Operation) -> OperationListItem {
    OperationListItem {
        id: operation.id.as_str(),
        op: operation.op.to_string(),
        table: operation.table.clone(),
        record_id: operation.record_id.clone(),
        created_at: operation.created_at,
        retry_count: operation.retry_count,
        status: operation.status.to_string(),
        last_error: operation.last_error.clone(),
    }
}

/// One printable line per story: short id, title, age, sync marker.
pub fn format_story_lines(stories: &[Story]) -> Vec<String> {
    stories
        .iter()
        .map(|story| {
            let id = story.id.as_str();
            let short_id = &id[..8.min(id.len())];
            let marker = if story.is_synced { "" } else { " [unsynced]" };
            format!(
                "{short_id}  {}  ({}){marker}",
                story.title,
                format_relative_time(story.updated_at)
            )
        })
        .collect()
}

/// One printable line per queued operation.
pub fn format_operation_lines(operations: &[Operation]) -> Vec<String> {
    operations
        .iter()
        .map(|operation| {
            let error = operation
                .last_error
                .as_deref()
                .map(|message| format!(" - {message}"))
                .unwrap_or_default();
            format!(
                "{}  {} {}/{}  {} retries={}{error}",
                operation.id,
                operation.op,
                operation.table,
                operation.record_id,
                operation.status,
                operation.retry_count
            )
        })
        .collect()
}

/// Coarse "how long ago" formatting for list output.
pub fn format_relative_time(updated_at_ms: i64) -> String {
    let now = chrono::Utc::now().timestamp_millis();
    let delta_secs = (now - updated_at_ms).max(0) / 1000;
    match delta_secs {
        0..=59 => "just now".to_string(),
        60..=3599 => format!("{}m ago", delta_secs / 60),
        3600..=86_399 => format!("{}h ago", delta_secs / 3600),
        _ => format!("{}d ago", delta_secs / 86_400),
    }
}

/// Resolve a story by full id or unique id prefix.
pub fn resolve_story(stories: &[Story], needle: &str) -> Result<Story, CliError> {
    let needle = needle.trim();
    if needle.is_empty() {
        return Err(CliError::StoryNotFound(needle.to_string()));
    }

    let matches: Vec<&Story> = stories
        .iter()
        .filter(|story| story.id.as_str().starts_with(needle))
        .collect();

    match matches.as_slice() {
        [] => Err(CliError::StoryNotFound(needle.to_string())),
        [story] => Ok((*story).clone()),
        many => Err(CliError::AmbiguousStoryId(format!(
            "Id prefix '{needle}' matches {} stories; use more characters",
            many.len()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn story_updated_at(title: &str, updated_at: i64) -> Story {
        let mut story = Story::new(title);
        story.updated_at = updated_at;
        story
    }

    #[test]
    fn relative_time_buckets() {
        let now = chrono::Utc::now().timestamp_millis();
        assert_eq!(format_relative_time(now), "just now");
        assert_eq!(format_relative_time(now - 5 * 60 * 1000), "5m ago");
        assert_eq!(format_relative_time(now - 3 * 3600 * 1000), "3h ago");
        assert_eq!(format_relative_time(now - 2 * 86_400 * 1000), "2d ago");
        // Future timestamps clamp to "just now"
        assert_eq!(format_relative_time(now + 60_000), "just now");
    }

    #[test]
    fn resolve_story_by_unique_prefix() {
        let stories = vec![Story::new("One"), Story::new("Two")];
        let full_id = stories[0].id.as_str();

        let found = resolve_story(&stories, &full_id[..10]).unwrap();
        assert_eq!(found.id, stories[0].id);

        let missing = resolve_story(&stories, "zzzz");
        assert!(matches!(missing, Err(CliError::StoryNotFound(_))));

        let empty = resolve_story(&stories, "  ");
        assert!(matches!(empty, Err(CliError::StoryNotFound(_))));
    }

    #[test]
    fn resolve_story_rejects_ambiguous_prefix() {
        // UUIDv7 ids created back-to-back share their timestamp prefix
        let stories = vec![Story::new("One"), Story::new("Two")];
        let shared: String = stories[0]
            .id
            .as_str()
            .chars()
            .zip(stories[1].id.as_str().chars())
            .take_while(|(a, b)| a == b)
            .map(|(a, _)| a)
            .collect();

        if !shared.is_empty() {
            let result = resolve_story(&stories, &shared);
            assert!(matches!(result, Err(CliError::AmbiguousStoryId(_))));
        }
    }

    #[test]
    fn story_lines_flag_unsynced_entries() {
        let now = chrono::Utc::now().timestamp_millis();
        let mut synced = story_updated_at("Done", now);
        synced.is_synced = true;
        let drafted = story_updated_at("Draft", now);

        let lines = format_story_lines(&[synced, drafted]);
        assert!(!lines[0].contains("[unsynced]"));
        assert!(lines[1].contains("[unsynced]"));
        assert!(lines[1].contains("Draft"));
    }

    #[test]
    fn operation_lines_carry_errors() {
        use serde_json::json;
        use skein_core::models::{OperationStatus, OperationType};

        let mut operation =
            Operation::new(OperationType::Update, "stories", "s-1", json!({}));
        operation.status = OperationStatus::Failed;
        operation.retry_count = 2;
        operation.last_error = Some("remote rejected".to_string());

        let lines = format_operation_lines(&[operation]);
        assert!(lines[0].contains("UPDATE"));
        assert!(lines[0].contains("FAILED"));
        assert!(lines[0].contains("retries=2"));
        assert!(lines[0].contains("remote rejected"));
    }
}
