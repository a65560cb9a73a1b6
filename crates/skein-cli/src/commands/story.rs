use std::path::Path;

use skein_core::Story;

use crate::commands::common::{
    format_story_lines, open_engine, resolve_story, story_to_item, StoryListItem,
};
use crate::error::CliError;

pub async fn run_add(
    title_words: &[String],
    summary: Option<String>,
    db_path: &Path,
) -> Result<(), CliError> {
    let title = title_words.join(" ");
    let title = title.trim();
    if title.is_empty() {
        return Err(CliError::EmptyTitle);
    }

    let engine = open_engine(db_path).await?;
    let mut story = Story::new(title);
    story.summary = summary.map(|text| text.trim().to_string()).filter(|text| !text.is_empty());
    engine.save_story(&story).await?;

    println!("Added story {}", story.id);
    Ok(())
}

pub async fn run_list(limit: usize, as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let engine = open_engine(db_path).await?;
    let mut stories = engine.list_stories().await?;
    stories.sort_by_key(|story| std::cmp::Reverse(story.updated_at));
    stories.truncate(limit);

    if as_json {
        let items: Vec<StoryListItem> = stories.iter().map(story_to_item).collect();
        println!("{}", serde_json::to_string_pretty(&items)?);
        return Ok(());
    }

    if stories.is_empty() {
        println!("No stories yet. Try: skein add \"My first story\"");
        return Ok(());
    }
    for line in format_story_lines(&stories) {
        println!("{line}");
    }
    Ok(())
}

pub async fn run_show(id: &str, db_path: &Path) -> Result<(), CliError> {
    let engine = open_engine(db_path).await?;
    let stories = engine.list_stories().await?;
    let story = resolve_story(&stories, id)?;

    println!("id:      {}", story.id);
    println!("title:   {}", story.title);
    if let Some(summary) = &story.summary {
        println!("summary: {summary}");
    }
    println!("synced:  {}", story.is_synced);

    let segments = engine.segments_of(&story.id).await?;
    if !segments.is_empty() {
        println!();
        for segment in &segments {
            let marker = if segment.is_synced { "" } else { " [unsynced]" };
            println!("  {}. {}{marker}", segment.position, segment.body);
        }
    }
    Ok(())
}

pub async fn run_delete(id: &str, db_path: &Path) -> Result<(), CliError> {
    let engine = open_engine(db_path).await?;
    let stories = engine.list_stories().await?;
    let story = resolve_story(&stories, id)?;

    engine.delete_story(&story.id).await?;
    println!("Deleted story {} ({})", story.id, story.title);
    Ok(())
}
