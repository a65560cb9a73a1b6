use std::path::Path;

use skein_core::sync::SyncEvent;

use crate::commands::common::{open_engine, remote_configured};
use crate::error::CliError;

pub async fn run_sync(db_path: &Path) -> Result<(), CliError> {
    if !remote_configured() {
        return Err(CliError::SyncNotConfigured);
    }

    let engine = open_engine(db_path).await?;
    engine.sync_service().register_handler(|event| {
        if let SyncEvent::ConflictResolved {
            table,
            record_id,
            strategy,
            ..
        } = event
        {
            println!("Resolved conflict on {table}/{record_id} via {strategy}");
        }
    });

    let report = engine.sync_now().await?;

    println!(
        "Sync {}: {} stories, {} segments, {} conflicts",
        if report.success { "completed" } else { "finished with errors" },
        report.synced_stories,
        report.synced_segments,
        report.conflicts
    );
    for issue in &report.errors {
        let record = issue.record_id.as_deref().unwrap_or("-");
        eprintln!("  {}/{}: {}", issue.table, record, issue.message);
    }
    Ok(())
}
