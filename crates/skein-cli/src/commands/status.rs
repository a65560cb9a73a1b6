use std::path::Path;

use serde::Serialize;

use crate::commands::common::{open_engine, remote_configured};
use crate::error::CliError;

#[derive(Debug, Serialize)]
struct StatusItem {
    connectivity: String,
    consecutive_heartbeat_failures: u32,
    remote_configured: bool,
    pending_operations: usize,
    failed_operations: usize,
    unsynced_stories: usize,
}

pub async fn run_status(as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let engine = open_engine(db_path).await?;

    let connectivity = engine.network().force_check().await;
    let snapshot = engine.network().status_snapshot();

    let item = StatusItem {
        connectivity: connectivity.to_string(),
        consecutive_heartbeat_failures: snapshot.consecutive_failures,
        remote_configured: remote_configured(),
        pending_operations: engine.queue().pending_count().await?,
        failed_operations: engine.queue().failed_count().await?,
        unsynced_stories: engine.unsynced_stories().await?.len(),
    };

    if as_json {
        println!("{}", serde_json::to_string_pretty(&item)?);
        return Ok(());
    }

    println!("connectivity:      {}", item.connectivity);
    if item.consecutive_heartbeat_failures > 0 {
        println!(
            "heartbeat misses:  {}",
            item.consecutive_heartbeat_failures
        );
    }
    println!(
        "remote:            {}",
        if item.remote_configured {
            "configured"
        } else {
            "not configured"
        }
    );
    println!("pending ops:       {}", item.pending_operations);
    println!("failed ops:        {}", item.failed_operations);
    println!("unsynced stories:  {}", item.unsynced_stories);
    Ok(())
}
