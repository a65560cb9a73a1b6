use std::path::Path;

use skein_core::models::OperationId;

use crate::commands::common::{
    format_operation_lines, open_engine, operation_to_item, remote_configured, OperationListItem,
};
use crate::error::CliError;

pub async fn run_list(as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let engine = open_engine(db_path).await?;
    let operations = engine.queue().list_operations().await?;

    if as_json {
        let items: Vec<OperationListItem> = operations.iter().map(operation_to_item).collect();
        println!("{}", serde_json::to_string_pretty(&items)?);
        return Ok(());
    }

    if operations.is_empty() {
        println!("Queue is empty.");
        return Ok(());
    }
    for line in format_operation_lines(&operations) {
        println!("{line}");
    }
    Ok(())
}

pub async fn run_retry(id: Option<&str>, db_path: &Path) -> Result<(), CliError> {
    if !remote_configured() {
        return Err(CliError::SyncNotConfigured);
    }

    let engine = open_engine(db_path).await?;
    match id {
        Some(raw) => {
            let operation_id: OperationId = raw
                .parse()
                .map_err(|_| CliError::InvalidOperationId(raw.to_string()))?;
            let outcome = engine.queue().retry_operation(operation_id).await?;
            if outcome.success {
                println!("Operation {} delivered", outcome.operation_id);
            } else {
                println!(
                    "Operation {} failed again: {}",
                    outcome.operation_id,
                    outcome.error.unwrap_or_default()
                );
            }
        }
        None => {
            let outcomes = engine.queue().retry_all_failed().await?;
            let delivered = outcomes.iter().filter(|outcome| outcome.success).count();
            println!(
                "Retried {} operations, {} delivered, {} still failing",
                outcomes.len(),
                delivered,
                outcomes.len() - delivered
            );
        }
    }
    Ok(())
}
