//! Skein CLI - local-first story notebook from the terminal
//!
//! Capture and browse stories offline; reconcile with a remote service when
//! one is configured.

mod commands;
mod error;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::error::CliError;

#[derive(Parser)]
#[command(name = "skein")]
#[command(about = "Local-first story notebook that syncs when it can")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Optional path to local database file
    #[arg(long, value_name = "PATH")]
    db_path: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new story
    #[command(alias = "new")]
    Add {
        /// Story title
        title: Vec<String>,
        /// Optional one-line summary
        #[arg(long)]
        summary: Option<String>,
    },
    /// List stories, most recently updated first
    List {
        /// Number of stories to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show one story and its segments
    Show {
        /// Story id or unique id prefix
        id: String,
    },
    /// Delete a story and its segments
    Delete {
        /// Story id or unique id prefix
        id: String,
    },
    /// Connectivity and queue status
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Push queued changes and reconcile with the remote service
    Sync,
    /// Inspect or retry queued operations
    Queue {
        #[command(subcommand)]
        command: QueueCommands,
    },
}

#[derive(Subcommand)]
enum QueueCommands {
    /// List retained operations in creation order
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Retry failed operations
    Retry {
        /// Specific operation id; retries all failed operations when omitted
        id: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("skein=info".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();
    let db_path = commands::common::resolve_db_path(cli.db_path);

    match cli.command {
        Commands::Add { title, summary } => {
            commands::story::run_add(&title, summary, &db_path).await
        }
        Commands::List { limit, json } => commands::story::run_list(limit, json, &db_path).await,
        Commands::Show { id } => commands::story::run_show(&id, &db_path).await,
        Commands::Delete { id } => commands::story::run_delete(&id, &db_path).await,
        Commands::Status { json } => commands::status::run_status(json, &db_path).await,
        Commands::Sync => commands::sync::run_sync(&db_path).await,
        Commands::Queue { command } => match command {
            QueueCommands::List { json } => commands::queue::run_list(json, &db_path).await,
            QueueCommands::Retry { id } => {
                commands::queue::run_retry(id.as_deref(), &db_path).await
            }
        },
    }
}
