//! CLI entrypoint: parses arguments and dispatches to command implementations.
//!
//! Structurally grounded on the teacher's `cli::commands` (a `clap::Parser`
//! root struct plus a `Commands` subcommand enum, printed with `console`),
//! trimmed to the Control API surface (§4.5) instead of FOIA scraping
//! commands.

pub mod commands;

use clap::{Parser, Subcommand};

use crate::config::load_settings;

/// Check if verbose mode is enabled (for early logging setup, before clap parses).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Parser)]
#[command(name = "dataforge")]
#[command(about = "Distributed data-optimization pipeline for LLM training datasets")]
#[command(version)]
pub struct Cli {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Control API base URL, used by client-side commands.
    #[arg(long, short, env = "DATAFORGE_API_URL", global = true, default_value = "http://127.0.0.1:3030")]
    pub url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the Control API and an in-process worker pool.
    Serve {
        /// Address to bind to: PORT, HOST, or HOST:PORT.
        #[arg(default_value = "127.0.0.1:3030")]
        bind: String,
        /// Number of in-process worker loops (default: `MAX_WORKERS`).
        #[arg(short, long)]
        workers: Option<usize>,
    },

    /// Submit a dataset for asynchronous optimization (§4.5 `submit`).
    Submit {
        /// Path to a JSON file containing the dataset (array of records).
        dataset: std::path::PathBuf,
        /// Path to a JSON file of knowledge-base seed texts (array of strings).
        #[arg(long)]
        knowledge: Option<std::path::PathBuf>,
        /// Path to a JSON file with optimization guidance.
        #[arg(long)]
        guidance: Option<std::path::PathBuf>,
        /// Persist reports/artifacts once the task completes.
        #[arg(long)]
        save_reports: bool,
        /// Explicit task id (a UUID is generated if omitted).
        #[arg(long)]
        task_id: Option<String>,
    },

    /// Submit a small dataset and block for the result (§4.5 `submit_sync`).
    SubmitSync {
        dataset: std::path::PathBuf,
        #[arg(long)]
        knowledge: Option<std::path::PathBuf>,
        #[arg(long)]
        guidance: Option<std::path::PathBuf>,
        #[arg(long)]
        task_id: Option<String>,
    },

    /// Fetch a task's status and (if completed) its optimized dataset (§4.5 `get`).
    Get { task_id: String },

    /// List tasks, optionally filtered by status (§4.5 `list`).
    List {
        #[arg(long)]
        status: Option<String>,
        #[arg(long, default_value = "50")]
        limit: usize,
    },

    /// Delete a task and its batch results (§4.5 `delete`).
    Delete { task_id: String },

    /// Re-enqueue a non-terminal task (§4.5 `resume`).
    Resume { task_id: String },

    /// Print aggregate task counts by status (§4.5 `stats`).
    Stats,

    /// Print Control API health (§4.5 `health`).
    Health,
}

pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings = load_settings().await;

    match cli.command {
        Commands::Serve { bind, workers } => commands::serve::cmd_serve(&settings, &bind, workers).await,
        Commands::Submit { dataset, knowledge, guidance, save_reports, task_id } => {
            commands::client::cmd_submit(&cli.url, dataset, knowledge, guidance, save_reports, task_id).await
        }
        Commands::SubmitSync { dataset, knowledge, guidance, task_id } => {
            commands::client::cmd_submit_sync(&cli.url, dataset, knowledge, guidance, task_id).await
        }
        Commands::Get { task_id } => commands::client::cmd_get(&cli.url, &task_id).await,
        Commands::List { status, limit } => commands::client::cmd_list(&cli.url, status, limit).await,
        Commands::Delete { task_id } => commands::client::cmd_delete(&cli.url, &task_id).await,
        Commands::Resume { task_id } => commands::client::cmd_resume(&cli.url, &task_id).await,
        Commands::Stats => commands::client::cmd_stats(&cli.url).await,
        Commands::Health => commands::client::cmd_health(&cli.url).await,
    }
}
