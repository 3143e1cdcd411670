mod commands;
mod logging;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "cdrsync",
    version,
    about = "Call detail record sync and Parquet export"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Sync the API into the normalized call table
    SyncCalls {
        /// Path to job YAML file
        config: PathBuf,
    },
    /// Sync the API into the source-shaped raw table
    SyncRaw {
        /// Path to job YAML file
        config: PathBuf,
    },
    /// Export a table to Parquet and publish it to object storage
    Export {
        /// Path to job YAML file
        config: PathBuf,
        /// Write the Parquet file but skip the upload
        #[arg(long)]
        dry_run: bool,
        /// Also copy the Parquet file to this path
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Validate configuration, database connectivity, and source access
    Check {
        /// Path to job YAML file
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    logging::init(&cli.log_level)?;

    match cli.command {
        Commands::SyncCalls { config } => commands::sync::execute_calls(&config).await,
        Commands::SyncRaw { config } => commands::sync::execute_raw(&config).await,
        Commands::Export {
            config,
            dry_run,
            output,
        } => commands::export::execute(&config, dry_run, output).await,
        Commands::Check { config } => commands::check::execute(&config).await,
    }
}
