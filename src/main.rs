//! Main entry point for batch-ingest CLI

use batch_ingest::cli::{Cli, Commands};
use batch_ingest::shutdown::ShutdownCoordinator;
use batch_ingest::RunState;
use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

/// Initialize tracing subscriber with optional JSON formatting
fn init_tracing() {
    // Check if JSON output is requested via environment variable
    let json_format = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("batch_ingest=info"));

    if json_format {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() {
    init_tracing();

    let cli = Cli::parse();

    // Ctrl+C requests a cooperative shutdown; in-flight batches finish and
    // the rest are recorded as skipped.
    let shutdown = ShutdownCoordinator::shared();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Ctrl+C received - finishing in-flight batches...");
                shutdown.request_shutdown();
            }
        }
    });

    let exit_code = match cli.command {
        Commands::Sync(ref args) => match args.execute(&cli, shutdown).await {
            Ok(RunState::Completed) => 0,
            Ok(RunState::PartiallyFailed) => 1,
            Ok(RunState::Aborted) => 3,
            Err(e) => {
                error!("Command failed: {}", e);
                e.exit_code()
            }
        },
        Commands::Datasets(ref cmd) => match cmd.execute(&cli).await {
            Ok(()) => 0,
            Err(e) => {
                error!("Command failed: {}", e);
                e.exit_code()
            }
        },
    };

    std::process::exit(exit_code);
}
