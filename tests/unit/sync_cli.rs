//! CLI argument parsing and exit-code mapping.

use batch_ingest::cli::{Cli, CliError, Commands};
use batch_ingest::controller::SyncError;
use batch_ingest::dataset::RegistryError;
use batch_ingest::store::StoreError;
use batch_ingest::watermark::WindowError;
use batch_ingest::SyncMode;
use clap::Parser;

#[test]
fn test_sync_parses_full_argument_set() {
    let cli = Cli::parse_from([
        "batch-ingest",
        "sync",
        "--dataset",
        "daily_bars",
        "--mode",
        "full",
        "--start",
        "2024-01-01",
        "--end",
        "20240331",
        "--concurrency",
        "8",
        "--config",
        "ops/ingest.json",
    ]);

    let Commands::Sync(args) = cli.command else {
        panic!("expected sync command");
    };
    assert_eq!(args.dataset, "daily_bars");
    assert_eq!(args.mode, Some(SyncMode::Full));
    assert_eq!(args.start.unwrap().to_string(), "2024-01-01");
    assert_eq!(args.end.unwrap().to_string(), "2024-03-31");
    assert_eq!(args.concurrency, Some(8));
}

#[test]
fn test_sync_defaults_are_optional() {
    let cli = Cli::parse_from(["batch-ingest", "sync", "--dataset", "daily_bars"]);
    let Commands::Sync(args) = cli.command else {
        panic!("expected sync command");
    };
    assert_eq!(args.mode, None);
    assert_eq!(args.concurrency, None);
    assert_eq!(cli.config.to_str(), Some("ingest.json"));
}

#[test]
fn test_invalid_mode_is_rejected() {
    let result = Cli::try_parse_from([
        "batch-ingest",
        "sync",
        "--dataset",
        "daily_bars",
        "--mode",
        "yearly",
    ]);
    assert!(result.is_err());
}

#[test]
fn test_invalid_date_is_rejected() {
    let result = Cli::try_parse_from([
        "batch-ingest",
        "sync",
        "--dataset",
        "daily_bars",
        "--start",
        "01/01/2024",
    ]);
    assert!(result.is_err());
}

#[test]
fn test_excessive_concurrency_is_rejected() {
    let result = Cli::try_parse_from([
        "batch-ingest",
        "sync",
        "--dataset",
        "daily_bars",
        "--concurrency",
        "64",
    ]);
    assert!(result.is_err());
}

#[test]
fn test_datasets_subcommand_parses() {
    let cli = Cli::parse_from(["batch-ingest", "datasets", "--format", "json"]);
    assert!(matches!(cli.command, Commands::Datasets(_)));
}

#[test]
fn test_usage_errors_map_to_exit_2() {
    assert_eq!(
        CliError::Registry(RegistryError::Unknown("nope".into())).exit_code(),
        2
    );
    assert_eq!(
        CliError::Sync(SyncError::Window(WindowError::MissingStart)).exit_code(),
        2
    );
    assert_eq!(CliError::InvalidArgument("bad".into()).exit_code(), 2);
}

#[test]
fn test_runtime_errors_map_to_exit_1() {
    assert_eq!(
        CliError::Store(StoreError::Io("disk full".into())).exit_code(),
        1
    );
    assert_eq!(
        CliError::Sync(SyncError::Watermark(StoreError::Io("disk full".into()))).exit_code(),
        1
    );
}
