//! CLI command for listing configured datasets

use crate::dataset::IngestConfig;
use clap::Args;
use serde_json::json;

use super::{Cli, CliError};

/// Datasets subcommand
#[derive(Debug, Args)]
pub struct DatasetsCommand {
    /// Output format
    #[arg(long, default_value = "human")]
    format: OutputFormat,
}

/// Output format for the datasets command
#[derive(Debug, Clone, clap::ValueEnum)]
enum OutputFormat {
    /// Human-readable output
    Human,
    /// JSON output
    Json,
}

impl DatasetsCommand {
    /// Execute the datasets command
    pub async fn execute(&self, cli: &Cli) -> Result<(), CliError> {
        let config = IngestConfig::load(&cli.config)?;
        match self.format {
            OutputFormat::Human => {
                println!("Configured datasets ({}):", config.datasets.len());
                for dataset in &config.datasets {
                    println!(
                        "  {:<24} endpoint={:<20} table={:<20} mode={} earliest={}",
                        dataset.name, dataset.endpoint, dataset.table, dataset.mode,
                        dataset.earliest
                    );
                }
            }
            OutputFormat::Json => {
                let datasets: Vec<_> = config
                    .datasets
                    .iter()
                    .map(|d| {
                        json!({
                            "name": d.name,
                            "endpoint": d.endpoint,
                            "table": d.table,
                            "mode": d.mode,
                            "earliest": d.earliest,
                            "primary_key": d.primary_key,
                        })
                    })
                    .collect();
                println!("{}", serde_json::to_string_pretty(&json!({ "datasets": datasets })).unwrap_or_default());
            }
        }
        Ok(())
    }
}
