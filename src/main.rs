mod analysis;
mod cli;
mod config;
mod error;
mod export;
mod ingestion;
mod parquet;
mod source;
mod states;
mod table;
mod validation;

use anyhow::{Error, Result};
use clap::Parser;
use cli::{command, strictness_override, Cli, Commands};
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), Error> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match &cli.command {
        Commands::Analyze(args) => match command::analyze(args).await {
            Ok(Some(dir)) => println!("\nDetailed results saved to `{}`", dir.display()),
            Ok(None) => println!("\nNo data available for analysis"),
            Err(e) => eprintln!("Error: {:#}", e),
        },
        Commands::Ingest {
            dir,
            strict,
            strictness,
        } => match command::ingest(dir, strictness_override(*strict, *strictness).unwrap_or_default()) {
            Ok(summaries) => {
                let passed = summaries.iter().filter(|s| s.error.is_none()).count();
                println!("{passed} of {} files passed validation", summaries.len());
            }
            Err(e) => eprintln!("Error: {:#}", e),
        },
        Commands::Tables { config } => {
            if let Err(e) = command::tables(config.as_deref()).await {
                eprintln!("Error: {:#}", e);
            }
        }
    }

    Ok(())
}
