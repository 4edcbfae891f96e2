use std::path::Path;

use anyhow::Result;

use crate::{
    cli::create_spinner,
    source::{remote::RemoteTable, HttpTransport, RemoteSource},
};

use super::load_config;

/// Lists the tables the remote service exposes.
pub async fn tables(config: Option<&Path>) -> Result<Vec<RemoteTable>> {
    let config = load_config(config)?;
    let transport = HttpTransport::new(&config.endpoint, config.timeout())?;
    let source = RemoteSource::new(transport, &config.table, &config);

    let spinner = create_spinner("Querying remote tables...".to_string());
    let tables = source.discover_tables().await?;
    spinner.finish_with_message(format!("{} tables", tables.len()));

    for table in &tables {
        match &table.description {
            Some(description) => println!("  {:<50} {description}", table.name),
            None => println!("  {}", table.name),
        }
    }

    Ok(tables)
}
