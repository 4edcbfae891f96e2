use std::path::{Path, PathBuf};

use anyhow::Result;
use tracing::{info, warn};

use crate::{
    analysis::RegionalAnalysis,
    cli::{create_spinner, strictness_override, AnalyzeArgs},
    config::AppConfig,
    export::export_all,
    ingestion::Ingestion,
    source::{BatchCache, Filters, HttpTransport, LocalSource, RemoteSource},
    states::state_name,
    table::{EmissionsTable, FACILITY_ALIASES},
};

use super::{default_year, load_config, make_output_dir};

const TOP_N: usize = 5;

/// Ingests, analyses and exports one state. Returns the output directory, or
/// `None` when there was no data.
pub async fn analyze(args: &AnalyzeArgs) -> Result<Option<PathBuf>> {
    let mut config = load_config(args.config.as_deref())?;
    if let Some(strictness) = strictness_override(args.strict, args.strictness) {
        config.strictness = strictness;
    }

    let state = args.state.trim().to_uppercase();
    let label = match state_name(&state) {
        Some(name) => name.to_string(),
        None => {
            warn!(state = %state, "unknown state code");
            state.clone()
        }
    };
    info!("starting analysis for {label}");

    let table = match &args.input_dir {
        Some(dir) => read_local(dir, &state, args, &config).await?,
        None => read_remote(&state, args, &config).await?,
    };

    if table.is_empty() {
        warn!("no data found for {label}");
        return Ok(None);
    }

    let output_dir = make_output_dir(&state, args.output_dir.as_deref());
    let spinner = create_spinner("Analysing emissions...".to_string());
    let analysis = RegionalAnalysis::new(&table);
    let top_counties = analysis.top_counties(TOP_N);
    let top_sectors = analysis.top_sectors(TOP_N);
    export_all(&table, &output_dir)?;
    spinner.finish_with_message("Analysis complete");

    print_summary(&label, &table, &top_counties, &top_sectors);

    Ok(Some(output_dir))
}

async fn read_local(
    dir: &Path,
    state: &str,
    args: &AnalyzeArgs,
    config: &AppConfig,
) -> Result<EmissionsTable> {
    let ingestion = Ingestion::new(LocalSource::new(dir))
        .with_strictness(config.strictness)
        .with_validation(!args.no_validate);
    let filters = Filters::new(Some(state.to_string()), args.year);

    let spinner = create_spinner(format!("Reading files from {}...", dir.display()));
    let table = ingestion.read(&filters).await?;
    spinner.finish_with_message(format!("Read {} rows", table.len()));

    Ok(table)
}

async fn read_remote(state: &str, args: &AnalyzeArgs, config: &AppConfig) -> Result<EmissionsTable> {
    let year = args.year.unwrap_or_else(default_year);
    let table_name = args.table.as_deref().unwrap_or(&config.table);

    let transport = HttpTransport::new(&config.endpoint, config.timeout())?;
    let mut source = RemoteSource::new(transport, table_name, config);
    if args.cache_batches || args.recover {
        source = source.with_cache(BatchCache::new(config.batch_cache_dir())?);
    }
    let ingestion = Ingestion::new(source)
        .with_strictness(config.strictness)
        .with_validation(!args.no_validate);
    let filters = Filters::new(Some(state.to_string()), Some(year));

    let table = if args.recover {
        let spinner = create_spinner("Recovering batch files...".to_string());
        let table = ingestion.admit(ingestion.source().recover()?, &filters)?;
        spinner.finish_with_message(format!("Recovered {} rows", table.len()));
        table
    } else {
        let spinner = create_spinner(format!(
            "Fetching {} for {state} {year}...",
            ingestion.source().table()
        ));
        let table = ingestion.read(&filters).await?;
        spinner.finish_with_message(format!("Fetched {} rows", table.len()));
        table
    };

    Ok(table)
}

fn print_summary(
    label: &str,
    table: &EmissionsTable,
    top_counties: &[(String, f64)],
    top_sectors: &[(String, f64)],
) {
    println!("\nAnalysis Summary for {label}:");
    println!("Records: {}", table.len());
    if let Some(n) = facility_count(table) {
        println!("Facilities: {n}");
    }

    print_ranking("Top 5 Counties by Emissions", "county", top_counties);
    print_ranking("Top 5 Industries by Emissions", "industry", top_sectors);
}

fn print_ranking(title: &str, what: &str, items: &[(String, f64)]) {
    if items.is_empty() {
        println!("\nNo {what} emissions data available");
        return;
    }
    println!("\n{title}:");
    for (name, total) in items {
        println!("  {name:<40} {total:>16.2}");
    }
}

fn facility_count(table: &EmissionsTable) -> Option<usize> {
    let column = table.resolve_column(FACILITY_ALIASES)?;
    let mut facilities: Vec<String> = table.column(column)?.filter_map(|c| c.as_key()).collect();
    facilities.sort();
    facilities.dedup();
    Some(facilities.len())
}

// -- Tests ---
