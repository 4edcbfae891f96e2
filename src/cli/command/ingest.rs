use std::path::Path;

use anyhow::{bail, Result};
use tracing::error;

use crate::{
    cli::create_progress_bar,
    ingestion::Ingestion,
    source::LocalSource,
    validation::Strictness,
};

/// Outcome of reading one file.
#[derive(Debug, PartialEq)]
pub struct FileSummary {
    pub name: String,
    pub rows: Option<usize>,
    pub error: Option<String>,
}

/// Reads and validates every file in `dir`, printing one line per file.
pub fn ingest(dir: &Path, strictness: Strictness) -> Result<Vec<FileSummary>> {
    let ingestion = Ingestion::new(LocalSource::new(dir)).with_strictness(strictness);

    let files = ingestion.list_available_files()?;
    if files.is_empty() {
        bail!("no .csv, .xlsx or .xls files in {}", dir.display());
    }

    let pb = create_progress_bar(files.len() as u64, "Validating files...".to_string());
    let mut summaries = Vec::with_capacity(files.len());
    for name in files {
        let summary = match ingestion.read_file(&name) {
            Ok(table) => FileSummary {
                name,
                rows: Some(table.len()),
                error: None,
            },
            Err(e) => {
                error!(file = %name, error = %e, "file rejected");
                FileSummary {
                    name,
                    rows: None,
                    error: Some(e.to_string()),
                }
            }
        };
        summaries.push(summary);
        pb.inc(1);
    }
    pb.finish_with_message("Files validated");

    for summary in &summaries {
        match (&summary.rows, &summary.error) {
            (Some(rows), _) => println!("  ok       {:<40} {rows} rows", summary.name),
            (None, Some(e)) => println!("  rejected {:<40} {e}", summary.name),
            (None, None) => {}
        }
    }

    Ok(summaries)
}

// -- Tests ---
