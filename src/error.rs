//! Error type shared by the sources, ingestion and export layers.

use thiserror::Error;

use crate::validation::ValidationReport;

/// Errors raised while fetching, reading, validating or writing emissions data.
///
/// Data-quality problems are never raised by the validator itself; they only
/// become errors here when the ingestion policy decides a table is unusable.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("{source_name} is missing required column(s): {}", missing.join(", "))]
    Schema {
        source_name: String,
        missing: Vec<String>,
    },

    #[error("data validation failed for {source_name}: {report}")]
    Validation {
        source_name: String,
        report: ValidationReport,
    },

    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("remote returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("remote reported errors: {0}")]
    Remote(String),

    #[error("response contains no `data.{0}` array")]
    MissingData(String),

    #[error("unsupported file format: {0}")]
    UnsupportedFormat(String),

    #[error("tables cannot be combined: {0}")]
    Combine(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("row has {found} cells but the table has {expected} columns")]
    RowWidth { expected: usize, found: usize },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Spreadsheet(#[from] calamine::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error(transparent)]
    Arrow(#[from] arrow::error::ArrowError),
}

pub type Result<T, E = IngestError> = std::result::Result<T, E>;
