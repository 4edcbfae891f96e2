//! Emissions tables read from a directory of CSV and spreadsheet files.

use std::{
    fs,
    path::{Path, PathBuf},
};

use calamine::{open_workbook_auto, Data, Reader};
use tracing::{debug, info, warn};

use super::{normalize::rename_columns, DataSource, Filters, Normalizer};
use crate::{
    error::{IngestError, Result},
    table::{Cell, EmissionsTable},
};

pub const SUPPORTED_EXTENSIONS: &[&str] = &["csv", "xlsx", "xls"];

#[derive(Debug, Clone)]
pub struct LocalSource {
    dir: PathBuf,
}

impl LocalSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        LocalSource { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Names of readable data files in the directory, sorted.
    pub fn list_available_files(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.is_file() && extension(&path).is_some_and(|e| SUPPORTED_EXTENSIONS.contains(&e.as_str())) {
                if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    /// Reads one file, choosing the decoder by extension.
    pub fn read_file(&self, name: &str) -> Result<EmissionsTable> {
        let path = self.dir.join(name);
        info!(path = %path.display(), "reading file");

        match extension(&path).as_deref() {
            Some("csv") => read_csv(&path),
            Some("xlsx") | Some("xls") => read_spreadsheet(&path),
            other => Err(IngestError::UnsupportedFormat(
                other.map(|e| format!(".{e}")).unwrap_or_else(|| name.to_string()),
            )),
        }
    }
}

impl DataSource for LocalSource {
    fn describe(&self) -> String {
        format!("directory {}", self.dir.display())
    }

    async fn fetch(&self, filters: &Filters) -> Result<EmissionsTable> {
        let mut tables = Vec::new();
        for name in self.list_available_files()? {
            // aliased headers must line up before files are merged
            let mut table = self.read_file(&name)?;
            rename_columns(&mut table);
            tables.push(table);
        }

        let mut table = EmissionsTable::union(tables);
        let before = table.len();
        table.retain_rows(|t, row| filters.matches(t, row));
        debug!(kept = table.len(), dropped = before - table.len(), "applied filters");

        Ok(table)
    }

    fn preprocess(&self, table: EmissionsTable) -> EmissionsTable {
        Normalizer::local().apply(table)
    }
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
}

fn read_csv(path: &Path) -> Result<EmissionsTable> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)?;

    let columns: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    let width = columns.len();
    let mut table = EmissionsTable::new(columns);

    for (line, record) in reader.records().enumerate() {
        let record = record?;
        if record.len() != width {
            warn!(line = line + 2, found = record.len(), expected = width, "ragged row padded");
        }
        let mut row: Vec<Cell> = record.iter().take(width).map(Cell::parse).collect();
        row.resize(width, Cell::Null);
        table.push_row(row)?;
    }

    Ok(table)
}

fn read_spreadsheet(path: &Path) -> Result<EmissionsTable> {
    let mut workbook = open_workbook_auto(path)?;

    let sheet = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| IngestError::UnsupportedFormat(format!("{} has no sheets", path.display())))?;
    let range = workbook.worksheet_range(&sheet)?;

    let mut rows = range.rows();
    let columns: Vec<String> = match rows.next() {
        Some(header) => header.iter().map(|c| c.to_string().trim().to_string()).collect(),
        None => return Ok(EmissionsTable::default()),
    };
    let width = columns.len();
    let mut table = EmissionsTable::new(columns);

    for row in rows {
        let mut cells: Vec<Cell> = row.iter().take(width).map(spreadsheet_cell).collect();
        cells.resize(width, Cell::Null);
        table.push_row(cells)?;
    }

    Ok(table)
}

fn spreadsheet_cell(data: &Data) -> Cell {
    match data {
        Data::Empty => Cell::Null,
        Data::Int(i) => Cell::Int(*i),
        Data::Float(f) => Cell::Float(*f),
        Data::String(s) => Cell::parse(s),
        Data::DateTime(dt) => dt
            .as_datetime()
            .map(|d| Cell::Date(d.date()))
            .unwrap_or(Cell::Null),
        Data::DateTimeIso(s) => Cell::Text(s.clone()),
        Data::Bool(b) => Cell::Text(b.to_string()),
        other => Cell::Text(other.to_string()),
    }
}
