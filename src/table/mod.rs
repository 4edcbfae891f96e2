//! The in-memory emissions table shared by sources, validation and analysis.

pub mod cell;

use std::collections::HashSet;

use serde_json::{Map, Value};

use crate::error::{IngestError, Result};

pub use cell::{parse_date, Cell};

pub const EMISSIONS: &str = "emissions";
pub const FACILITY: &str = "facility";
pub const COUNTY: &str = "county";
pub const SECTOR: &str = "sector";
pub const INDUSTRY: &str = "industry";
pub const YEAR: &str = "year";
pub const DATE: &str = "date";
pub const STATE: &str = "state";
pub const LATITUDE: &str = "latitude";
pub const LONGITUDE: &str = "longitude";

/// Names accepted for each canonical column, canonical name first.
pub const EMISSIONS_ALIASES: &[&str] = &[EMISSIONS, "co2e_emission"];
pub const FACILITY_ALIASES: &[&str] = &[FACILITY, "facility_name"];
pub const SECTOR_ALIASES: &[&str] = &[SECTOR, INDUSTRY, "sector_name"];

/// Ordered rows over a uniform, ordered set of named columns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EmissionsTable {
    columns: Vec<String>,
    rows: Vec<Vec<Cell>>,
}

impl EmissionsTable {
    pub fn new(columns: Vec<String>) -> Self {
        EmissionsTable {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn from_rows(columns: Vec<String>, rows: Vec<Vec<Cell>>) -> Result<Self> {
        let mut table = EmissionsTable::new(columns);
        for row in rows {
            table.push_row(row)?;
        }
        Ok(table)
    }

    /// Builds a table from JSON objects. Columns appear in first-seen order and
    /// keys absent from a record become nulls.
    pub fn from_records(records: &[Map<String, Value>]) -> Self {
        let mut columns: Vec<String> = Vec::new();
        for record in records {
            for key in record.keys() {
                if !columns.iter().any(|c| c == key) {
                    columns.push(key.clone());
                }
            }
        }

        let rows = records
            .iter()
            .map(|record| {
                columns
                    .iter()
                    .map(|c| record.get(c).map(Cell::from_json).unwrap_or(Cell::Null))
                    .collect()
            })
            .collect();

        EmissionsTable { columns, rows }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// First of `names` present in the table.
    pub fn resolve_column<'a>(&self, names: &[&'a str]) -> Option<&'a str> {
        names.iter().copied().find(|n| self.has_column(n))
    }

    pub fn column(&self, name: &str) -> Option<impl Iterator<Item = &Cell> + '_> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(move |row| &row[idx]))
    }

    pub fn push_row(&mut self, row: Vec<Cell>) -> Result<()> {
        if row.len() != self.columns.len() {
            return Err(IngestError::RowWidth {
                expected: self.columns.len(),
                found: row.len(),
            });
        }
        self.rows.push(row);
        Ok(())
    }

    /// Renames `from` to `to` unless `to` already exists. Returns whether a rename happened.
    pub fn rename_column(&mut self, from: &str, to: &str) -> bool {
        if self.has_column(to) {
            return false;
        }
        match self.column_index(from) {
            Some(idx) => {
                self.columns[idx] = to.to_string();
                true
            }
            None => false,
        }
    }

    /// Index of `name`, appending it as an all-null column when absent.
    pub fn ensure_column(&mut self, name: &str) -> usize {
        if let Some(idx) = self.column_index(name) {
            return idx;
        }
        self.columns.push(name.to_string());
        for row in &mut self.rows {
            row.push(Cell::Null);
        }
        self.columns.len() - 1
    }

    /// Edits each row in place. Rows keep their width.
    pub fn update_rows<F>(&mut self, mut f: F)
    where
        F: FnMut(&mut [Cell]),
    {
        for row in &mut self.rows {
            f(row);
        }
    }

    pub fn map_column<F>(&mut self, name: &str, mut f: F)
    where
        F: FnMut(&Cell) -> Cell,
    {
        if let Some(idx) = self.column_index(name) {
            for row in &mut self.rows {
                row[idx] = f(&row[idx]);
            }
        }
    }

    pub fn retain_rows<F>(&mut self, mut keep: F)
    where
        F: FnMut(&EmissionsTable, &[Cell]) -> bool,
    {
        let rows = std::mem::take(&mut self.rows);
        let kept: Vec<Vec<Cell>> = rows.into_iter().filter(|row| keep(self, row)).collect();
        self.rows = kept;
    }

    /// Value of `name` in `row`, or `None` when the column does not exist.
    pub fn get<'r>(&self, row: &'r [Cell], name: &str) -> Option<&'r Cell> {
        self.column_index(name).map(|idx| &row[idx])
    }

    /// Appends `other`, which must carry exactly the same columns in the same order.
    /// A table with no columns adopts the column set of the first table appended.
    pub fn append(&mut self, other: EmissionsTable) -> Result<()> {
        if self.columns.is_empty() && self.rows.is_empty() {
            *self = other;
            return Ok(());
        }
        if other.columns.is_empty() && other.rows.is_empty() {
            return Ok(());
        }
        if self.columns != other.columns {
            return Err(IngestError::Combine(format!(
                "column mismatch: [{}] vs [{}]",
                self.columns.join(", "),
                other.columns.join(", ")
            )));
        }
        self.rows.extend(other.rows);
        Ok(())
    }

    /// Concatenates tables with differing columns, filling gaps with nulls.
    pub fn union(tables: Vec<EmissionsTable>) -> EmissionsTable {
        let mut columns: Vec<String> = Vec::new();
        for table in &tables {
            for c in &table.columns {
                if !columns.contains(c) {
                    columns.push(c.clone());
                }
            }
        }

        let mut rows = Vec::new();
        for table in tables {
            let mapping: Vec<Option<usize>> =
                columns.iter().map(|c| table.column_index(c)).collect();
            for row in table.rows {
                rows.push(
                    mapping
                        .iter()
                        .map(|idx| idx.map(|i| row[i].clone()).unwrap_or(Cell::Null))
                        .collect(),
                );
            }
        }

        EmissionsTable { columns, rows }
    }

    /// Drops exact duplicate rows, keeping the first occurrence.
    pub fn dedup(&mut self) -> usize {
        let before = self.rows.len();
        let mut seen = HashSet::new();
        self.rows.retain(|row| {
            let key: Vec<String> = row.iter().map(Cell::identity).collect();
            seen.insert(key)
        });
        before - self.rows.len()
    }
}
