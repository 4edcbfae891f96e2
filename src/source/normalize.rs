//! Baseline normalization of raw source tables into canonical columns.

use chrono::NaiveDate;
use tracing::debug;

use crate::table::{
    Cell, EmissionsTable, COUNTY, DATE, EMISSIONS, FACILITY, INDUSTRY, LATITUDE, LONGITUDE,
    SECTOR, STATE, YEAR,
};

/// Raw field name → canonical column name. A rename is skipped when the target exists.
const RENAMES: &[(&str, &str)] = &[
    ("co2e_emission", EMISSIONS),
    ("facility_name", FACILITY),
    ("sector_name", SECTOR),
    ("reported_industry_types", INDUSTRY),
    ("state_name", STATE),
];

const FLOAT_COLUMNS: &[&str] = &[EMISSIONS, LATITUDE, LONGITUDE];

#[derive(Debug, Clone, Copy)]
pub struct Normalizer {
    /// Coerce numeric columns, turning unparseable values into nulls. Local files keep
    /// raw values so the validator can report them.
    pub coerce_numeric: bool,
}

impl Normalizer {
    pub fn remote() -> Self {
        Normalizer {
            coerce_numeric: true,
        }
    }

    pub fn local() -> Self {
        Normalizer {
            coerce_numeric: false,
        }
    }

    pub fn apply(&self, mut table: EmissionsTable) -> EmissionsTable {
        if table.columns().is_empty() {
            return table;
        }

        rename_columns(&mut table);

        if self.coerce_numeric {
            table.map_column(YEAR, |c| c.as_i64().map(Cell::Int).unwrap_or(Cell::Null));
            for column in FLOAT_COLUMNS {
                table.map_column(column, |c| c.as_f64().map(Cell::Float).unwrap_or(Cell::Null));
            }
        }

        table.map_column(COUNTY, |c| match c {
            Cell::Text(s) => clean_county(s).map(Cell::Text).unwrap_or(Cell::Null),
            other => other.clone(),
        });

        if let Some(year_idx) = table.column_index(YEAR) {
            let date_idx = table.ensure_column(DATE);
            table.update_rows(|row| {
                if row[date_idx].is_null() {
                    if let Some(date) = year_start(&row[year_idx]) {
                        row[date_idx] = Cell::Date(date);
                    }
                }
            });
        }

        let dropped = table.dedup();
        if dropped > 0 {
            debug!(dropped, "removed duplicate rows");
        }

        table
    }
}

/// Renames raw field names to their canonical column names.
pub fn rename_columns(table: &mut EmissionsTable) {
    for (from, to) in RENAMES {
        if table.rename_column(from, to) {
            debug!(from, to, "renamed column");
        }
    }
}

/// Upper-cases, trims and strips a trailing "COUNTY". Blank results become `None`.
pub fn clean_county(raw: &str) -> Option<String> {
    let upper = raw.trim().to_uppercase();
    let stripped = upper
        .strip_suffix("COUNTY")
        .map(str::trim_end)
        .unwrap_or(&upper);
    if stripped.is_empty() {
        None
    } else {
        Some(stripped.to_string())
    }
}

fn year_start(cell: &Cell) -> Option<NaiveDate> {
    let year = i32::try_from(cell.as_i64()?).ok()?;
    NaiveDate::from_ymd_opt(year, 1, 1)
}
