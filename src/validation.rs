//! Structural and range checks over an emissions table.

use std::fmt;

use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::table::{EmissionsTable, DATE, EMISSIONS, EMISSIONS_ALIASES, YEAR};

/// How ingestion treats validation issues.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Strictness {
    /// Only missing required columns reject a table.
    #[default]
    Lenient,
    /// Any issue rejects a table.
    Strict,
}

/// Issues found in a table, grouped by category. Empty everywhere means valid.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ValidationReport {
    pub missing_columns: Vec<String>,
    pub type_errors: Vec<String>,
    pub value_errors: Vec<String>,
    pub date_errors: Vec<String>,
    /// The table had no rows. Not an issue in itself.
    pub empty: bool,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.categories().iter().all(|(_, issues)| issues.is_empty())
    }

    pub fn has_schema_errors(&self) -> bool {
        !self.missing_columns.is_empty()
    }

    pub fn categories(&self) -> [(&'static str, &Vec<String>); 4] {
        [
            ("missing_columns", &self.missing_columns),
            ("type_errors", &self.type_errors),
            ("value_errors", &self.value_errors),
            ("date_errors", &self.date_errors),
        ]
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .categories()
            .iter()
            .filter(|(_, issues)| !issues.is_empty())
            .map(|(name, issues)| format!("{name}: {}", issues.join(", ")))
            .collect();
        if parts.is_empty() {
            write!(f, "no issues")
        } else {
            write!(f, "{}", parts.join("; "))
        }
    }
}

/// A column that must be present under its canonical name or one of its aliases.
#[derive(Debug, Clone)]
pub struct RequiredColumn {
    pub name: &'static str,
    pub aliases: &'static [&'static str],
}

impl RequiredColumn {
    fn resolve<'t>(&self, table: &'t EmissionsTable) -> Option<&'t str> {
        std::iter::once(self.name)
            .chain(self.aliases.iter().copied())
            .find_map(|n| table.column_index(n).map(|i| table.columns()[i].as_str()))
    }
}

#[derive(Debug, Clone)]
pub struct Validator {
    required: Vec<RequiredColumn>,
    min_emissions: f64,
    max_emissions: f64,
}

impl Default for Validator {
    fn default() -> Self {
        Validator {
            required: vec![
                RequiredColumn {
                    name: EMISSIONS,
                    aliases: &EMISSIONS_ALIASES[1..],
                },
                RequiredColumn {
                    name: DATE,
                    aliases: &[YEAR],
                },
            ],
            min_emissions: 0.0,
            max_emissions: 1e9,
        }
    }
}

impl Validator {
    pub fn new(required: Vec<RequiredColumn>) -> Self {
        Validator {
            required,
            ..Validator::default()
        }
    }

    pub fn validate(&self, table: &EmissionsTable) -> ValidationReport {
        self.validate_at(table, Local::now().date_naive())
    }

    /// Validates against a fixed "today" for the future-date check.
    pub fn validate_at(&self, table: &EmissionsTable, today: NaiveDate) -> ValidationReport {
        let mut report = ValidationReport {
            empty: table.is_empty(),
            ..ValidationReport::default()
        };

        for required in &self.required {
            if required.resolve(table).is_none() {
                let mut message = format!("Missing required column: {}", required.name);
                if !required.aliases.is_empty() {
                    message.push_str(&format!(" (or {})", required.aliases.join(", ")));
                }
                report.missing_columns.push(message);
            }
        }
        if report.has_schema_errors() || report.empty {
            return report;
        }

        if let Some(column) = self.emissions_column(table) {
            self.check_emissions(table, column, &mut report);
        }

        if table.has_column(DATE) {
            check_dates(table, today, &mut report);
        }

        report
    }

    fn emissions_column<'t>(&self, table: &'t EmissionsTable) -> Option<&'t str> {
        self.required
            .iter()
            .find(|r| r.name == EMISSIONS)
            .and_then(|r| r.resolve(table))
            .or_else(|| table.resolve_column(EMISSIONS_ALIASES))
    }

    fn check_emissions(&self, table: &EmissionsTable, column: &str, report: &mut ValidationReport) {
        let label = if column == EMISSIONS {
            EMISSIONS.to_string()
        } else {
            format!("{EMISSIONS} ({column})")
        };

        let mut uncoercible = 0usize;
        let mut out_of_range = 0usize;
        for cell in table.column(column).into_iter().flatten() {
            if cell.is_null() {
                continue;
            }
            match cell.as_f64() {
                Some(v) if v < self.min_emissions || v > self.max_emissions => out_of_range += 1,
                Some(_) => {}
                None => uncoercible += 1,
            }
        }

        if uncoercible > 0 {
            report.type_errors.push(format!(
                "Column {label} has {uncoercible} value(s) that could not be converted to float"
            ));
        }
        if out_of_range > 0 {
            report.value_errors.push(format!(
                "Column {label} contains {out_of_range} value(s) outside valid range [{}, {}]",
                self.min_emissions, self.max_emissions
            ));
        }
    }
}

fn check_dates(table: &EmissionsTable, today: NaiveDate, report: &mut ValidationReport) {
    let mut unparseable = 0usize;
    let mut future = 0usize;
    for cell in table.column(DATE).into_iter().flatten() {
        if cell.is_null() {
            continue;
        }
        match cell.as_date() {
            Some(d) if d > today => future += 1,
            Some(_) => {}
            None => unparseable += 1,
        }
    }

    if unparseable > 0 {
        report
            .date_errors
            .push(format!("Invalid date format in {unparseable} value(s) of column {DATE}"));
    }
    if future > 0 {
        report
            .date_errors
            .push(format!("Found {future} date(s) in the future in column {DATE}"));
    }
}
