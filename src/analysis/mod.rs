//! Grouped aggregates over an ingested emissions table.
//!
//! Every statistic skips rows whose grouping key or emissions value is missing.
//! When the table lacks a column a statistic depends on, that statistic is empty.

pub mod county;
pub mod industry;
pub mod temporal;

use crate::table::{EmissionsTable, EMISSIONS_ALIASES};

pub use county::{CountyStatistics, CountySummary};
pub use industry::{CountySectorPivot, IndustryStatistics, SectorSummary};
pub use temporal::TemporalStatistics;

/// Read-only view computing regional statistics for one table.
#[derive(Debug, Clone, Copy)]
pub struct RegionalAnalysis<'a> {
    table: &'a EmissionsTable,
}

impl<'a> RegionalAnalysis<'a> {
    pub fn new(table: &'a EmissionsTable) -> Self {
        RegionalAnalysis { table }
    }

    pub fn table(&self) -> &'a EmissionsTable {
        self.table
    }

    pub fn county_statistics(&self) -> CountyStatistics {
        county::county_statistics(self.table)
    }

    pub fn industry_analysis(&self) -> IndustryStatistics {
        industry::industry_analysis(self.table)
    }

    pub fn temporal_analysis(&self) -> TemporalStatistics {
        temporal::temporal_analysis(self.table)
    }

    /// Counties with the largest total emissions, largest first.
    pub fn top_counties(&self, n: usize) -> Vec<(String, f64)> {
        top(
            self.county_statistics()
                .counties
                .into_iter()
                .map(|(county, summary)| (county, summary.total_emissions)),
            n,
        )
    }

    /// Sectors with the largest total emissions, largest first.
    pub fn top_sectors(&self, n: usize) -> Vec<(String, f64)> {
        top(
            self.industry_analysis()
                .by_sector
                .into_iter()
                .map(|(sector, summary)| (sector, summary.total_emissions)),
            n,
        )
    }
}

/// Sorts by value descending. Ties keep key order.
fn top(items: impl Iterator<Item = (String, f64)>, n: usize) -> Vec<(String, f64)> {
    let mut items: Vec<(String, f64)> = items.collect();
    items.sort_by(|a, b| b.1.total_cmp(&a.1));
    items.truncate(n);
    items
}

/// Index of the emissions column under its canonical name or an alias.
fn emissions_index(table: &EmissionsTable) -> Option<usize> {
    table
        .resolve_column(EMISSIONS_ALIASES)
        .and_then(|name| table.column_index(name))
}

fn index_of(table: &EmissionsTable, aliases: &[&str]) -> Option<usize> {
    table
        .resolve_column(aliases)
        .and_then(|name| table.column_index(name))
}

/// Running sum and count for a mean.
#[derive(Debug, Clone, Copy, Default)]
struct Accumulator {
    total: f64,
    count: usize,
}

impl Accumulator {
    fn add(&mut self, value: f64) {
        self.total += value;
        self.count += 1;
    }

    fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.total / self.count as f64
        }
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use crate::table::{Cell, EmissionsTable};

    pub fn text(s: &str) -> Cell {
        Cell::Text(s.to_string())
    }

    pub fn table(columns: &[&str], rows: Vec<Vec<Cell>>) -> EmissionsTable {
        EmissionsTable::from_rows(columns.iter().map(|c| c.to_string()).collect(), rows).unwrap()
    }

    /// Bergen has two facilities totalling 150, Essex one facility at 200.
    pub fn bergen_essex() -> EmissionsTable {
        table(
            &["county", "emissions", "facility", "sector"],
            vec![
                vec![text("Bergen"), Cell::Float(100.0), text("A"), text("Power Plants")],
                vec![text("Bergen"), Cell::Float(50.0), text("B"), text("Waste")],
                vec![text("Essex"), Cell::Float(200.0), text("C"), text("Power Plants")],
            ],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn should_rank_counties_and_sectors() {
        let table = bergen_essex();
        let analysis = RegionalAnalysis::new(&table);

        assert_eq!(
            analysis.top_counties(5),
            vec![("Essex".to_string(), 200.0), ("Bergen".to_string(), 150.0)]
        );
        assert_eq!(analysis.top_sectors(1), vec![("Power Plants".to_string(), 300.0)]);
    }

    #[test]
    fn should_return_typed_empty_results_for_empty_table() {
        let table = EmissionsTable::default();
        let analysis = RegionalAnalysis::new(&table);

        assert!(analysis.county_statistics().is_empty());
        assert!(analysis.industry_analysis().is_empty());
        assert!(analysis.temporal_analysis().is_empty());
        assert!(analysis.top_counties(5).is_empty());
    }
}
