use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use super::{emissions_index, index_of, Accumulator};
use crate::table::{EmissionsTable, COUNTY, SECTOR_ALIASES};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SectorSummary {
    pub total_emissions: f64,
    pub avg_emissions: f64,
    pub count: usize,
}

/// County × sector sums. Every county has a value for every sector.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CountySectorPivot {
    pub counties: Vec<String>,
    pub sectors: Vec<String>,
    /// `values[county][sector]`, in the order of `counties` and `sectors`.
    pub values: Vec<Vec<f64>>,
}

impl CountySectorPivot {
    pub fn is_empty(&self) -> bool {
        self.counties.is_empty()
    }

    pub fn get(&self, county: &str, sector: &str) -> Option<f64> {
        let c = self.counties.iter().position(|x| x == county)?;
        let s = self.sectors.iter().position(|x| x == sector)?;
        Some(self.values[c][s])
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndustryStatistics {
    pub by_sector: BTreeMap<String, SectorSummary>,
    pub pivot: CountySectorPivot,
}

impl IndustryStatistics {
    pub fn is_empty(&self) -> bool {
        self.by_sector.is_empty() && self.pivot.is_empty()
    }
}

pub(super) fn industry_analysis(table: &EmissionsTable) -> IndustryStatistics {
    let (Some(sector_idx), Some(emissions_idx)) = (index_of(table, SECTOR_ALIASES), emissions_index(table))
    else {
        return IndustryStatistics::default();
    };
    let county_idx = table.column_index(COUNTY);

    let mut sectors: BTreeMap<String, Accumulator> = BTreeMap::new();
    let mut cells: BTreeMap<(String, String), f64> = BTreeMap::new();
    for row in table.rows() {
        let (Some(sector), Some(value)) = (row[sector_idx].as_key(), row[emissions_idx].as_f64())
        else {
            continue;
        };
        if let Some(county) = county_idx.and_then(|i| row[i].as_key()) {
            *cells.entry((county, sector.clone())).or_default() += value;
        }
        sectors.entry(sector).or_default().add(value);
    }

    let by_sector = sectors
        .into_iter()
        .map(|(sector, acc)| {
            let summary = SectorSummary {
                total_emissions: acc.total,
                avg_emissions: acc.mean(),
                count: acc.count,
            };
            (sector, summary)
        })
        .collect();

    IndustryStatistics {
        by_sector,
        pivot: pivot(cells),
    }
}

fn pivot(cells: BTreeMap<(String, String), f64>) -> CountySectorPivot {
    let counties: Vec<String> = cells
        .keys()
        .map(|(c, _)| c.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let sectors: Vec<String> = cells
        .keys()
        .map(|(_, s)| s.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let values = counties
        .iter()
        .map(|county| {
            sectors
                .iter()
                .map(|sector| {
                    cells
                        .get(&(county.clone(), sector.clone()))
                        .copied()
                        .unwrap_or(0.0)
                })
                .collect()
        })
        .collect();

    CountySectorPivot {
        counties,
        sectors,
        values,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::fixtures::*;
    use crate::table::Cell;

    #[test]
    fn should_summarise_sectors() {
        let stats = industry_analysis(&bergen_essex());

        let power = &stats.by_sector["Power Plants"];
        assert_eq!(power.total_emissions, 300.0);
        assert_eq!(power.avg_emissions, 150.0);
        assert_eq!(power.count, 2);
        assert_eq!(stats.by_sector["Waste"].count, 1);
    }

    #[test]
    fn should_zero_fill_pivot() {
        let stats = industry_analysis(&bergen_essex());

        assert_eq!(stats.pivot.counties, vec!["Bergen", "Essex"]);
        assert_eq!(stats.pivot.sectors, vec!["Power Plants", "Waste"]);
        assert_eq!(stats.pivot.get("Bergen", "Waste"), Some(50.0));
        assert_eq!(stats.pivot.get("Essex", "Waste"), Some(0.0));
        assert_eq!(stats.pivot.get("Essex", "Cement"), None);
    }

    #[test]
    fn should_accept_industry_alias_without_county() {
        let t = table(
            &["industry", "co2e_emission"],
            vec![vec![text("Chemicals"), Cell::Int(4)], vec![text("Chemicals"), Cell::Int(6)]],
        );

        let stats = industry_analysis(&t);

        assert_eq!(stats.by_sector["Chemicals"].total_emissions, 10.0);
        assert!(stats.pivot.is_empty());
    }

    #[test]
    fn should_be_empty_without_sector_column() {
        let t = table(&["county", "emissions"], vec![vec![text("Bergen"), Cell::Float(1.0)]]);
        assert!(industry_analysis(&t).is_empty());
    }
}
