use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use super::{emissions_index, index_of, Accumulator};
use crate::table::{EmissionsTable, COUNTY, FACILITY_ALIASES, SECTOR_ALIASES};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CountySummary {
    pub total_emissions: f64,
    pub avg_emissions: f64,
    pub facility_count: usize,
    pub sector_count: usize,
    /// Absent when the county has no known facility.
    pub emissions_per_facility: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CountyStatistics {
    pub counties: BTreeMap<String, CountySummary>,
}

impl CountyStatistics {
    pub fn is_empty(&self) -> bool {
        self.counties.is_empty()
    }

    pub fn total_emissions(&self) -> BTreeMap<String, f64> {
        self.project(|s| s.total_emissions)
    }

    pub fn avg_emissions(&self) -> BTreeMap<String, f64> {
        self.project(|s| s.avg_emissions)
    }

    pub fn facility_count(&self) -> BTreeMap<String, usize> {
        self.project(|s| s.facility_count)
    }

    fn project<T>(&self, f: impl Fn(&CountySummary) -> T) -> BTreeMap<String, T> {
        self.counties
            .iter()
            .map(|(county, summary)| (county.clone(), f(summary)))
            .collect()
    }
}

#[derive(Default)]
struct CountyGroup {
    emissions: Accumulator,
    facilities: BTreeSet<String>,
    sectors: BTreeSet<String>,
}

pub(super) fn county_statistics(table: &EmissionsTable) -> CountyStatistics {
    let (Some(county_idx), Some(emissions_idx)) = (table.column_index(COUNTY), emissions_index(table))
    else {
        return CountyStatistics::default();
    };
    let facility_idx = index_of(table, FACILITY_ALIASES);
    let sector_idx = index_of(table, SECTOR_ALIASES);

    let mut groups: BTreeMap<String, CountyGroup> = BTreeMap::new();
    for row in table.rows() {
        let Some(county) = row[county_idx].as_key() else {
            continue;
        };
        let group = groups.entry(county).or_default();

        if let Some(value) = row[emissions_idx].as_f64() {
            group.emissions.add(value);
        }
        if let Some(facility) = facility_idx.and_then(|i| row[i].as_key()) {
            group.facilities.insert(facility);
        }
        if let Some(sector) = sector_idx.and_then(|i| row[i].as_key()) {
            group.sectors.insert(sector);
        }
    }

    let counties = groups
        .into_iter()
        .map(|(county, group)| {
            let facility_count = group.facilities.len();
            let summary = CountySummary {
                total_emissions: group.emissions.total,
                avg_emissions: group.emissions.mean(),
                facility_count,
                sector_count: group.sectors.len(),
                emissions_per_facility: (facility_count > 0)
                    .then(|| group.emissions.total / facility_count as f64),
            };
            (county, summary)
        })
        .collect();

    CountyStatistics { counties }
}
