//! Writes aggregate statistics as CSV files and the ingested table as Parquet.

use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::Serialize;
use tracing::info;

use crate::{
    analysis::{CountyStatistics, IndustryStatistics, RegionalAnalysis, TemporalStatistics},
    error::Result,
    parquet::save_table,
    table::EmissionsTable,
};

pub const COUNTY_STATS: &str = "county_stats.csv";
pub const INDUSTRY_STATS: &str = "industry_stats.csv";
pub const INDUSTRY_PIVOT: &str = "industry_pivot.csv";
pub const TEMPORAL_STATS: &str = "temporal_stats.csv";
pub const EMISSIONS_PARQUET: &str = "emissions.parquet";

#[derive(Serialize)]
struct CountyRow<'a> {
    county: &'a str,
    total_emissions: f64,
    avg_emissions: f64,
    facility_count: usize,
    sector_count: usize,
    emissions_per_facility: Option<f64>,
}

#[derive(Serialize)]
struct SectorRow<'a> {
    sector: &'a str,
    total_emissions: f64,
    avg_emissions: f64,
    count: usize,
}

#[derive(Serialize)]
struct TemporalRow {
    period: &'static str,
    year: Option<i32>,
    month: Option<u32>,
    emissions: f64,
}

/// Computes every statistic for `table` and writes all outputs into `dir`.
pub fn export_all(table: &EmissionsTable, dir: &Path) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(dir)?;
    let analysis = RegionalAnalysis::new(table);
    let industry = analysis.industry_analysis();

    let written = vec![
        write_county_stats(&analysis.county_statistics(), &dir.join(COUNTY_STATS))?,
        write_industry_stats(&industry, &dir.join(INDUSTRY_STATS))?,
        write_industry_pivot(&industry, &dir.join(INDUSTRY_PIVOT))?,
        write_temporal_stats(&analysis.temporal_analysis(), &dir.join(TEMPORAL_STATS))?,
        write_table(table, &dir.join(EMISSIONS_PARQUET))?,
    ];

    info!(dir = %dir.display(), files = written.len(), "exported results");
    Ok(written)
}

pub fn write_county_stats(stats: &CountyStatistics, path: &Path) -> Result<PathBuf> {
    let mut writer = csv::Writer::from_path(path)?;
    for (county, s) in &stats.counties {
        writer.serialize(CountyRow {
            county,
            total_emissions: s.total_emissions,
            avg_emissions: s.avg_emissions,
            facility_count: s.facility_count,
            sector_count: s.sector_count,
            emissions_per_facility: s.emissions_per_facility,
        })?;
    }
    if stats.is_empty() {
        writer.write_record(["county", "total_emissions", "avg_emissions", "facility_count", "sector_count", "emissions_per_facility"])?;
    }
    writer.flush()?;
    Ok(path.to_path_buf())
}

pub fn write_industry_stats(stats: &IndustryStatistics, path: &Path) -> Result<PathBuf> {
    let mut writer = csv::Writer::from_path(path)?;
    for (sector, s) in &stats.by_sector {
        writer.serialize(SectorRow {
            sector,
            total_emissions: s.total_emissions,
            avg_emissions: s.avg_emissions,
            count: s.count,
        })?;
    }
    if stats.by_sector.is_empty() {
        writer.write_record(["sector", "total_emissions", "avg_emissions", "count"])?;
    }
    writer.flush()?;
    Ok(path.to_path_buf())
}

/// One row per county, one column per sector.
pub fn write_industry_pivot(stats: &IndustryStatistics, path: &Path) -> Result<PathBuf> {
    let pivot = &stats.pivot;
    let mut writer = csv::Writer::from_path(path)?;

    let mut header = vec!["county".to_string()];
    header.extend(pivot.sectors.iter().cloned());
    writer.write_record(&header)?;

    for (county, values) in pivot.counties.iter().zip(&pivot.values) {
        let mut record = vec![county.clone()];
        record.extend(values.iter().map(f64::to_string));
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(path.to_path_buf())
}

/// Long format: `monthly`, `seasonal` and `yearly` rows share one file.
pub fn write_temporal_stats(stats: &TemporalStatistics, path: &Path) -> Result<PathBuf> {
    let monthly = stats.monthly.iter().map(|(&(year, month), &emissions)| TemporalRow {
        period: "monthly",
        year: Some(year),
        month: Some(month),
        emissions,
    });
    let seasonal = stats.seasonality.iter().map(|(&month, &emissions)| TemporalRow {
        period: "seasonal",
        year: None,
        month: Some(month),
        emissions,
    });
    let yearly = stats.yearly.iter().map(|(&year, &emissions)| TemporalRow {
        period: "yearly",
        year: Some(year),
        month: None,
        emissions,
    });

    let mut writer = csv::Writer::from_path(path)?;
    let mut rows = 0usize;
    for row in monthly.chain(seasonal).chain(yearly) {
        writer.serialize(row)?;
        rows += 1;
    }
    if rows == 0 {
        writer.write_record(["period", "year", "month", "emissions"])?;
    }
    writer.flush()?;
    Ok(path.to_path_buf())
}

/// Parquet snapshot of the table. A table without columns is skipped.
fn write_table(table: &EmissionsTable, path: &Path) -> Result<PathBuf> {
    if !table.columns().is_empty() {
        save_table(table, path)?;
    }
    Ok(path.to_path_buf())
}
