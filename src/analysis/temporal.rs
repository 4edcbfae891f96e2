use std::collections::BTreeMap;

use chrono::Datelike;

use super::{emissions_index, Accumulator};
use crate::table::{EmissionsTable, DATE};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TemporalStatistics {
    /// Sum per `(year, month)`.
    pub monthly: BTreeMap<(i32, u32), f64>,
    /// Mean per calendar month across all years.
    pub seasonality: BTreeMap<u32, f64>,
    pub yearly: BTreeMap<i32, f64>,
}

impl TemporalStatistics {
    pub fn is_empty(&self) -> bool {
        self.monthly.is_empty()
    }
}

pub(super) fn temporal_analysis(table: &EmissionsTable) -> TemporalStatistics {
    let (Some(date_idx), Some(emissions_idx)) = (table.column_index(DATE), emissions_index(table))
    else {
        return TemporalStatistics::default();
    };

    let mut stats = TemporalStatistics::default();
    let mut by_month: BTreeMap<u32, Accumulator> = BTreeMap::new();
    for row in table.rows() {
        let (Some(date), Some(value)) = (row[date_idx].as_date(), row[emissions_idx].as_f64())
        else {
            continue;
        };
        *stats.monthly.entry((date.year(), date.month())).or_default() += value;
        *stats.yearly.entry(date.year()).or_default() += value;
        by_month.entry(date.month()).or_default().add(value);
    }

    stats.seasonality = by_month
        .into_iter()
        .map(|(month, acc)| (month, acc.mean()))
        .collect();
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::fixtures::*;
    use crate::table::Cell;
    use chrono::NaiveDate;

    #[test]
    fn should_group_by_month_and_year() {
        let t = table(
            &["date", "emissions"],
            vec![
                vec![text("2021-01-15"), Cell::Float(10.0)],
                vec![text("2021-01-20"), Cell::Float(20.0)],
                vec![Cell::Date(NaiveDate::from_ymd_opt(2022, 1, 1).unwrap()), Cell::Float(60.0)],
                vec![text("2022-07-04"), Cell::Float(5.0)],
                vec![text("not a date"), Cell::Float(1000.0)],
            ],
        );

        let stats = temporal_analysis(&t);

        assert_eq!(stats.monthly[&(2021, 1)], 30.0);
        assert_eq!(stats.monthly[&(2022, 1)], 60.0);
        assert_eq!(stats.yearly, BTreeMap::from([(2021, 30.0), (2022, 65.0)]));
        assert_eq!(stats.seasonality[&1], 30.0);
        assert_eq!(stats.seasonality[&7], 5.0);
    }

    #[test]
    fn should_be_empty_without_date_column() {
        let t = table(&["year", "emissions"], vec![vec![Cell::Int(2022), Cell::Float(1.0)]]);
        assert!(temporal_analysis(&t).is_empty());
    }
}
