//! Data sources: anything that can produce an emissions table for a set of filters.

pub mod cache;
pub mod local;
pub mod normalize;
pub mod query;
pub mod remote;
pub mod transport;

use crate::{
    error::Result,
    table::{Cell, EmissionsTable, STATE, YEAR},
};

pub use cache::BatchCache;
pub use local::LocalSource;
pub use normalize::Normalizer;
pub use remote::RemoteSource;
pub use transport::{HttpTransport, Transport};

/// Row filters understood by every source.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filters {
    /// Two-letter state code
    pub state: Option<String>,
    pub year: Option<i32>,
}

impl Filters {
    pub fn new(state: Option<String>, year: Option<i32>) -> Self {
        Filters {
            state: state.map(|s| s.trim().to_uppercase()),
            year,
        }
    }

    /// Whether `row` passes the filters. Filters on columns the table lacks are ignored.
    pub fn matches(&self, table: &EmissionsTable, row: &[Cell]) -> bool {
        let state_ok = match (&self.state, table.get(row, STATE)) {
            (Some(want), Some(cell)) => cell
                .as_key()
                .map(|s| s.trim().eq_ignore_ascii_case(want))
                .unwrap_or(false),
            _ => true,
        };
        let year_ok = match (self.year, table.get(row, YEAR)) {
            (Some(want), Some(cell)) => cell.as_i64() == Some(want as i64),
            _ => true,
        };
        state_ok && year_ok
    }
}

/// Capability shared by the local-file and remote sources.
#[allow(async_fn_in_trait)]
pub trait DataSource {
    /// Human-readable name used in logs and errors.
    fn describe(&self) -> String;

    /// Fetches raw records matching `filters`.
    async fn fetch(&self, filters: &Filters) -> Result<EmissionsTable>;

    /// Brings a raw table into the canonical column layout.
    fn preprocess(&self, table: EmissionsTable) -> EmissionsTable;

    async fn get_data(&self, filters: &Filters) -> Result<EmissionsTable> {
        let table = self.fetch(filters).await?;
        Ok(self.preprocess(table))
    }
}
