//! Run configuration: remote endpoint, pagination and validation policy.

use std::{collections::BTreeMap, fs, path::Path, path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{
    error::{IngestError, Result},
    validation::Strictness,
};

pub const DEFAULT_ENDPOINT: &str = "https://data.epa.gov/dmapservice/query/graphql";
pub const DEFAULT_TABLE: &str = "ghg__rlps_ghg_emitter_sector";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// GraphQL endpoint URL
    pub endpoint: String,

    /// Request timeout (seconds), fixed for the whole run
    pub timeout_secs: u64,

    /// Records requested per page
    pub batch_size: usize,

    /// Reserved; remote calls are not retried
    pub max_retries: u32,

    /// Table queried when none is given on the command line
    pub table: String,

    /// Short names for remote tables
    pub table_aliases: BTreeMap<String, String>,

    /// Fields requested from the remote table
    pub fields: Vec<String>,

    /// Sort key sent with every page so pagination is order-stable
    pub order_by: Vec<String>,

    /// Where scratch batch files are written when caching is on
    pub cache_dir: Option<PathBuf>,

    pub strictness: Strictness,
}

impl Default for AppConfig {
    fn default() -> Self {
        let table_aliases = [
            ("emissions", DEFAULT_TABLE),
            ("facilities", "ghg__pub_dim_facility"),
            ("sector_emissions", "ghg__pub_facts_sector_ghg_emission"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let fields = [
            "facility_id",
            "facility_name",
            "year",
            "state",
            "state_name",
            "county",
            "city",
            "zip",
            "latitude",
            "longitude",
            "sector_name",
            "subsector_name",
            "co2e_emission",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        AppConfig {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            timeout_secs: 30,
            batch_size: 1000,
            max_retries: 3,
            table: DEFAULT_TABLE.to_string(),
            table_aliases,
            fields,
            order_by: vec![
                "facility_id".to_string(),
                "year".to_string(),
                "sector_name".to_string(),
                "subsector_name".to_string(),
            ],
            cache_dir: None,
            strictness: Strictness::default(),
        }
    }
}

impl AppConfig {
    /// Loads a JSON config file. Keys left out keep their defaults.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = fs::read_to_string(path.as_ref())?;
        let config: AppConfig = serde_json::from_str(&text)?;
        config.check()?;
        Ok(config)
    }

    pub fn check(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(IngestError::Config("batch_size must be at least 1".to_string()));
        }
        if self.fields.is_empty() {
            return Err(IngestError::Config("no fields requested".to_string()));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Maps a short table name to the remote table; unknown names pass through.
    pub fn resolve_table<'a>(&'a self, name: &'a str) -> &'a str {
        self.table_aliases
            .get(name)
            .map(String::as_str)
            .unwrap_or(name)
    }

    /// Scratch directory for batch files, defaulting to the user cache dir.
    pub fn batch_cache_dir(&self) -> PathBuf {
        self.cache_dir.clone().unwrap_or_else(|| {
            dirs::cache_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join("ghg-emissions")
                .join("batches")
        })
    }
}
