pub mod analyze;
pub mod ingest;
pub mod tables;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{Datelike, Local};

use crate::config::AppConfig;

pub use analyze::analyze;
pub use ingest::ingest;
pub use tables::tables;

/// Defaults overlaid with the JSON config file, when one is given.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    match path {
        Some(path) => AppConfig::from_file(path)
            .with_context(|| format!("failed to load config from {}", path.display())),
        None => Ok(AppConfig::default()),
    }
}

/// `base` when given, otherwise `output/<state>` with the state lower-cased.
pub fn make_output_dir(state: &str, base: Option<&Path>) -> PathBuf {
    match base {
        Some(base) => base.to_path_buf(),
        None => PathBuf::from("output").join(state.trim().to_lowercase()),
    }
}

/// Most recent complete reporting year.
pub fn default_year() -> i32 {
    Local::now().year() - 1
}

// -- Tests ---

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_name_output_dir_after_state() {
        assert_eq!(make_output_dir("NJ", None), PathBuf::from("output/nj"));
        assert_eq!(make_output_dir("NJ", Some(Path::new("/tmp/out"))), PathBuf::from("/tmp/out"));
    }

    #[test]
    fn should_default_to_previous_year() {
        assert_eq!(default_year(), Local::now().year() - 1);
    }

    #[test]
    fn should_use_defaults_without_config_file() {
        let config = load_config(None).unwrap();
        assert_eq!(config.batch_size, AppConfig::default().batch_size);
    }
}
