//! Scratch files holding each fetched page until the pages are combined.
//!
//! File names are `batch-<run id>-<page index>.parquet`. Run ids start with a
//! timestamp, so the lexicographically greatest id is the most recent run.

use std::{
    fs,
    path::{Path, PathBuf},
};

use chrono::Local;
use tracing::{debug, info, warn};

use crate::{
    error::{IngestError, Result},
    parquet::{load_table, save_table},
    table::EmissionsTable,
};

const PREFIX: &str = "batch-";
const EXTENSION: &str = "parquet";

#[derive(Debug, Clone)]
pub struct BatchCache {
    dir: PathBuf,
    run_id: String,
}

impl BatchCache {
    /// Opens the cache directory for a new run.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let run_id = format!(
            "{}_{}",
            Local::now().format("%Y%m%dT%H%M%S%3f"),
            std::process::id()
        );
        Self::with_run_id(dir, run_id)
    }

    pub fn with_run_id(dir: impl Into<PathBuf>, run_id: impl Into<String>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(BatchCache {
            dir,
            run_id: run_id.into(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn store(&self, index: usize, page: &EmissionsTable) -> Result<PathBuf> {
        let path = self
            .dir
            .join(format!("{PREFIX}{}-{index:05}.{EXTENSION}", self.run_id));
        save_table(page, &path)?;
        debug!(path = %path.display(), rows = page.len(), "stored batch");
        Ok(path)
    }

    /// Deletes batch files. Failures are logged and otherwise ignored.
    pub fn cleanup(&self, files: &[PathBuf]) {
        for file in files {
            match fs::remove_file(file) {
                Ok(()) => debug!(path = %file.display(), "deleted batch file"),
                Err(e) => warn!(path = %file.display(), error = %e, "failed to delete batch file"),
            }
        }
    }

    /// Batch files of `run_id`, in page order.
    pub fn run_files(&self, run_id: &str) -> Result<Vec<PathBuf>> {
        let mut files: Vec<(usize, PathBuf)> = self
            .scan()?
            .into_iter()
            .filter(|(id, _, _)| id == run_id)
            .map(|(_, index, path)| (index, path))
            .collect();
        files.sort_by_key(|(index, _)| *index);
        Ok(files.into_iter().map(|(_, path)| path).collect())
    }

    /// Id of the most recent run that left batch files behind.
    pub fn latest_run(&self) -> Result<Option<String>> {
        Ok(self.scan()?.into_iter().map(|(id, _, _)| id).max())
    }

    /// Rebuilds the best available table from the batch files of `run_id`.
    pub fn recover_run(&self, run_id: &str) -> Result<EmissionsTable> {
        let files = self.run_files(run_id)?;
        if files.is_empty() {
            return Err(IngestError::Combine(format!(
                "no batch files for run {run_id} in {}",
                self.dir.display()
            )));
        }

        let mut pages = Vec::with_capacity(files.len());
        for file in &files {
            match load_table(file) {
                Ok(page) => pages.push(page),
                Err(e) => warn!(path = %file.display(), error = %e, "skipping unreadable batch file"),
            }
        }

        let table = EmissionsTable::union(pages);
        info!(run_id, files = files.len(), rows = table.len(), "recovered table from batch files");
        Ok(table)
    }

    fn scan(&self) -> Result<Vec<(String, usize, PathBuf)>> {
        let mut found = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if let Some((run_id, index)) = parse_file_name(&path) {
                found.push((run_id, index, path));
            }
        }
        Ok(found)
    }
}

fn parse_file_name(path: &Path) -> Option<(String, usize)> {
    if path.extension()?.to_str()? != EXTENSION {
        return None;
    }
    let stem = path.file_stem()?.to_str()?.strip_prefix(PREFIX)?;
    let (run_id, index) = stem.rsplit_once('-')?;
    Some((run_id.to_string(), index.parse().ok()?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Cell;
    use tempfile::tempdir;

    fn page(values: &[i64]) -> EmissionsTable {
        EmissionsTable::from_rows(
            vec!["emissions".to_string()],
            values.iter().map(|v| vec![Cell::Int(*v)]).collect(),
        )
        .unwrap()
    }

    #[test]
    fn should_store_and_recover_pages_in_order() {
        let dir = tempdir().unwrap();
        let cache = BatchCache::with_run_id(dir.path(), "20240101T000000000_1").unwrap();

        cache.store(1, &page(&[3])).unwrap();
        cache.store(0, &page(&[1, 2])).unwrap();

        let table = cache.recover_run(cache.run_id()).unwrap();
        let values: Vec<Cell> = table.column("emissions").unwrap().cloned().collect();
        assert_eq!(values, vec![Cell::Int(1), Cell::Int(2), Cell::Int(3)]);
    }

    #[test]
    fn should_pick_latest_run() {
        let dir = tempdir().unwrap();
        let old = BatchCache::with_run_id(dir.path(), "20230101T000000000_1").unwrap();
        let new = BatchCache::with_run_id(dir.path(), "20240101T000000000_1").unwrap();
        old.store(0, &page(&[1])).unwrap();
        new.store(0, &page(&[2])).unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        assert_eq!(new.latest_run().unwrap().as_deref(), Some("20240101T000000000_1"));
        assert_eq!(new.run_files(old.run_id()).unwrap().len(), 1);
    }

    #[test]
    fn should_clean_up_and_tolerate_missing_files() {
        let dir = tempdir().unwrap();
        let cache = BatchCache::with_run_id(dir.path(), "run_1").unwrap();
        let stored = cache.store(0, &page(&[1])).unwrap();

        cache.cleanup(&[stored.clone(), dir.path().join("batch-run_1-00009.parquet")]);

        assert!(!stored.exists());
        assert!(cache.run_files("run_1").unwrap().is_empty());
    }

    #[test]
    fn should_fail_recovery_without_files() {
        let dir = tempdir().unwrap();
        let cache = BatchCache::with_run_id(dir.path(), "run_1").unwrap();
        assert!(matches!(cache.recover_run("run_1"), Err(IngestError::Combine(_))));
    }
}
