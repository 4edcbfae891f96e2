//! Fetch a table from a source, validate it and decide whether it is usable.

use std::collections::BTreeMap;

use tracing::{error, info, warn};

use crate::{
    error::{IngestError, Result},
    source::{DataSource, Filters, LocalSource},
    table::EmissionsTable,
    validation::{Strictness, ValidationReport, Validator},
};

pub struct Ingestion<S> {
    source: S,
    validator: Validator,
    strictness: Strictness,
    validate: bool,
}

impl<S: DataSource> Ingestion<S> {
    pub fn new(source: S) -> Self {
        Ingestion {
            source,
            validator: Validator::default(),
            strictness: Strictness::default(),
            validate: true,
        }
    }

    pub fn with_strictness(mut self, strictness: Strictness) -> Self {
        self.strictness = strictness;
        self
    }

    pub fn with_validator(mut self, validator: Validator) -> Self {
        self.validator = validator;
        self
    }

    /// Turns validation on or off. On by default.
    pub fn with_validation(mut self, validate: bool) -> Self {
        self.validate = validate;
        self
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Fetches, normalizes and (unless disabled) validates a table.
    pub async fn read(&self, filters: &Filters) -> Result<EmissionsTable> {
        let name = self.source.describe();
        info!(source = %name, ?filters, "fetching data");
        let table = self.source.get_data(filters).await?;

        if !self.validate {
            return Ok(table);
        }
        self.accept(&name, table)
    }

    /// Normalizes, filters and validates a raw table obtained outside
    /// [`Self::read`], such as one rebuilt from batch files.
    pub fn admit(&self, raw: EmissionsTable, filters: &Filters) -> Result<EmissionsTable> {
        let mut table = self.source.preprocess(raw);
        let before = table.len();
        table.retain_rows(|t, row| filters.matches(t, row));
        if table.len() < before {
            warn!(dropped = before - table.len(), ?filters, "discarded rows outside the requested filters");
        }

        if !self.validate {
            return Ok(table);
        }
        self.accept(&self.source.describe(), table)
    }

    /// Applies the strictness policy to a validation report.
    fn accept(&self, name: &str, table: EmissionsTable) -> Result<EmissionsTable> {
        info!(source = %name, "validating data");
        let report = self.validator.validate(&table);

        if report.empty {
            warn!(source = %name, "no rows");
            if table.columns().is_empty() {
                return Ok(table);
            }
        }

        if report.has_schema_errors() {
            log_issues(name, &report);
            return Err(IngestError::Schema {
                source_name: name.to_string(),
                missing: report.missing_columns,
            });
        }

        if report.is_valid() {
            info!(source = %name, rows = table.len(), "validation successful");
            return Ok(table);
        }

        log_issues(name, &report);
        match self.strictness {
            Strictness::Strict => Err(IngestError::Validation {
                source_name: name.to_string(),
                report,
            }),
            Strictness::Lenient => {
                warn!(source = %name, "continuing with data-quality warnings");
                Ok(table)
            }
        }
    }
}

impl Ingestion<LocalSource> {
    pub fn list_available_files(&self) -> Result<Vec<String>> {
        self.source.list_available_files()
    }

    /// Reads one file. Validation failures are returned as errors.
    pub fn read_file(&self, name: &str) -> Result<EmissionsTable> {
        let table = self.source.preprocess(self.source.read_file(name)?);
        if !self.validate {
            return Ok(table);
        }
        self.accept(name, table)
    }

    /// Reads every file in the directory, keeping only those that pass validation.
    pub fn read_and_validate_all_files(&self) -> Result<BTreeMap<String, EmissionsTable>> {
        let mut valid = BTreeMap::new();
        for name in self.list_available_files()? {
            match self.read_file(&name) {
                Ok(table) => {
                    valid.insert(name, table);
                }
                Err(e) => error!(file = %name, error = %e, "skipping file"),
            }
        }
        Ok(valid)
    }
}

fn log_issues(name: &str, report: &ValidationReport) {
    for (category, issues) in report.categories() {
        for issue in issues {
            warn!(source = %name, category, "{issue}");
        }
    }
}
