//! Paginated fetches from the EPA GraphQL service.

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, error, info, instrument, warn};

use super::{
    cache::BatchCache,
    query::{PageQuery, TABLES_QUERY},
    DataSource, Filters, Normalizer, Transport,
};
use crate::{
    config::AppConfig,
    error::{IngestError, Result},
    table::EmissionsTable,
};

pub type Record = Map<String, Value>;

/// A table advertised by the remote service.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RemoteTable {
    pub name: String,
    pub description: Option<String>,
}

pub struct RemoteSource<T> {
    transport: T,
    table: String,
    fields: Vec<String>,
    order_by: Vec<String>,
    batch_size: usize,
    cache: Option<BatchCache>,
}

impl<T: Transport> RemoteSource<T> {
    pub fn new(transport: T, table: &str, config: &AppConfig) -> Self {
        RemoteSource {
            transport,
            table: config.resolve_table(table).to_string(),
            fields: config.fields.clone(),
            order_by: config.order_by.clone(),
            batch_size: config.batch_size,
            cache: None,
        }
    }

    /// Keeps every fetched page on disk until the pages are combined.
    pub fn with_cache(mut self, cache: BatchCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn cache(&self) -> Option<&BatchCache> {
        self.cache.as_ref()
    }

    fn page_query(&self, filters: &Filters) -> PageQuery {
        PageQuery {
            table: self.table.clone(),
            fields: self.fields.clone(),
            order_by: self.order_by.clone(),
            filters: filters.clone(),
        }
    }

    /// Fetches one page of raw records.
    pub async fn get_page(&self, filters: &Filters, offset: usize, limit: usize) -> Result<Vec<Record>> {
        let body = self.page_query(filters).body(offset, limit);
        let response = self.transport.post(&body).await?;
        extract_records(response, &self.table)
    }

    /// Fetches every page in order and concatenates them.
    ///
    /// A short or empty page ends the run. Any failed page aborts the run; pages
    /// already written to the batch cache are left on disk for [`Self::recover`].
    #[instrument(level = "info", skip(self), fields(table = %self.table))]
    pub async fn get_all(&self, filters: &Filters, batch_size: usize) -> Result<EmissionsTable> {
        if batch_size == 0 {
            return Err(IngestError::Config("batch size must be at least 1".to_string()));
        }

        let mut pages = Vec::new();
        let mut stored = Vec::new();
        let mut offset = 0;

        loop {
            let records = match self.get_page(filters, offset, batch_size).await {
                Ok(records) => records,
                Err(e) => {
                    error!(offset, error = %e, "page fetch failed, aborting");
                    if !stored.is_empty() {
                        warn!(files = stored.len(), "completed pages kept in batch cache");
                    }
                    return Err(e);
                }
            };

            let count = records.len();
            debug!(offset, count, "fetched page");
            if count == 0 {
                break;
            }

            let page = EmissionsTable::from_records(&records);
            if let Some(cache) = &self.cache {
                match cache.store(pages.len(), &page) {
                    Ok(path) => stored.push(path),
                    Err(e) => warn!(error = %e, "could not write batch file"),
                }
            }
            pages.push(page);

            if count < batch_size {
                break;
            }
            offset += count;
        }

        let table = combine(pages);
        if let Some(cache) = &self.cache {
            cache.cleanup(&stored);
        }
        info!(rows = table.len(), "fetched all pages");
        Ok(table)
    }

    /// Rebuilds the table from the pages left behind by the most recent
    /// failed run, then deletes those pages.
    pub fn recover(&self) -> Result<EmissionsTable> {
        let cache = self
            .cache
            .as_ref()
            .ok_or_else(|| IngestError::Config("batch caching is not enabled".to_string()))?;
        let run_id = cache.latest_run()?.ok_or_else(|| {
            IngestError::Combine(format!("no batch files in {}", cache.dir().display()))
        })?;

        let table = cache.recover_run(&run_id)?;
        cache.cleanup(&cache.run_files(&run_id)?);
        Ok(table)
    }

    /// Lists the tables the remote service exposes.
    pub async fn discover_tables(&self) -> Result<Vec<RemoteTable>> {
        let response = self
            .transport
            .post(&serde_json::json!({ "query": TABLES_QUERY }))
            .await?;
        check_errors(&response)?;

        let fields = response
            .pointer("/data/__type/fields")
            .and_then(Value::as_array)
            .ok_or_else(|| IngestError::MissingData("__type.fields".to_string()))?;

        Ok(fields
            .iter()
            .filter_map(|f| {
                Some(RemoteTable {
                    name: f.get("name")?.as_str()?.to_string(),
                    description: f
                        .get("description")
                        .and_then(Value::as_str)
                        .map(str::to_string),
                })
            })
            .collect())
    }
}

impl<T: Transport> DataSource for RemoteSource<T> {
    fn describe(&self) -> String {
        format!("remote table {}", self.table)
    }

    async fn fetch(&self, filters: &Filters) -> Result<EmissionsTable> {
        self.get_all(filters, self.batch_size).await
    }

    fn preprocess(&self, table: EmissionsTable) -> EmissionsTable {
        Normalizer::remote().apply(table)
    }
}

/// Concatenates pages in order. Pages that disagree on columns are merged
/// with null fill.
fn combine(pages: Vec<EmissionsTable>) -> EmissionsTable {
    if let Some(first) = pages.first() {
        if let Some(odd) = pages.iter().find(|p| p.columns() != first.columns()) {
            warn!(
                expected = ?first.columns(),
                found = ?odd.columns(),
                "pages disagree on columns, merging with null fill"
            );
        }
    }
    EmissionsTable::union(pages)
}

fn check_errors(response: &Value) -> Result<()> {
    match response.get("errors") {
        Some(errors) if !errors.is_null() => Err(IngestError::Remote(errors.to_string())),
        _ => Ok(()),
    }
}

fn extract_records(response: Value, table: &str) -> Result<Vec<Record>> {
    check_errors(&response)?;

    let rows = response
        .get("data")
        .and_then(|d| d.get(table))
        .and_then(Value::as_array)
        .ok_or_else(|| IngestError::MissingData(table.to_string()))?;

    Ok(rows
        .iter()
        .filter_map(|row| row.as_object().cloned())
        .collect())
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, collections::VecDeque};

    use serde_json::json;
    use tempfile::tempdir;

    use super::*;
    use crate::table::Cell;

    const TABLE: &str = "ghg__rlps_ghg_emitter_sector";

    /// Serves a fixed list of records, honouring the offset/limit variables.
    struct PagedTransport {
        records: Vec<Value>,
        calls: RefCell<Vec<(usize, usize)>>,
        fail_at_offset: Option<usize>,
    }

    impl PagedTransport {
        fn new(count: usize) -> Self {
            let records = (0..count)
                .map(|i| json!({ "facility_id": i, "co2e_emission": i as f64 * 1.5 }))
                .collect();
            PagedTransport {
                records,
                calls: RefCell::new(Vec::new()),
                fail_at_offset: None,
            }
        }
    }

    impl Transport for PagedTransport {
        async fn post(&self, body: &Value) -> Result<Value> {
            let offset = body["variables"]["offset"].as_u64().unwrap() as usize;
            let limit = body["variables"]["limit"].as_u64().unwrap() as usize;
            self.calls.borrow_mut().push((offset, limit));

            if self.fail_at_offset == Some(offset) {
                return Err(IngestError::Status {
                    status: 503,
                    body: "unavailable".to_string(),
                });
            }

            let page: Vec<Value> = self.records.iter().skip(offset).take(limit).cloned().collect();
            Ok(json!({ "data": { TABLE: page } }))
        }
    }

    /// Replays canned responses in order.
    struct ScriptedTransport {
        responses: RefCell<VecDeque<Value>>,
    }

    impl Transport for ScriptedTransport {
        async fn post(&self, _body: &Value) -> Result<Value> {
            Ok(self
                .responses
                .borrow_mut()
                .pop_front()
                .unwrap_or_else(|| json!({ "data": { TABLE: [] } })))
        }
    }

    fn source<T: Transport>(transport: T) -> RemoteSource<T> {
        RemoteSource::new(transport, "emissions", &AppConfig::default())
    }

    fn ids(table: &EmissionsTable) -> Vec<i64> {
        table
            .column("facility_id")
            .unwrap()
            .map(|c| c.as_i64().unwrap())
            .collect()
    }

    #[tokio::test]
    async fn should_fetch_full_pages_and_trailing_partial_page() {
        let remote = source(PagedTransport::new(3 * 4 + 2));

        let table = remote.get_all(&Filters::default(), 4).await.unwrap();

        assert_eq!(table.len(), 14);
        assert_eq!(ids(&table), (0..14).collect::<Vec<i64>>());
        assert_eq!(
            *remote.transport.calls.borrow(),
            vec![(0, 4), (4, 4), (8, 4), (12, 4)]
        );
    }

    #[tokio::test]
    async fn should_stop_on_empty_page_after_exact_multiple() {
        let remote = source(PagedTransport::new(8));

        let table = remote.get_all(&Filters::default(), 4).await.unwrap();

        assert_eq!(table.len(), 8);
        assert_eq!(remote.transport.calls.borrow().len(), 3);
    }

    #[tokio::test]
    async fn should_return_empty_table_when_no_records() {
        let remote = source(PagedTransport::new(0));

        let table = remote.get_all(&Filters::default(), 4).await.unwrap();

        assert!(table.is_empty());
        assert!(table.columns().is_empty());
    }

    #[tokio::test]
    async fn should_abort_on_failed_page_and_keep_batches() {
        let dir = tempdir().unwrap();
        let mut transport = PagedTransport::new(10);
        transport.fail_at_offset = Some(4);
        let cache = BatchCache::with_run_id(dir.path(), "run_1").unwrap();
        let remote = source(transport).with_cache(cache);

        let err = remote.get_all(&Filters::default(), 4).await.unwrap_err();

        assert!(matches!(err, IngestError::Status { status: 503, .. }));
        let kept = remote.cache().unwrap().run_files("run_1").unwrap();
        assert_eq!(kept.len(), 1);

        let recovered = remote.recover().unwrap();
        assert_eq!(ids(&recovered), vec![0, 1, 2, 3]);

        let cache = remote.cache().unwrap();
        assert!(cache.run_files("run_1").unwrap().is_empty());
        assert_eq!(cache.latest_run().unwrap(), None);
        assert!(remote.recover().is_err());
    }

    #[tokio::test]
    async fn should_delete_batches_after_successful_combine() {
        let dir = tempdir().unwrap();
        let cache = BatchCache::with_run_id(dir.path(), "run_1").unwrap();
        let remote = source(PagedTransport::new(6)).with_cache(cache);

        let table = remote.get_all(&Filters::default(), 4).await.unwrap();

        assert_eq!(table.len(), 6);
        assert!(remote.cache().unwrap().run_files("run_1").unwrap().is_empty());
    }

    #[tokio::test]
    async fn should_merge_pages_that_disagree_on_columns() {
        let dir = tempdir().unwrap();
        let cache = BatchCache::with_run_id(dir.path(), "run_1").unwrap();
        let transport = ScriptedTransport {
            responses: RefCell::new(VecDeque::from(vec![
                json!({ "data": { TABLE: [{ "facility_id": 1, "co2e_emission": 1.0 }] } }),
            ])),
        };
        let remote = RemoteSource::new(
            transport,
            TABLE,
            &AppConfig {
                batch_size: 1,
                ..AppConfig::default()
            },
        )
        .with_cache(cache);
        remote.transport.responses.borrow_mut().push_back(
            json!({ "data": { TABLE: [{ "facility_id": 2, "county": "ESSEX" }] } }),
        );

        let table = remote.get_all(&Filters::default(), 1).await.unwrap();

        assert_eq!(table.len(), 2);
        assert_eq!(table.columns().len(), 3);
        assert_eq!(
            table.column("county").unwrap().cloned().collect::<Vec<_>>(),
            vec![Cell::Null, Cell::Text("ESSEX".to_string())]
        );
        assert!(remote.cache().unwrap().run_files("run_1").unwrap().is_empty());
    }

    #[tokio::test]
    async fn should_keep_pages_whose_batch_file_could_not_be_written() {
        let dir = tempdir().unwrap();
        let cache_dir = dir.path().join("batches");
        let cache = BatchCache::with_run_id(&cache_dir, "run_1").unwrap();
        std::fs::remove_dir_all(&cache_dir).unwrap();
        let transport = ScriptedTransport {
            responses: RefCell::new(VecDeque::from(vec![
                json!({ "data": { TABLE: [{ "facility_id": 1, "co2e_emission": 1.0 }] } }),
                json!({ "data": { TABLE: [{ "facility_id": 2, "county": "ESSEX" }] } }),
            ])),
        };
        let remote = source(transport).with_cache(cache);

        let table = remote.get_all(&Filters::default(), 1).await.unwrap();

        assert_eq!(ids(&table), vec![1, 2]);
    }

    #[tokio::test]
    async fn should_treat_errors_field_as_fatal() {
        let transport = ScriptedTransport {
            responses: RefCell::new(VecDeque::from(vec![json!({
                "data": null,
                "errors": [{ "message": "Cannot query field" }]
            })])),
        };

        let err = source(transport).get_all(&Filters::default(), 10).await.unwrap_err();

        match err {
            IngestError::Remote(msg) => assert!(msg.contains("Cannot query field")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn should_reject_response_without_table_array() {
        let transport = ScriptedTransport {
            responses: RefCell::new(VecDeque::from(vec![json!({ "data": { "other": [] } })])),
        };

        let err = source(transport).get_page(&Filters::default(), 0, 10).await.unwrap_err();

        assert!(matches!(err, IngestError::MissingData(t) if t == TABLE));
    }

    #[tokio::test]
    async fn should_normalize_through_get_data() {
        let transport = ScriptedTransport {
            responses: RefCell::new(VecDeque::from(vec![json!({ "data": { TABLE: [
                { "facility_name": "A", "county": "Bergen County", "co2e_emission": "10", "year": 2022 },
                { "facility_name": "A", "county": "Bergen County", "co2e_emission": "10", "year": 2022 }
            ] } })])),
        };

        let table = source(transport).get_data(&Filters::default()).await.unwrap();

        assert_eq!(table.len(), 1);
        assert!(table.has_column("facility"));
        assert!(table.has_column("date"));
        assert_eq!(table.column("emissions").unwrap().next(), Some(&Cell::Float(10.0)));
    }

    #[tokio::test]
    async fn should_list_remote_tables() {
        let transport = ScriptedTransport {
            responses: RefCell::new(VecDeque::from(vec![json!({ "data": { "__type": { "fields": [
                { "name": "ghg__rlps_ghg_emitter_sector", "description": "Sector emissions" },
                { "name": "ghg__pub_dim_facility", "description": null }
            ] } } })])),
        };

        let tables = source(transport).discover_tables().await.unwrap();

        assert_eq!(tables.len(), 2);
        assert_eq!(tables[1].name, "ghg__pub_dim_facility");
        assert_eq!(tables[1].description, None);
    }

    #[tokio::test]
    async fn should_reject_zero_batch_size() {
        let err = source(PagedTransport::new(1)).get_all(&Filters::default(), 0).await.unwrap_err();
        assert!(matches!(err, IngestError::Config(_)));
    }
}
