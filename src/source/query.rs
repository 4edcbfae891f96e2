//! GraphQL query text for the EPA emissions service.

use serde_json::{json, Value};

use super::Filters;

/// Introspection query listing every queryable table.
pub const TABLES_QUERY: &str = r#"query {
  __type(name: "Query") {
    fields {
      name
      description
    }
  }
}"#;

/// A paginated select over one table with a fixed filter and sort order.
#[derive(Debug, Clone)]
pub struct PageQuery {
    pub table: String,
    pub fields: Vec<String>,
    pub order_by: Vec<String>,
    pub filters: Filters,
}

impl PageQuery {
    pub fn text(&self) -> String {
        let mut args = vec!["offset: $offset".to_string(), "limit: $limit".to_string()];
        if let Some(clause) = self.where_clause() {
            args.push(format!("where: {clause}"));
        }
        if !self.order_by.is_empty() {
            let keys: Vec<String> = self.order_by.iter().map(|f| format!("{f}: asc")).collect();
            args.push(format!("order_by: {{{}}}", keys.join(", ")));
        }

        format!(
            "query batchQuery($offset: Int, $limit: Int) {{\n  {table}({args}) {{\n{fields}\n  }}\n}}",
            table = self.table,
            args = args.join(", "),
            fields = self
                .fields
                .iter()
                .map(|f| format!("    {f}"))
                .collect::<Vec<_>>()
                .join("\n"),
        )
    }

    /// Request body for the page starting at `offset`.
    pub fn body(&self, offset: usize, limit: usize) -> Value {
        json!({
            "query": self.text(),
            "variables": { "offset": offset, "limit": limit },
        })
    }

    fn where_clause(&self) -> Option<String> {
        let mut conditions = Vec::new();
        if let Some(state) = &self.filters.state {
            // serde_json renders a correctly escaped string literal
            conditions.push(format!("state: {{_eq: {}}}", Value::String(state.clone())));
        }
        if let Some(year) = self.filters.year {
            conditions.push(format!("year: {{_eq: {year}}}"));
        }
        if conditions.is_empty() {
            None
        } else {
            Some(format!("{{{}}}", conditions.join(", ")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(filters: Filters) -> PageQuery {
        PageQuery {
            table: "ghg__rlps_ghg_emitter_sector".to_string(),
            fields: vec!["facility_name".to_string(), "co2e_emission".to_string()],
            order_by: vec!["facility_id".to_string(), "year".to_string()],
            filters,
        }
    }

    #[test]
    fn should_render_filters_and_sort_order() {
        let text = query(Filters::new(Some("nj".to_string()), Some(2022))).text();

        assert!(text.contains(
            r#"ghg__rlps_ghg_emitter_sector(offset: $offset, limit: $limit, where: {state: {_eq: "NJ"}, year: {_eq: 2022}}, order_by: {facility_id: asc, year: asc})"#
        ));
        assert!(text.contains("    facility_name\n    co2e_emission"));
    }

    #[test]
    fn should_omit_empty_where_clause() {
        let text = query(Filters::default()).text();
        assert!(!text.contains("where"));
    }

    #[test]
    fn should_put_paging_in_variables() {
        let body = query(Filters::default()).body(2000, 1000);
        assert_eq!(body["variables"]["offset"], 2000);
        assert_eq!(body["variables"]["limit"], 1000);
    }
}
