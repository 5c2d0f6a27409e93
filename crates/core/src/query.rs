//! List queries: filtering, search, ordering and page-based pagination.
//!
//! Query parameters are interpreted against an entity's [`EntitySchema`]. Unknown parameters
//! are ignored; malformed values for known filters are validation errors.

use crate::entity::{EntitySchema, FilterKind};
use crate::error::FieldErrors;
use crate::{CoreError, CoreResult};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::types::Value;
use std::collections::BTreeMap;

pub const SEARCH_PARAM: &str = "search";
pub const ORDERING_PARAM: &str = "ordering";
pub const PAGE_PARAM: &str = "page";
pub const PAGE_SIZE_PARAM: &str = "page_size";

/// Raw query parameters for a list request.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ListQuery {
    params: BTreeMap<String, String>,
}

impl ListQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from decoded query pairs. Later duplicates win.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            params: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.params.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.params
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
    }

    /// Names of the schema filters this query applies, for audit summaries.
    pub fn applied_filters(&self, schema: &EntitySchema) -> Vec<String> {
        schema
            .filters
            .iter()
            .filter(|f| self.get(f.param).is_some())
            .map(|f| f.param.to_string())
            .collect()
    }
}

/// One page of results.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct Page<T> {
    pub count: u64,
    pub page: u32,
    pub page_size: u32,
    pub next: Option<u32>,
    pub previous: Option<u32>,
    pub results: Vec<T>,
}

impl<T> Page<T> {
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            count: self.count,
            page: self.page,
            page_size: self.page_size,
            next: self.next,
            previous: self.previous,
            results: self.results.into_iter().map(f).collect(),
        }
    }
}

/// Requested page window.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageWindow {
    pub page: u32,
    pub page_size: u32,
}

impl PageWindow {
    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.page_size)
    }

    /// Fail if the page lies beyond the last page of `count` results. Page 1 always exists.
    pub fn ensure_exists(&self, count: u64) -> CoreResult<()> {
        if self.page > 1 && self.offset() >= count {
            return Err(CoreError::InvalidPage(self.page.to_string()));
        }
        Ok(())
    }

    pub fn into_page<T>(self, count: u64, results: Vec<T>) -> Page<T> {
        let shown = self.offset() + results.len() as u64;
        Page {
            count,
            page: self.page,
            page_size: self.page_size,
            next: (shown < count).then_some(self.page + 1),
            previous: (self.page > 1).then_some(self.page - 1),
            results,
        }
    }
}

/// Resolve `page` and `page_size`, capping the size at `max_size`.
pub fn page_window(query: &ListQuery, default_size: u32, max_size: u32) -> CoreResult<PageWindow> {
    let page = match query.get(PAGE_PARAM) {
        None => 1,
        Some(raw) => raw
            .trim()
            .parse::<u32>()
            .ok()
            .filter(|p| *p >= 1)
            .ok_or_else(|| CoreError::InvalidPage(raw.to_string()))?,
    };
    let page_size = match query.get(PAGE_SIZE_PARAM) {
        None => default_size,
        Some(raw) => raw
            .trim()
            .parse::<u32>()
            .ok()
            .filter(|s| *s >= 1)
            .map(|s| s.min(max_size))
            .ok_or_else(|| CoreError::field(PAGE_SIZE_PARAM, "A valid integer is required."))?,
    };
    Ok(PageWindow { page, page_size })
}

/// WHERE and ORDER BY clauses for a list query.
#[derive(Debug, Clone, PartialEq)]
pub struct ListPlan {
    pub where_sql: String,
    pub params: Vec<Value>,
    pub order_sql: String,
}

/// Build the SQL plan for `query` against `schema`, with an optional row scope.
pub fn plan(schema: &EntitySchema, query: &ListQuery, scope: Option<&str>) -> CoreResult<ListPlan> {
    let mut clauses: Vec<String> = Vec::new();
    let mut params: Vec<Value> = Vec::new();
    let mut errors = FieldErrors::new();

    if let Some(scope) = scope {
        clauses.push(format!("({})", scope));
    }

    for filter in schema.filters {
        let Some(raw) = query.get(filter.param) else {
            continue;
        };
        let raw = raw.trim();
        match filter.kind {
            FilterKind::Exact => {
                clauses.push(format!("{} = ?", filter.expr));
                params.push(Value::Text(raw.to_string()));
            }
            FilterKind::Integer => match raw.parse::<i64>() {
                Ok(n) => {
                    clauses.push(format!("{} = ?", filter.expr));
                    params.push(Value::Integer(n));
                }
                Err(_) => errors.add(filter.param, "Enter a whole number."),
            },
            FilterKind::Boolean => match parse_bool(raw) {
                Some(b) => {
                    clauses.push(format!("{} = ?", filter.expr));
                    params.push(Value::Integer(i64::from(b)));
                }
                None => errors.add(filter.param, "Enter true or false."),
            },
            FilterKind::Contains => {
                clauses.push(format!("{} LIKE ? ESCAPE '\\'", filter.expr));
                params.push(Value::Text(like_pattern(raw)));
            }
            FilterKind::DateFrom | FilterKind::DateTo | FilterKind::OnDate => {
                match NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
                    Ok(day) => {
                        let op = match filter.kind {
                            FilterKind::DateFrom => ">=",
                            FilterKind::DateTo => "<=",
                            _ => "=",
                        };
                        clauses.push(format!("date({}) {} ?", filter.expr, op));
                        params.push(Value::Text(day.format("%Y-%m-%d").to_string()));
                    }
                    Err(_) => errors.add(filter.param, "Enter a valid date (YYYY-MM-DD)."),
                }
            }
            FilterKind::TimeFrom => match parse_instant(raw) {
                Some(instant) => {
                    clauses.push(format!("julianday({}) >= julianday(?)", filter.expr));
                    params.push(Value::Text(crate::store::timestamp_text(&instant)));
                }
                None => errors.add(filter.param, "Enter a valid date/time."),
            },
        }
    }

    if let Some(search) = query.get(SEARCH_PARAM) {
        if !schema.search.is_empty() {
            for term in search.split_whitespace() {
                let pattern = like_pattern(term);
                let any = schema
                    .search
                    .iter()
                    .map(|expr| {
                        params.push(Value::Text(pattern.clone()));
                        format!("{} LIKE ? ESCAPE '\\'", expr)
                    })
                    .collect::<Vec<_>>()
                    .join(" OR ");
                clauses.push(format!("({})", any));
            }
        }
    }

    if !errors.is_empty() {
        return Err(CoreError::Validation(errors));
    }

    let where_sql = if clauses.is_empty() {
        "1 = 1".to_string()
    } else {
        clauses.join(" AND ")
    };

    Ok(ListPlan {
        where_sql,
        params,
        order_sql: order_by(schema, query.get(ORDERING_PARAM)),
    })
}

fn order_by(schema: &EntitySchema, requested: Option<&str>) -> String {
    let resolve = |term: &str| -> Option<String> {
        let (name, direction) = match term.trim().strip_prefix('-') {
            Some(name) => (name, "DESC"),
            None => (term.trim(), "ASC"),
        };
        schema
            .ordering
            .iter()
            .find(|(param, _)| *param == name)
            .map(|(_, expr)| format!("{} {}", expr, direction))
    };

    let mut terms: Vec<String> = requested
        .map(|r| r.split(',').filter_map(resolve).collect())
        .unwrap_or_default();
    if terms.is_empty() {
        terms = schema
            .default_ordering
            .iter()
            .filter_map(|t| resolve(t))
            .collect();
    }
    terms.push("t.id ASC".to_string());
    terms.join(", ")
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

fn parse_instant(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// `%term%` with LIKE metacharacters escaped by `\`.
fn like_pattern(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len() + 2);
    escaped.push('%');
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::Access;
    use crate::entity::Filter;

    static SCHEMA: EntitySchema = EntitySchema {
        filters: &[
            Filter::exact("patient", "t.patient_id"),
            Filter::boolean("is_active", "t.is_active"),
            Filter::date_from("record_date_after", "t.record_date"),
        ],
        search: &["t.name", "json_extract(t.body, '$.notes')"],
        ordering: &[("record_date", "t.record_date"), ("name", "t.name")],
        default_ordering: &["-record_date"],
        nullable_refs: &[],
        read: Access::Authenticated,
        write: Access::Authenticated,
        audit_reads: false,
    };

    #[test]
    fn test_plan_combines_filters_and_search() {
        let query = ListQuery::new()
            .with("patient", "abc")
            .with("is_active", "true")
            .with("search", "malaria fever")
            .with("unknown", "ignored");
        let plan = plan(&SCHEMA, &query, None).expect("plan should build");

        assert_eq!(
            plan.where_sql,
            "t.patient_id = ? AND t.is_active = ? AND (t.name LIKE ? ESCAPE '\\' OR json_extract(t.body, '$.notes') LIKE ? ESCAPE '\\') AND (t.name LIKE ? ESCAPE '\\' OR json_extract(t.body, '$.notes') LIKE ? ESCAPE '\\')"
        );
        assert_eq!(plan.params.len(), 6);
        assert_eq!(plan.params[2], Value::Text("%malaria%".into()));
    }

    #[test]
    fn test_plan_rejects_malformed_filter_values() {
        let query = ListQuery::new()
            .with("is_active", "maybe")
            .with("record_date_after", "03/22/2024");
        match plan(&SCHEMA, &query, None) {
            Err(CoreError::Validation(errors)) => {
                assert!(errors.contains("is_active"));
                assert!(errors.contains("record_date_after"));
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_ordering_uses_whitelist_and_default() {
        let default = plan(&SCHEMA, &ListQuery::new(), None).expect("plan");
        assert_eq!(default.order_sql, "t.record_date DESC, t.id ASC");

        let custom = plan(
            &SCHEMA,
            &ListQuery::new().with("ordering", "name,-created_at; DROP TABLE x"),
            None,
        )
        .expect("plan");
        assert_eq!(custom.order_sql, "t.name ASC, t.id ASC");
    }

    #[test]
    fn test_page_window_caps_size_and_rejects_zero() {
        let window = page_window(&ListQuery::new().with("page_size", "500"), 20, 100)
            .expect("window should resolve");
        assert_eq!(window, PageWindow { page: 1, page_size: 100 });

        assert!(matches!(
            page_window(&ListQuery::new().with("page", "0"), 20, 100),
            Err(CoreError::InvalidPage(_))
        ));
    }

    #[test]
    fn test_page_links() {
        let window = PageWindow { page: 2, page_size: 10 };
        let page = window.into_page(25, vec![0; 10]);
        assert_eq!(page.next, Some(3));
        assert_eq!(page.previous, Some(1));
        assert!(window.ensure_exists(25).is_ok());
        assert!(PageWindow { page: 4, page_size: 10 }.ensure_exists(25).is_err());
    }

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("50%_off"), "%50\\%\\_off%");
    }
}
