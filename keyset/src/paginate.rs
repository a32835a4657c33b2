use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{
    assemble, CursorCodec, DigestCursorCodec, FetchPlan, NullCoalesceMap, OrderTerm, Page,
    PageRequest, PaginationResult, Predicate, Record, SortSpec, Value,
};

/// Pagination settings shared by every request against one source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginationConfig {
    /// Column appended as the final ascending tie-break, making the order total.
    #[serde(default)]
    pub unique_column: Option<String>,
    /// Substitutes for nullable sort columns. Applied to ORDER BY, to the
    /// boundary predicate and to cursor values alike.
    #[serde(default)]
    pub null_coalesce: NullCoalesceMap,
    #[serde(default = "default_codec")]
    pub codec: Box<dyn CursorCodec>,
}

fn default_codec() -> Box<dyn CursorCodec> {
    Box::new(DigestCursorCodec)
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            unique_column: None,
            null_coalesce: NullCoalesceMap::new(),
            codec: default_codec(),
        }
    }
}

impl PaginationConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_unique_column(mut self, column: impl Into<String>) -> Self {
        self.unique_column = Some(column.into());
        self
    }

    pub fn with_null_coalesce(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.null_coalesce.insert(column.into(), value.into());
        self
    }

    pub fn with_codec<C: CursorCodec + 'static>(mut self, codec: C) -> Self {
        self.codec = Box::new(codec);
        self
    }
}

/// The caller's source together with the bounded read the engine wants:
/// physical order, optional boundary predicate, and row limit.
///
/// This is what the fetch function receives; interpreting it against a real
/// store is entirely the fetch function's business.
#[derive(Debug, Clone)]
pub struct OrderedSource<S> {
    source: S,
    order: Vec<OrderTerm>,
    predicate: Option<Predicate>,
    limit: usize,
}

impl<S> OrderedSource<S> {
    pub fn new(source: S, order: Vec<OrderTerm>, predicate: Option<Predicate>, limit: usize) -> Self {
        Self {
            source,
            order,
            predicate,
            limit,
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn order(&self) -> &[OrderTerm] {
        &self.order
    }

    pub fn predicate(&self) -> Option<&Predicate> {
        self.predicate.as_ref()
    }

    /// Maximum number of rows to return, including the lookahead row.
    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn into_source(self) -> S {
        self.source
    }
}

/// Fetches one page of `source`.
///
/// The request is validated and the cursor decoded before `fetch` is called;
/// `fetch` runs exactly once on success paths and never on rejected requests.
pub fn paginate<S, R, F>(
    source: S,
    fetch: F,
    request: &PageRequest,
    config: &PaginationConfig,
) -> PaginationResult<Page<R>>
where
    R: Record,
    F: FnOnce(OrderedSource<S>) -> PaginationResult<Vec<R>>,
{
    let window = request.window()?;
    let spec = SortSpec::normalize(&request.sorts, config.unique_column.as_deref())?;
    let columns = spec.cursor_columns();

    let predicate = match window.cursor {
        Some((boundary, token)) => {
            let key = config.codec.decode(token, &columns).inspect_err(|err| {
                warn!(error = %err, columns = ?columns, "rejected pagination cursor");
            })?;
            Some(Predicate::build(&spec, boundary, &key, &config.null_coalesce)?)
        }
        None => None,
    };

    let plan = FetchPlan::new(&spec, window.limit);
    debug!(
        columns = ?columns,
        count = plan.count,
        limit = plan.limit,
        reverse = plan.reverse,
        bounded = predicate.is_some(),
        "planned page fetch"
    );

    let query = OrderedSource::new(
        source,
        plan.order_terms(&config.null_coalesce),
        predicate,
        plan.limit,
    );
    let rows = fetch(query)?;
    debug!(rows = rows.len(), "fetched page rows");

    assemble(
        rows,
        &plan,
        window.shape(),
        &spec,
        &config.null_coalesce,
        config.codec.as_ref(),
    )
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::{MemorySource, PaginationError, PlainCursorCodec, Row, SortInput};

    fn numbered(n: i64) -> MemorySource<Row> {
        MemorySource::new(
            (1..=n)
                .map(|id| Row::from([("id".to_string(), Value::Int(id))]))
                .collect(),
        )
    }

    fn ids(page: &Page<Row>) -> Vec<i64> {
        page.nodes()
            .map(|row| match row["id"] {
                Value::Int(id) => id,
                _ => unreachable!(),
            })
            .collect()
    }

    fn config() -> PaginationConfig {
        PaginationConfig::new().with_unique_column("id")
    }

    #[test]
    fn test_fetch_receives_bounded_query() {
        let store = numbered(10);
        let first = paginate(&store, MemorySource::fetch, &PageRequest::first(2), &config()).unwrap();

        let request = PageRequest::last(3).before(first.page_info.end_cursor.clone().unwrap());
        let page = paginate(
            &store,
            |query: OrderedSource<&MemorySource<Row>>| {
                assert_eq!(query.limit(), 4);
                assert_eq!(query.order()[0].direction, crate::SortDirection::Desc);
                assert!(query.predicate().is_some());
                MemorySource::fetch(query)
            },
            &request,
            &config(),
        )
        .unwrap();

        assert_eq!(ids(&page), vec![1]);
        assert!(!page.page_info.has_previous_page);
        assert!(page.page_info.has_next_page);
    }

    #[test]
    fn test_rejected_request_never_fetches() {
        let calls = Cell::new(0);
        let store = numbered(3);
        let request = PageRequest::first(3).before("x");

        let err = paginate(
            &store,
            |query| {
                calls.set(calls.get() + 1);
                MemorySource::fetch(query)
            },
            &request,
            &config(),
        )
        .unwrap_err();

        assert!(matches!(err, PaginationError::ConflictingPageArguments { .. }));
        assert_eq!(calls.get(), 0);
    }

    #[test]
    fn test_bad_cursor_never_fetches() {
        let calls = Cell::new(0);
        let store = numbered(3);

        let err = paginate(
            &store,
            |query| {
                calls.set(calls.get() + 1);
                MemorySource::fetch(query)
            },
            &PageRequest::first(1).after("bm90IGEgY3Vyc29y"),
            &config(),
        )
        .unwrap_err();

        assert!(matches!(err, PaginationError::InvalidCursor { .. }));
        assert_eq!(calls.get(), 0);
    }

    #[test]
    fn test_cursor_from_other_sort_is_rejected() {
        let store = numbered(3);
        let page = paginate(&store, MemorySource::fetch, &PageRequest::first(1), &config()).unwrap();
        let cursor = page.page_info.end_cursor.unwrap();

        let request = PageRequest::first(1)
            .after(cursor)
            .sort_by(SortInput::desc("name"));
        let err = paginate(&store, MemorySource::fetch, &request, &config()).unwrap_err();
        assert!(matches!(err, PaginationError::InvalidCursor { .. }));
    }

    #[test]
    fn test_fetch_errors_propagate() {
        let err = paginate(
            (),
            |_query: OrderedSource<()>| -> PaginationResult<Vec<Row>> {
                Err(PaginationError::fetch(std::io::Error::other("connection reset")))
            },
            &PageRequest::first(1),
            &config(),
        )
        .unwrap_err();
        assert!(matches!(err, PaginationError::Fetch { .. }));
    }

    #[test]
    fn test_config_loads_from_json() {
        let config: PaginationConfig = serde_json::from_str(
            r#"{
                "unique_column": "id",
                "null_coalesce": {"nickname": {"t": "text", "v": ""}},
                "codec": {"type": "plain"}
            }"#,
        )
        .unwrap();
        assert_eq!(config.unique_column.as_deref(), Some("id"));
        assert_eq!(config.null_coalesce["nickname"], Value::from(""));

        let store = numbered(2);
        let page = paginate(&store, MemorySource::fetch, &PageRequest::first(1), &config).unwrap();
        let cursor = page.page_info.end_cursor.unwrap();
        assert!(PlainCursorCodec.decode(&cursor, &["id"]).is_ok());

        let defaults: PaginationConfig = serde_json::from_str("{}").unwrap();
        assert!(defaults.unique_column.is_none());
        assert!(defaults.null_coalesce.is_empty());
    }
}
