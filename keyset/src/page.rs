use serde::{Deserialize, Serialize};

use crate::{
    Boundary, CursorCodec, FetchPlan, KeyTuple, LimitKind, NullCoalesceMap, PaginationError,
    PaginationResult, Record, RequestShape, SortSpec, Value,
};

/// A record paired with its cursor
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Edge<R> {
    pub node: R,
    pub cursor: String,
}

/// Connection page metadata
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    pub start_cursor: Option<String>,
    pub end_cursor: Option<String>,
    pub has_previous_page: bool,
    pub has_next_page: bool,
}

impl PageInfo {
    /// `(has_previous_page, has_next_page)` for a request shape, given whether
    /// the lookahead row came back.
    pub fn flags(shape: RequestShape, more_pages: bool) -> (bool, bool) {
        match (shape.cursor, shape.limit) {
            (Some(Boundary::After), Some(LimitKind::First)) => (true, more_pages),
            (Some(Boundary::After), _) => (true, false),
            (Some(Boundary::Before), Some(LimitKind::Last)) => (more_pages, true),
            (Some(Boundary::Before), _) => (false, true),
            (None, Some(LimitKind::First)) => (false, more_pages),
            (None, Some(LimitKind::Last)) => (more_pages, false),
            (None, None) => (false, false),
        }
    }
}

/// One page of a connection
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<R> {
    pub edges: Vec<Edge<R>>,
    pub page_info: PageInfo,
}

impl<R> Page<R> {
    pub fn nodes(&self) -> impl Iterator<Item = &R> {
        self.edges.iter().map(|edge| &edge.node)
    }

    pub fn into_nodes(self) -> Vec<R> {
        self.edges.into_iter().map(|edge| edge.node).collect()
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }
}

/// Turns fetched rows into a page: drops the lookahead row, restores the
/// logical order and mints a cursor for every remaining row.
pub fn assemble<R: Record>(
    mut rows: Vec<R>,
    plan: &FetchPlan,
    shape: RequestShape,
    spec: &SortSpec,
    coalesce: &NullCoalesceMap,
    codec: &dyn CursorCodec,
) -> PaginationResult<Page<R>> {
    // Bounded pages compared every row against the cursor; a raw NULL in an
    // uncoalesced sort column means that comparison was undefined.
    if shape.cursor.is_some() {
        for row in &rows {
            reject_raw_nulls(row, spec, coalesce)?;
        }
    }

    let more_pages = rows.len() > plan.count;
    rows.truncate(plan.count);

    if plan.reverse {
        rows.reverse();
    }

    let edges = rows
        .into_iter()
        .map(|node| {
            let key = KeyTuple::from_record(&node, spec, coalesce)?;
            let cursor = codec.encode(&key)?;
            Ok(Edge { node, cursor })
        })
        .collect::<PaginationResult<Vec<_>>>()?;

    let (has_previous_page, has_next_page) = PageInfo::flags(shape, more_pages);

    Ok(Page {
        page_info: PageInfo {
            start_cursor: edges.first().map(|edge| edge.cursor.clone()),
            end_cursor: edges.last().map(|edge| edge.cursor.clone()),
            has_previous_page,
            has_next_page,
        },
        edges,
    })
}

fn reject_raw_nulls<R: Record>(
    row: &R,
    spec: &SortSpec,
    coalesce: &NullCoalesceMap,
) -> PaginationResult<()> {
    match spec
        .iter()
        .filter(|entry| !coalesce.contains_key(&entry.column))
        .find(|entry| matches!(row.value(&entry.column), Some(Value::Null)))
    {
        Some(entry) => Err(PaginationError::UnsafeNullComparison {
            column: entry.column.clone(),
        }),
        None => Ok(()),
    }
}
