//! In-memory ordered source.
//!
//! Evaluates a bounded query the way a database would: filter by the boundary
//! predicate, sort by the physical order, keep the first `limit` rows.

use std::cmp::Ordering;

use crate::{OrderedSource, PaginationResult, Record, SortDirection, Value};

/// An in-memory record collection that can be paged over.
#[derive(Debug, Clone, Default)]
pub struct MemorySource<R> {
    records: Vec<R>,
}

impl<R> MemorySource<R> {
    pub fn new(records: Vec<R>) -> Self {
        Self { records }
    }

    pub fn push(&mut self, record: R) {
        self.records.push(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[R] {
        &self.records
    }
}

impl<R: Record + Clone> MemorySource<R> {
    /// Fetch function for [`crate::paginate`].
    pub fn fetch(query: OrderedSource<&Self>) -> PaginationResult<Vec<R>> {
        let mut keyed = Vec::new();

        for record in &query.source().records {
            if let Some(predicate) = query.predicate() {
                if !predicate.evaluate(record)? {
                    continue;
                }
            }

            let key = query
                .order()
                .iter()
                .map(|term| term.column.order_value(record))
                .collect::<PaginationResult<Vec<Value>>>()?;
            keyed.push((key, record));
        }

        keyed.sort_by(|(a, _), (b, _)| {
            a.iter()
                .zip(b)
                .zip(query.order())
                .map(|((a, b), term)| match term.direction {
                    SortDirection::Asc => a.total_cmp(b),
                    SortDirection::Desc => b.total_cmp(a),
                })
                .find(|ordering| *ordering != Ordering::Equal)
                .unwrap_or(Ordering::Equal)
        });

        Ok(keyed
            .into_iter()
            .take(query.limit())
            .map(|(_, record)| record.clone())
            .collect())
    }
}

impl<R> FromIterator<R> for MemorySource<R> {
    fn from_iter<I: IntoIterator<Item = R>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
