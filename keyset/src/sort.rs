//! Sort specifications and their normalization into a total order.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{PaginationError, PaginationResult};

/// Sort direction of a single column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SortDirection {
    /// Ascending order (smallest to largest)
    #[serde(rename = "asc", alias = "ASC", alias = "Asc")]
    Asc,
    /// Descending order (largest to smallest)
    #[serde(rename = "desc", alias = "DESC", alias = "Desc")]
    Desc,
}

impl SortDirection {
    pub fn flip(self) -> Self {
        match self {
            SortDirection::Asc => SortDirection::Desc,
            SortDirection::Desc => SortDirection::Asc,
        }
    }

    pub fn as_sql(self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

/// One caller-supplied sort entry, shaped like a GraphQL input object
/// `{column: direction}`.
///
/// A well-formed entry names exactly one column; anything else is rejected
/// during normalization.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SortInput(pub BTreeMap<String, SortDirection>);

impl SortInput {
    pub fn new(column: impl Into<String>, direction: SortDirection) -> Self {
        Self(BTreeMap::from([(column.into(), direction)]))
    }

    pub fn asc(column: impl Into<String>) -> Self {
        Self::new(column, SortDirection::Asc)
    }

    pub fn desc(column: impl Into<String>) -> Self {
        Self::new(column, SortDirection::Desc)
    }

    fn single(&self) -> PaginationResult<SortEntry> {
        let mut pairs = self.0.iter();
        match (pairs.next(), pairs.next()) {
            (Some((column, _)), None) if column.is_empty() => Err(PaginationError::InvalidSortEntry {
                reason: "column name is empty".to_string(),
            }),
            (Some((column, direction)), None) => Ok(SortEntry::new(column.clone(), *direction)),
            _ => Err(PaginationError::InvalidSortEntry {
                reason: format!("expected exactly one column, got {}", self.0.len()),
            }),
        }
    }
}

/// A single normalized (column, direction) pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortEntry {
    pub column: String,
    pub direction: SortDirection,
}

impl SortEntry {
    pub fn new(column: impl Into<String>, direction: SortDirection) -> Self {
        Self {
            column: column.into(),
            direction,
        }
    }

    pub fn flip(&self) -> Self {
        Self::new(self.column.clone(), self.direction.flip())
    }
}

/// An ordered list of sort entries with unique columns.
///
/// Once normalized with a unique column, the spec defines a total order over
/// all records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortSpec {
    entries: Vec<SortEntry>,
}

impl SortSpec {
    /// Validates caller sort input and appends `{unique_column: asc}` when
    /// the unique column is not already sorted on.
    pub fn normalize(
        inputs: &[SortInput],
        unique_column: Option<&str>,
    ) -> PaginationResult<Self> {
        let mut entries: Vec<SortEntry> = Vec::with_capacity(inputs.len() + 1);

        for input in inputs {
            let entry = input.single()?;
            if entries.iter().any(|e| e.column == entry.column) {
                return Err(PaginationError::InvalidSortEntry {
                    reason: format!("column `{}` is sorted on more than once", entry.column),
                });
            }
            entries.push(entry);
        }

        match unique_column {
            Some("") => {
                return Err(PaginationError::InvalidSortEntry {
                    reason: "unique column name is empty".to_string(),
                })
            }
            Some(unique) => {
                if !entries.iter().any(|e| e.column == unique) {
                    entries.push(SortEntry::new(unique, SortDirection::Asc));
                }
            }
            None if entries.is_empty() => return Err(PaginationError::MissingSortSpecification),
            None => {}
        }

        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[SortEntry] {
        &self.entries
    }

    pub fn iter(&self) -> std::slice::Iter<'_, SortEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Column names in sort order; these are the columns a cursor captures.
    pub fn cursor_columns(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.column.as_str()).collect()
    }

    /// The same columns with every direction flipped.
    pub fn flipped(&self) -> Self {
        Self {
            entries: self.entries.iter().map(SortEntry::flip).collect(),
        }
    }
}

impl<'a> IntoIterator for &'a SortSpec {
    type Item = &'a SortEntry;
    type IntoIter = std::slice::Iter<'a, SortEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
