//! Page requests and their validation.

use serde::{Deserialize, Serialize};

use crate::{Boundary, PaginationError, PaginationResult, SortInput};

/// Connection arguments of a single page request.
///
/// Exactly one of `first`/`last` must be present, with at most one cursor:
/// `after` pairs with `first`, `before` pairs with `last`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sorts: Vec<SortInput>,
}

impl PageRequest {
    pub fn first(count: i64) -> Self {
        Self {
            first: Some(count),
            ..Default::default()
        }
    }

    pub fn last(count: i64) -> Self {
        Self {
            last: Some(count),
            ..Default::default()
        }
    }

    pub fn after(mut self, cursor: impl Into<String>) -> Self {
        self.after = Some(cursor.into());
        self
    }

    pub fn before(mut self, cursor: impl Into<String>) -> Self {
        self.before = Some(cursor.into());
        self
    }

    pub fn after_opt(mut self, cursor: Option<String>) -> Self {
        self.after = cursor;
        self
    }

    pub fn before_opt(mut self, cursor: Option<String>) -> Self {
        self.before = cursor;
        self
    }

    pub fn sort_by(mut self, sort: SortInput) -> Self {
        self.sorts.push(sort);
        self
    }

    /// Which arguments were supplied, regardless of validity.
    pub fn shape(&self) -> RequestShape {
        let limit = match (self.first, self.last) {
            (Some(_), _) => Some(LimitKind::First),
            (None, Some(_)) => Some(LimitKind::Last),
            (None, None) => None,
        };
        let cursor = match (&self.after, &self.before) {
            (Some(_), _) => Some(Boundary::After),
            (None, Some(_)) => Some(Boundary::Before),
            (None, None) => None,
        };
        RequestShape { limit, cursor }
    }

    /// Validates argument combinations before any data is touched.
    pub fn window(&self) -> PaginationResult<PageWindow<'_>> {
        let present = [
            ("first", self.first.is_some()),
            ("last", self.last.is_some()),
            ("before", self.before.is_some()),
            ("after", self.after.is_some()),
        ];
        let is_present = |name: &str| present.iter().any(|(n, p)| *n == name && *p);

        for (first, second) in CONFLICTING_ARGUMENTS {
            if is_present(first) && is_present(second) {
                return Err(PaginationError::ConflictingPageArguments { first, second });
            }
        }

        let limit = match (self.first, self.last) {
            (Some(count), _) => PageLimit::First(positive("first", count)?),
            (None, Some(count)) => PageLimit::Last(positive("last", count)?),
            (None, None) => return Err(PaginationError::MissingPageDirection),
        };

        let cursor = match (&self.after, &self.before) {
            (Some(cursor), _) => Some((Boundary::After, cursor.as_str())),
            (None, Some(cursor)) => Some((Boundary::Before, cursor.as_str())),
            (None, None) => None,
        };

        Ok(PageWindow { limit, cursor })
    }
}

const CONFLICTING_ARGUMENTS: [(&str, &str); 4] = [
    ("first", "last"),
    ("before", "after"),
    ("first", "before"),
    ("last", "after"),
];

fn positive(argument: &'static str, value: i64) -> PaginationResult<usize> {
    if value <= 0 {
        return Err(PaginationError::InvalidLimit { argument, value });
    }
    usize::try_from(value).map_err(|_| PaginationError::InvalidLimit { argument, value })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitKind {
    First,
    Last,
}

/// The combination of arguments a request carried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestShape {
    pub limit: Option<LimitKind>,
    pub cursor: Option<Boundary>,
}

/// Requested page size and the side of the set it is counted from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageLimit {
    First(usize),
    Last(usize),
}

impl PageLimit {
    pub fn count(self) -> usize {
        match self {
            PageLimit::First(count) | PageLimit::Last(count) => count,
        }
    }

    pub fn is_backward(self) -> bool {
        matches!(self, PageLimit::Last(_))
    }

    pub fn kind(self) -> LimitKind {
        match self {
            PageLimit::First(_) => LimitKind::First,
            PageLimit::Last(_) => LimitKind::Last,
        }
    }
}

/// A validated request: page size plus the optional cursor boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow<'a> {
    pub limit: PageLimit,
    pub cursor: Option<(Boundary, &'a str)>,
}

impl PageWindow<'_> {
    pub fn shape(&self) -> RequestShape {
        RequestShape {
            limit: Some(self.limit.kind()),
            cursor: self.cursor.map(|(boundary, _)| boundary),
        }
    }
}
