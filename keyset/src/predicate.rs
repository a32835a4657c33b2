//! Boundary predicates: "strictly after/before this position" in a
//! lexicographic order over any number of sort columns.

use std::cmp::Ordering;

use crate::{KeyTuple, NullCoalesceMap, PaginationError, PaginationResult, Record, SortDirection, SortSpec, Value};

/// Which side of the cursor a page lies on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Boundary {
    /// Records strictly after the cursor in the declared order
    After,
    /// Records strictly before the cursor in the declared order
    Before,
}

/// Comparison operator of a single column term
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Gt,
    Lt,
    Eq,
}

impl CompareOp {
    /// Strict operator that moves past the cursor along `direction`.
    pub fn strict(direction: SortDirection, boundary: Boundary) -> Self {
        match (direction, boundary) {
            (SortDirection::Asc, Boundary::After) | (SortDirection::Desc, Boundary::Before) => {
                CompareOp::Gt
            }
            (SortDirection::Desc, Boundary::After) | (SortDirection::Asc, Boundary::Before) => {
                CompareOp::Lt
            }
        }
    }

    pub fn as_sql(self) -> &'static str {
        match self {
            CompareOp::Gt => ">",
            CompareOp::Lt => "<",
            CompareOp::Eq => "=",
        }
    }

    fn matches(self, ordering: Ordering) -> bool {
        matches!(
            (self, ordering),
            (CompareOp::Gt, Ordering::Greater)
                | (CompareOp::Lt, Ordering::Less)
                | (CompareOp::Eq, Ordering::Equal)
        )
    }
}

/// A sort column as it appears in ORDER BY and in comparisons: either the raw
/// column or `COALESCE(column, value)` when a coalesce value is configured.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnExpr {
    pub column: String,
    pub coalesce: Option<Value>,
}

impl ColumnExpr {
    pub fn new(column: impl Into<String>, coalesce: &NullCoalesceMap) -> Self {
        let column = column.into();
        let coalesce = coalesce.get(&column).cloned();
        Self { column, coalesce }
    }

    /// Value used for ordering. A null without a coalesce entry stays null,
    /// which orders below every other value.
    pub fn order_value<R: Record + ?Sized>(&self, record: &R) -> PaginationResult<Value> {
        match self.raw_value(record)? {
            Value::Null => Ok(self.coalesce.clone().unwrap_or(Value::Null)),
            value => Ok(value),
        }
    }

    /// Value used in a comparison. Comparing a raw null is undefined, so it
    /// is refused.
    pub fn compare_value<R: Record + ?Sized>(&self, record: &R) -> PaginationResult<Value> {
        match self.order_value(record)? {
            Value::Null => Err(PaginationError::UnsafeNullComparison {
                column: self.column.clone(),
            }),
            value => Ok(value),
        }
    }

    fn raw_value<R: Record + ?Sized>(&self, record: &R) -> PaginationResult<Value> {
        record
            .value(&self.column)
            .ok_or_else(|| PaginationError::MissingColumn {
                column: self.column.clone(),
            })
    }
}

/// Logical boundary condition over the sort columns.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Compare {
        column: ColumnExpr,
        op: CompareOp,
        value: Value,
    },
    And(Box<Predicate>, Box<Predicate>),
    Or(Box<Predicate>, Box<Predicate>),
}

impl Predicate {
    pub fn compare(column: ColumnExpr, op: CompareOp, value: Value) -> Self {
        Predicate::Compare { column, op, value }
    }

    pub fn and(self, other: Predicate) -> Self {
        Predicate::And(Box::new(self), Box::new(other))
    }

    pub fn or(self, other: Predicate) -> Self {
        Predicate::Or(Box::new(self), Box::new(other))
    }

    /// Builds the predicate selecting records strictly on the `boundary`
    /// side of `key` in the order of `spec`.
    ///
    /// For columns `c1..cN` with cursor values `v1..vN` this is the right fold
    ///
    /// ```text
    /// p_N = cN op_N vN
    /// p_k = ck op_k vk OR (ck = vk AND p_(k+1))
    /// ```
    ///
    /// where `op_k` is the strict operator of column k's direction.
    pub fn build(
        spec: &SortSpec,
        boundary: Boundary,
        key: &KeyTuple,
        coalesce: &NullCoalesceMap,
    ) -> PaginationResult<Self> {
        let terms = spec
            .iter()
            .map(|entry| {
                let value = key
                    .get(&entry.column)
                    .ok_or(PaginationError::InvalidCursor {
                        reason: "cursor does not match the sort columns",
                    })?;
                let column = ColumnExpr::new(entry.column.clone(), coalesce);

                if value.is_null() && column.coalesce.is_none() {
                    return Err(PaginationError::UnsafeNullComparison {
                        column: column.column,
                    });
                }

                Ok((column, CompareOp::strict(entry.direction, boundary), value.clone()))
            })
            .collect::<PaginationResult<Vec<_>>>()?;

        let mut terms = terms.into_iter().rev();
        let (column, op, value) = terms
            .next()
            .ok_or(PaginationError::MissingSortSpecification)?;

        Ok(terms.fold(
            Predicate::compare(column, op, value),
            |inner, (column, op, value)| {
                let strict = Predicate::compare(column.clone(), op, value.clone());
                let tie = Predicate::compare(column, CompareOp::Eq, value);
                strict.or(tie.and(inner))
            },
        ))
    }

    pub fn evaluate<R: Record + ?Sized>(&self, record: &R) -> PaginationResult<bool> {
        match self {
            Predicate::Compare { column, op, value } => {
                let actual = column.compare_value(record)?;
                Ok(op.matches(actual.total_cmp(value)))
            }
            Predicate::And(lhs, rhs) => Ok(lhs.evaluate(record)? && rhs.evaluate(record)?),
            Predicate::Or(lhs, rhs) => Ok(lhs.evaluate(record)? || rhs.evaluate(record)?),
        }
    }
}
