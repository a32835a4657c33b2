use crate::{ColumnExpr, NullCoalesceMap, PageLimit, SortDirection, SortSpec};

/// One ORDER BY term of the physical fetch
#[derive(Debug, Clone, PartialEq)]
pub struct OrderTerm {
    pub column: ColumnExpr,
    pub direction: SortDirection,
}

/// Physical fetch order and limit for one page.
///
/// Backward pages (`last`) are fetched in the flipped order so a single
/// bounded read returns the rows closest to the cursor; `reverse` tells the
/// assembler to restore the logical order afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchPlan {
    pub order: SortSpec,
    /// Requested page size
    pub count: usize,
    /// Page size plus one lookahead row
    pub limit: usize,
    pub reverse: bool,
}

impl FetchPlan {
    pub fn new(spec: &SortSpec, limit: PageLimit) -> Self {
        let reverse = limit.is_backward();
        let order = if reverse { spec.flipped() } else { spec.clone() };
        let count = limit.count();

        Self {
            order,
            count,
            limit: count.saturating_add(1),
            reverse,
        }
    }

    pub fn order_terms(&self, coalesce: &NullCoalesceMap) -> Vec<OrderTerm> {
        self.order
            .iter()
            .map(|entry| OrderTerm {
                column: ColumnExpr::new(entry.column.clone(), coalesce),
                direction: entry.direction,
            })
            .collect()
    }
}
