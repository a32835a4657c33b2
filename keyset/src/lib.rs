//! Keyset (seek) pagination over ordered record sets.
//!
//! A page is fetched by filtering on the sort-key values of the last record
//! seen instead of skipping an offset. [`paginate`] validates the request,
//! normalizes the sort specification into a total order, decodes the cursor
//! into a boundary predicate, and hands a bounded query to a caller-supplied
//! fetch function. The rows that come back are assembled into a [`Page`] of
//! edges and page info.

pub mod cursor;
pub mod error;
pub mod memory;
pub mod page;
pub mod paginate;
pub mod plan;
pub mod predicate;
pub mod request;
pub mod sort;
pub mod value;

pub use cursor::{CursorCodec, DigestCursorCodec, KeyTuple, NullCoalesceMap, PlainCursorCodec};
pub use error::{PaginationError, PaginationResult};
pub use memory::MemorySource;
pub use page::{assemble, Edge, Page, PageInfo};
pub use paginate::{paginate, OrderedSource, PaginationConfig};
pub use plan::{FetchPlan, OrderTerm};
pub use predicate::{Boundary, ColumnExpr, CompareOp, Predicate};
pub use request::{LimitKind, PageLimit, PageRequest, PageWindow, RequestShape};
pub use sort::{SortDirection, SortEntry, SortInput, SortSpec};
pub use value::{Record, Row, Value};
