/// Error type for pagination requests
#[derive(Debug, thiserror::Error)]
pub enum PaginationError {
    #[error("`{first}` and `{second}` cannot be used together")]
    ConflictingPageArguments {
        first: &'static str,
        second: &'static str,
    },

    #[error("`{argument}` must be a positive integer, got {value}")]
    InvalidLimit { argument: &'static str, value: i64 },

    #[error("one of `first` or `last` must be provided")]
    MissingPageDirection,

    #[error("invalid sort entry: {reason}")]
    InvalidSortEntry { reason: String },

    #[error("a sort specification or a unique column is required")]
    MissingSortSpecification,

    /// The reason is a fixed description; cursor contents are never echoed.
    #[error("invalid cursor: {reason}")]
    InvalidCursor { reason: &'static str },

    #[error("unsupported query shape: {reason}")]
    UnsupportedQueryShape { reason: String },

    #[error("column `{column}` would be compared against NULL; configure a coalesce value for it")]
    UnsafeNullComparison { column: String },

    #[error("record has no value for sort column `{column}`")]
    MissingColumn { column: String },

    #[error("cursor could not be encoded: {reason}")]
    Encode { reason: String },

    #[error("fetch failed: {source}")]
    Fetch {
        #[from]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl PaginationError {
    /// Wrap a backend failure raised while fetching rows.
    pub fn fetch<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Fetch {
            source: Box::new(err),
        }
    }

    pub(crate) fn invalid_cursor(reason: &'static str) -> Self {
        Self::InvalidCursor { reason }
    }

    /// Whether the caller can recover by fixing the request itself.
    pub fn is_request_error(&self) -> bool {
        matches!(
            self,
            Self::ConflictingPageArguments { .. }
                | Self::InvalidLimit { .. }
                | Self::MissingPageDirection
                | Self::InvalidSortEntry { .. }
                | Self::MissingSortSpecification
                | Self::InvalidCursor { .. }
        )
    }
}

pub type PaginationResult<T> = Result<T, PaginationError>;
