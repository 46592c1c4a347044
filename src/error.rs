use thiserror::Error;

/// Domain errors raised by the engine and the service layer.
///
/// Sparse or missing data is never an error here: those cases resolve to
/// sentinel values inside the engine. Everything below is either a caller
/// bug or a lookup that named something that does not exist.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SnowballError {
    #[error("{code}: series {field} present but last_year_index is missing")]
    MissingAnchor { code: String, field: String },

    #[error("stock not found: {0}")]
    StockNotFound(String),

    #[error("filter not found: {0}")]
    FilterNotFound(i64),

    #[error("filter {filter_id} has no option {option_id}")]
    FilterOptionNotFound { filter_id: i64, option_id: u32 },

    #[error("unknown filter option key: {0}")]
    UnknownFilterKey(String),

    #[error("unknown rank option key: {0}")]
    UnknownRankKey(String),

    #[error("unknown year series: {0}")]
    UnknownSeries(String),

    #[error("invalid document patch: {0}")]
    InvalidPatch(String),
}

pub type EngineResult<T> = std::result::Result<T, SnowballError>;
