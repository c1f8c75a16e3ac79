use thiserror::Error;

/// Invalid call contracts. Sparse or missing data is never an error; it
/// degrades to absent values and empty lists instead.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("top_n must be non-negative, got {0}")]
    InvalidTopN(i64),

    #[error("unknown metric: {0}")]
    UnknownMetric(String),

    #[error("unknown dimension: {0}")]
    UnknownDimension(String),

    #[error("granularity must be one of: week, month")]
    UnknownGranularity(String),

    #[error("reference must be one of: latest, complete, all_time")]
    UnknownReference(String),

    #[error("invalid period {0} (expected YYYY-MM-DD)")]
    InvalidPeriod(String),
}
