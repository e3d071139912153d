//! Error taxonomy for the catalog core.
//!
//! Refresh-time errors (`SourceUnavailable`, `MalformedFeature`,
//! `DimensionMismatch`, `InsufficientData`, `SchemaMismatch`) abort the
//! refresh and leave the previously published generation untouched.
//! Query-time errors (`EmptyCatalog`, `PageNotFound`, `IndexOutOfRange`,
//! `InvalidQuery`) are caller-input problems and never mutate state.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CatalogError {
    /// The dataset source could not be fetched.
    #[error("dataset source unavailable: {0}")]
    SourceUnavailable(String),

    /// The embedding provider failed or is not configured.
    #[error("embedding provider unavailable: {0}")]
    EmbeddingUnavailable(String),

    /// A column value does not match the shape the tag extractor expects.
    /// Indicates upstream schema drift, so it is surfaced rather than
    /// silently producing garbage tags.
    #[error("malformed value {value:?} in column {column:?}")]
    MalformedFeature { column: String, value: String },

    /// A record's key set differs from the rest of the batch.
    #[error("record {row} is missing column {column:?}")]
    SchemaMismatch { row: usize, column: String },

    /// An embedding vector's dimensionality differs from the batch.
    #[error("embedding dimension mismatch at row {row}: expected {expected}, got {found}")]
    DimensionMismatch {
        row: usize,
        expected: usize,
        found: usize,
    },

    /// The batch is too small for reduction or clustering.
    #[error("not enough records: need at least {needed}, got {got}")]
    InsufficientData { needed: usize, got: usize },

    /// No generation has ever been published.
    #[error("catalog is empty, run a refresh first")]
    EmptyCatalog,

    /// The requested page slice is empty.
    #[error("page {page} not found")]
    PageNotFound { page: usize },

    /// The requested record index is outside `[1, len]`.
    #[error("index {index} is out of range, expected between 1 and {len}")]
    IndexOutOfRange { index: usize, len: usize },

    /// The filter expression failed to parse or referenced a missing column.
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// A refresh is already running; at most one may be in flight.
    #[error("a refresh is already in flight")]
    RefreshInFlight,

    /// Cache store failure (I/O, SQLite, serialization).
    #[error("cache store error: {0}")]
    Store(#[from] anyhow::Error),
}
