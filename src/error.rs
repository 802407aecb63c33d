use thiserror::Error;

/// Failure of a single `load` call.
///
/// Every caller waiting on a key of a failed dispatch receives its own clone of the error, so
/// the type carries rendered messages instead of source errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
    /// The batch function returned a different number of values than it was given keys.
    #[error("batch function returned {actual} values for {expected} keys")]
    BatchLengthMismatch { expected: usize, actual: usize },

    /// The data file backing the row source could not be opened.
    #[error("row source unavailable: {0}")]
    RowSourceUnavailable(String),

    /// The row source was reachable but the lookup failed.
    #[error("row source query failed: {0}")]
    Query(String),

    /// The loader worker is gone (the owning request context was dropped).
    #[error("loader worker is no longer running")]
    LoaderClosed,
}

/// Errors raised by a [`crate::RowSource`] implementation.
#[derive(Debug, Error)]
pub enum RowSourceError {
    /// The data file is missing or cannot be opened.
    #[error("data file {path} unavailable: {message}")]
    Unavailable { path: String, message: String },

    /// The query itself failed.
    #[error("query failed: {0}")]
    Query(String),

    /// The blocking task running the query panicked or was cancelled.
    #[error("row source task failed: {0}")]
    Join(String),
}

impl From<rusqlite::Error> for RowSourceError {
    fn from(e: rusqlite::Error) -> Self {
        RowSourceError::Query(e.to_string())
    }
}

impl From<RowSourceError> for LoadError {
    fn from(e: RowSourceError) -> Self {
        match e {
            RowSourceError::Unavailable { .. } => LoadError::RowSourceUnavailable(e.to_string()),
            RowSourceError::Query(message) => LoadError::Query(message),
            RowSourceError::Join(message) => LoadError::Query(message),
        }
    }
}

/// Request-level failure of the resolution orchestrator.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// The data file could not be reached at any point of the request.
    #[error("row source unavailable: {0}")]
    RowSourceUnavailable(String),

    /// The root query of the request failed.
    #[error("root query failed: {0}")]
    RootQuery(#[source] RowSourceError),
}

impl From<RowSourceError> for ResolveError {
    fn from(e: RowSourceError) -> Self {
        match e {
            RowSourceError::Unavailable { .. } => ResolveError::RowSourceUnavailable(e.to_string()),
            other => ResolveError::RootQuery(other),
        }
    }
}

pub type LoadResult<V> = Result<V, LoadError>;
pub type RowSourceResult<T> = Result<T, RowSourceError>;
