//! Error types for query parsing and execution.

use thiserror::Error;

use crate::index::IndexError;

/// Result type alias for query operations.
pub type QueryResult<T> = Result<T, QueryError>;

/// Error types for the query translator.
///
/// Parse failures are structured results, not crashes: the caller prints
/// them (or retries with corrected input) and treats the match set as
/// empty.
#[derive(Debug, Error)]
pub enum QueryError {
    /// A date bound could not be interpreted.
    #[error("unparseable date expression: '{0}'")]
    Date(String),

    /// The query text itself is malformed.
    #[error("malformed query: {0}")]
    Parse(String),

    #[error(transparent)]
    Index(#[from] IndexError),
}

impl QueryError {
    /// Whether this error came from user input rather than the engine.
    #[must_use]
    pub fn is_parse_error(&self) -> bool {
        matches!(self, QueryError::Date(_) | QueryError::Parse(_))
    }
}
