//! Error types for the index engine adapter.

use tantivy::TantivyError;
use thiserror::Error;

/// Result type alias for index adapter operations.
pub type IndexResult<T> = Result<T, IndexError>;

/// Error types for index handle lifecycle and document operations.
#[derive(Debug, Error)]
pub enum IndexError {
    /// Another process holds the write lock for this blog's index.
    /// Retryable by a later invocation, fatal to the current one.
    #[error("index for '{blog}' is locked by another writer")]
    Locked { blog: String },

    /// A cached read handle no longer reflects committed writes and
    /// must be reopened before serving further queries.
    #[error("read handle for '{blog}' is stale and needs reopening")]
    NeedsReopen { blog: String },

    /// Opening or creating the index directory failed.
    #[error("failed to open index at {path}: {reason}")]
    Open { path: String, reason: String },

    /// Lookup by internal id failed; the document may have been replaced
    /// or removed concurrently.
    #[error("document not found: {0}")]
    DocumentNotFound(String),

    /// The stored payload could not be decoded back into post JSON.
    #[error("stored payload is not valid JSON: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("index engine error: {0}")]
    Tantivy(TantivyError),
}

impl From<TantivyError> for IndexError {
    fn from(error: TantivyError) -> Self {
        match error {
            TantivyError::LockFailure(_, _) => IndexError::Locked {
                blog: String::new(),
            },
            other => IndexError::Tantivy(other),
        }
    }
}

impl IndexError {
    /// Lock contention is safe to retry once the competing writer is done.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            IndexError::Locked { .. } | IndexError::NeedsReopen { .. }
        )
    }

    /// Attach the blog name to errors raised below the handle layer.
    #[must_use]
    pub(crate) fn for_blog(self, blog: &str) -> Self {
        match self {
            IndexError::Locked { .. } => IndexError::Locked {
                blog: blog.to_string(),
            },
            other => other,
        }
    }
}
