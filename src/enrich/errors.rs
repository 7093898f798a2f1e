//! Error types for the image enrichment queue.

use thiserror::Error;

use crate::docbuild::BuildError;
use crate::index::IndexError;

/// Result type alias for enrichment operations.
pub type EnrichResult<T> = Result<T, EnrichError>;

/// Error types for the caption side-store, merge-back, and worker.
#[derive(Debug, Error)]
pub enum EnrichError {
    /// Relational side-store failure.
    #[error("caption store error: {0}")]
    Store(#[from] sqlx::Error),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error(transparent)]
    Build(#[from] BuildError),

    /// A stored payload failed to decode during caption merge.
    #[error("stored payload is not valid JSON: {0}")]
    Payload(#[from] serde_json::Error),

    /// Media download failure inside the captioning worker.
    #[error("media download failed: {0}")]
    Download(String),
}
