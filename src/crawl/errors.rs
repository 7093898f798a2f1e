//! Error types for crawl and rebuild runs.

use thiserror::Error;

use crate::docbuild::BuildError;
use crate::enrich::EnrichError;
use crate::index::IndexError;

/// Result type alias for crawl operations.
pub type CrawlResult<T> = Result<T, CrawlError>;

/// Error types for a synchronization run.
///
/// Transport failures are fatal to the current invocation but safe to
/// resume later: the cursor is reconstructed from committed index
/// contents, never from in-memory state.
#[derive(Debug, Error)]
pub enum CrawlError {
    /// No API credential configured. Checked before any fetch.
    #[error("no API credential configured")]
    MissingCredential,

    /// Remote API unreachable or rejected the request.
    #[error("remote API error: {0}")]
    Transport(String),

    /// The remote response lacked fields the crawl cannot proceed without.
    #[error("malformed remote response: {0}")]
    Malformed(String),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error(transparent)]
    Enrich(#[from] EnrichError),
}

impl From<reqwest::Error> for CrawlError {
    fn from(error: reqwest::Error) -> Self {
        CrawlError::Transport(error.to_string())
    }
}
