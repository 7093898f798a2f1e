//! Local full-text mirror of remote blogs.
//!
//! Each blog syncs into its own on-disk index via the crawl engine;
//! documents carry exact boolean terms, analyzed free text, a sortable
//! publish timestamp, and the verbatim post JSON as payload. The query
//! translator exposes a small search language over those fields, and the
//! enrichment queue folds machine-generated image captions back into
//! already-indexed documents.

pub mod config;
pub mod crawl;
pub mod docbuild;
pub mod enrich;
pub mod index;
pub mod post;
pub mod query;
pub mod rebuild;

pub use config::{AppConfig, AppConfigBuilder};
pub use crawl::{CrawlEngine, CrawlOptions, CrawlReport, PostSource, RemoteClient};
pub use docbuild::{DocumentBuilder, MediaBatch, encode_tag};
pub use enrich::{CaptionStore, CaptionWorker, Captioner, EnrichmentQueue};
pub use index::{BlogReader, BlogWriter, IndexOptions, index_dir};
pub use query::{SearchRequest, SearchResponse, SortOrder, search};
pub use rebuild::{RebuildEngine, RebuildReport};
