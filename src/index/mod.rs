//! Index engine adapter.
//!
//! Wraps the lifecycle of per-blog tantivy indexes: open-for-read,
//! open/create-for-write, staleness probing, explicit commit. The engine
//! itself (inverted index, term matching, fast columns) is consumed as an
//! external capability; this module only designs the schema and handle
//! semantics that sit on top of it.

pub mod errors;
pub mod handle;
pub mod schema;

pub use errors::{IndexError, IndexResult};
pub use handle::{BlogReader, BlogWriter, IndexOptions, index_dir};
pub use schema::{MAX_TERM_BYTES, PostSchema, TEXT_ANALYZER};
