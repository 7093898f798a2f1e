//! Caption merge-back: re-derive an indexed document from its stored
//! payload with caption text folded in.
//!
//! The payload is the raw post JSON exactly as fetched, so merging is a
//! pure re-projection: no network access, and re-merging with the same
//! caption set is idempotent.

use tantivy::TantivyDocument;
use tantivy::collector::TopDocs;
use tantivy::query::TermQuery;
use tantivy::schema::{IndexRecordOption, Term, Value as _};
use tantivy::Searcher;

use super::errors::{EnrichError, EnrichResult};
use crate::docbuild::DocumentBuilder;
use crate::index::{BlogWriter, IndexError};

/// Replace the document for `post_id` with one rebuilt from its stored
/// payload plus `captions`.
///
/// The searcher must come from a committed snapshot that contains the
/// post. Returns `false` when the post is not in the snapshot (deleted,
/// or never committed); the caption stays in the side-store and applies
/// on the next full rebuild.
pub fn merge_into_post(
    writer: &mut BlogWriter,
    searcher: &Searcher,
    builder: &DocumentBuilder,
    post_id: u64,
    captions: &[String],
) -> EnrichResult<bool> {
    let id_term = format!("Q{post_id}");
    let query = TermQuery::new(
        Term::from_field_text(writer.schema().id, &id_term),
        IndexRecordOption::Basic,
    );
    let top = searcher
        .search(&query, &TopDocs::with_limit(1))
        .map_err(IndexError::from)?;
    let Some((_, address)) = top.first() else {
        tracing::debug!(post_id, "post not in committed snapshot; caption deferred");
        return Ok(false);
    };

    let stored: TantivyDocument = searcher.doc(*address).map_err(IndexError::from)?;
    let payload = stored
        .get_first(writer.schema().payload)
        .and_then(|v| v.as_str())
        .ok_or_else(|| IndexError::DocumentNotFound(id_term.clone()))?;
    let raw: serde_json::Value = serde_json::from_str(payload).map_err(EnrichError::Payload)?;

    let built = builder.build_with_captions(&raw, captions)?;
    writer.replace(&built.id_term, built.doc)?;
    Ok(true)
}
