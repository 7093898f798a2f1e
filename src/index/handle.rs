//! Read and write handle lifecycle for per-blog indexes.
//!
//! The external engine enforces at most one writer per index; a second
//! concurrent open surfaces as [`IndexError::Locked`]. Readers run
//! concurrently with a writer but see a point-in-time snapshot; a handle
//! that must observe newer commits calls [`BlogReader::refresh_if_stale`].

use std::path::{Path, PathBuf};

use tantivy::collector::TopDocs;
use tantivy::directory::MmapDirectory;
use tantivy::query::AllQuery;
use tantivy::schema::Term;
use tantivy::tokenizer::Language;
use tantivy::{
    Index, IndexReader, IndexWriter, ReloadPolicy, Searcher, SegmentReader, TantivyDocument,
};

use super::errors::{IndexError, IndexResult};
use super::schema::PostSchema;

/// Default tantivy writer heap.
const WRITER_MEMORY_BYTES: usize = 50_000_000;

/// Options applied when opening a handle.
#[derive(Debug, Clone, Default)]
pub struct IndexOptions {
    /// Stemmer for the free-text analyzer. Must match the mode the index
    /// was written with for query terms to line up with indexed terms.
    pub stemming: Option<Language>,
}

/// Exclusive write handle for one blog's index.
pub struct BlogWriter {
    blog: String,
    index: Index,
    writer: IndexWriter,
    schema: PostSchema,
}

impl BlogWriter {
    /// Open (creating if missing) the blog's index for writing.
    ///
    /// Fails with [`IndexError::Locked`] when another writer holds the
    /// lock; callers treat that as retryable-later, not fatal-forever.
    pub fn open(data_dir: &Path, blog: &str, options: &IndexOptions) -> IndexResult<Self> {
        let (index, schema) = open_index(data_dir, blog, options)?;
        let writer = index
            .writer(WRITER_MEMORY_BYTES)
            .map_err(|e| IndexError::from(e).for_blog(blog))?;

        Ok(Self {
            blog: blog.to_string(),
            index,
            writer,
            schema,
        })
    }

    #[must_use]
    pub fn blog(&self) -> &str {
        &self.blog
    }

    #[must_use]
    pub fn schema(&self) -> &PostSchema {
        &self.schema
    }

    /// Replace-by-id-term: deletes any previous document carrying the same
    /// id term, then adds the new one. Re-applying the same post is
    /// idempotent and never duplicates documents.
    pub fn replace(&mut self, id_term: &str, doc: TantivyDocument) -> IndexResult<()> {
        self.writer
            .delete_term(Term::from_field_text(self.schema.id, id_term));
        self.writer.add_document(doc)?;
        Ok(())
    }

    /// Make all writes so far visible to (re)opened readers.
    pub fn commit(&mut self) -> IndexResult<()> {
        self.writer.commit()?;
        tracing::debug!(blog = %self.blog, "index commit completed");
        Ok(())
    }

    /// Fresh point-in-time reader over the committed state of this index.
    pub fn reader(&self) -> IndexResult<IndexReader> {
        Ok(self.index.reader()?)
    }

    /// Committed document count.
    pub fn doc_count(&self) -> IndexResult<u64> {
        Ok(self.reader()?.searcher().num_docs())
    }

    /// Publish timestamp of the newest committed document, the crawl
    /// cursor. `None` on an empty index.
    pub fn latest_timestamp(&self) -> IndexResult<Option<f64>> {
        end_timestamp(&self.reader()?.searcher(), true)
    }
}

/// Read handle for one blog's index. May be held while a writer commits;
/// the snapshot goes stale rather than failing.
pub struct BlogReader {
    blog: String,
    index: Index,
    reader: IndexReader,
    schema: PostSchema,
}

impl BlogReader {
    /// Open the blog's index for reading, creating an empty index if none
    /// exists yet (a query against a never-crawled blog is not an error).
    pub fn open(data_dir: &Path, blog: &str, options: &IndexOptions) -> IndexResult<Self> {
        let (index, schema) = open_index(data_dir, blog, options)?;
        // The snapshot stays pinned until `refresh_if_stale`; concurrent
        // commits never shift results mid-query.
        let reader: IndexReader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()?;
        Ok(Self {
            blog: blog.to_string(),
            index,
            reader,
            schema,
        })
    }

    #[must_use]
    pub fn blog(&self) -> &str {
        &self.blog
    }

    #[must_use]
    pub fn schema(&self) -> &PostSchema {
        &self.schema
    }

    #[must_use]
    pub fn index(&self) -> &Index {
        &self.index
    }

    #[must_use]
    pub fn searcher(&self) -> Searcher {
        self.reader.searcher()
    }

    /// Advance the snapshot to the latest committed state. A failure here
    /// means the handle cannot be refreshed in place and must be reopened
    /// from scratch.
    pub fn refresh_if_stale(&self) -> IndexResult<()> {
        self.reader.reload().map_err(|e| {
            tracing::warn!(blog = %self.blog, error = %e, "reader reload failed");
            IndexError::NeedsReopen {
                blog: self.blog.clone(),
            }
        })
    }

    pub fn doc_count(&self) -> u64 {
        self.reader.searcher().num_docs()
    }

    /// Publish timestamp of the newest document in the snapshot.
    pub fn latest_timestamp(&self) -> IndexResult<Option<f64>> {
        end_timestamp(&self.searcher(), true)
    }

    /// Publish timestamp of the oldest document in the snapshot.
    pub fn earliest_timestamp(&self) -> IndexResult<Option<f64>> {
        end_timestamp(&self.searcher(), false)
    }
}

/// Filesystem location of one blog's index.
#[must_use]
pub fn index_dir(data_dir: &Path, blog: &str) -> PathBuf {
    data_dir.join(blog)
}

fn open_index(
    data_dir: &Path,
    blog: &str,
    options: &IndexOptions,
) -> IndexResult<(Index, PostSchema)> {
    let dir = index_dir(data_dir, blog);
    std::fs::create_dir_all(&dir)?;

    let schema = PostSchema::build();
    let mmap = MmapDirectory::open(&dir).map_err(|e| IndexError::Open {
        path: dir.display().to_string(),
        reason: e.to_string(),
    })?;
    let index = Index::open_or_create(mmap, schema.schema.clone())
        .map_err(|e| IndexError::from(e).for_blog(blog))?;
    PostSchema::register_analyzers(index.tokenizers(), options.stemming);

    Ok((index, schema))
}

/// Timestamp at either end of the index: newest when `newest` is true,
/// oldest otherwise. Drives the crawl cursor reconstruction.
fn end_timestamp(searcher: &Searcher, newest: bool) -> IndexResult<Option<f64>> {
    if searcher.num_docs() == 0 {
        return Ok(None);
    }

    let collector =
        TopDocs::with_limit(1).custom_score(move |segment_reader: &SegmentReader| {
            let col: Option<tantivy::columnar::Column<f64>> = segment_reader
                .fast_fields()
                .column_opt("timestamp")
                .ok()
                .flatten();
            move |doc_id: tantivy::DocId| {
                let missing = if newest { f64::MIN } else { f64::MAX };
                let value = col
                    .as_ref()
                    .and_then(|c| c.first(doc_id))
                    .unwrap_or(missing);
                if newest { value } else { -value }
            }
        });

    let top = searcher.search(&AllQuery, &collector)?;
    Ok(top
        .first()
        .map(|(score, _)| if newest { *score } else { -*score }))
}
