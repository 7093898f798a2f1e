//! Rebuild engine: re-derive every document in a blog's index from its
//! stored payload.
//!
//! Indexed terms are a deterministic function of the payload, so a
//! rebuild after a document-builder change needs no remote fetches: walk
//! the committed snapshot in pages, re-run each payload through the
//! builder, and replace each document under its own id term. Media flows
//! through the enrichment queue per page, which also restores caption
//! terms the replacement just wiped.

use tantivy::TantivyDocument;
use tantivy::collector::TopDocs;
use tantivy::query::AllQuery;
use tantivy::schema::Value as _;
use tantivy::SegmentReader;

use crate::config::AppConfig;
use crate::crawl::{CrawlError, CrawlResult};
use crate::docbuild::{DocumentBuilder, MediaBatch};
use crate::enrich::EnrichmentQueue;
use crate::index::{BlogWriter, IndexError, IndexOptions};

/// Documents re-projected per page. Bounds memory on large blogs.
const PAGE_SIZE: usize = 1_000;

/// What a rebuild did.
#[derive(Debug, Clone, Copy, Default)]
pub struct RebuildReport {
    pub rebuilt: u64,
    pub pages: u64,
}

/// Rebuilds blogs in place from stored payloads.
pub struct RebuildEngine {
    config: AppConfig,
    queue: Option<EnrichmentQueue>,
}

impl RebuildEngine {
    #[must_use]
    pub fn new(config: AppConfig, queue: Option<EnrichmentQueue>) -> Self {
        Self { config, queue }
    }

    /// Rebuild every document of `blog`. A no-op on an empty index.
    pub async fn run(&self, blog: &str, options: &IndexOptions) -> CrawlResult<RebuildReport> {
        let mut writer = BlogWriter::open(self.config.data_dir(), blog, options)?;
        let builder = DocumentBuilder::new(writer.schema().clone());

        // One snapshot for the whole walk: replacements go to new
        // segments and never shift the pages still to be read.
        let searcher = writer.reader()?.searcher();
        let total = searcher.num_docs();
        if total == 0 {
            tracing::info!(blog, "index empty, nothing to rebuild");
            return Ok(RebuildReport::default());
        }
        tracing::info!(blog, total, "rebuilding index from stored payloads");

        let payload_field = writer.schema().payload;
        let mut report = RebuildReport::default();
        let mut offset = 0usize;

        loop {
            let page = newest_page(&searcher, offset)?;
            if page.is_empty() {
                break;
            }
            report.pages += 1;
            offset += page.len();

            let mut media = MediaBatch::new();
            for address in page {
                let stored: TantivyDocument = searcher.doc(address).map_err(IndexError::from)?;
                let Some(payload) = stored.get_first(payload_field).and_then(|v| v.as_str())
                else {
                    continue;
                };
                let raw: serde_json::Value =
                    serde_json::from_str(payload).map_err(IndexError::Payload)?;
                let built = builder.build(&raw)?;
                writer.replace(&built.id_term, built.doc)?;
                media.absorb(built.media);
                report.rebuilt += 1;
            }

            // Payloads are unchanged in the old snapshot, so ingest may
            // run before the commit; the merge rewrites replaced docs
            // with captions restored, and the commit publishes both.
            if let Some(queue) = &self.queue
                && !media.is_empty()
            {
                let now = chrono::Utc::now().timestamp();
                queue.ingest(&mut writer, &builder, &mut media, now).await?;
            }
            writer.commit()?;
        }

        tracing::info!(blog, rebuilt = report.rebuilt, pages = report.pages, "rebuild finished");
        Ok(report)
    }
}

/// One page of the snapshot in stable newest-first timestamp order.
fn newest_page(
    searcher: &tantivy::Searcher,
    offset: usize,
) -> CrawlResult<Vec<tantivy::DocAddress>> {
    let top = TopDocs::with_limit(PAGE_SIZE)
        .and_offset(offset)
        .custom_score(|segment_reader: &SegmentReader| {
            let col: Option<tantivy::columnar::Column<f64>> = segment_reader
                .fast_fields()
                .column_opt("timestamp")
                .ok()
                .flatten();
            move |doc_id: tantivy::DocId| {
                col.as_ref()
                    .and_then(|c| c.first(doc_id))
                    .unwrap_or(f64::MIN)
            }
        });

    let hits = searcher
        .search(&AllQuery, &top)
        .map_err(|e| CrawlError::Index(IndexError::from(e)))?;
    Ok(hits.into_iter().map(|(_, address)| address).collect())
}
