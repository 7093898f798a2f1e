//! Crawl engine: synchronizes one blog's remote post stream into its
//! local index.
//!
//! Sync walks the stream newest-first with a `before` timestamp cursor and
//! stops when it reaches posts already indexed. Progress is durable at
//! every commit: a crash or transport failure loses at most the pages
//! since the last commit, and the next run reconstructs its cursor from
//! the committed index rather than any saved state.

mod budget;
mod errors;
mod source;

pub use budget::{CrawlPlan, RateBudget};
pub use errors::{CrawlError, CrawlResult};
pub use source::{BlogInfo, PostPage, PostSource, RemoteClient};

use std::time::Duration;

use tantivy::tokenizer::Language;

use crate::config::AppConfig;
use crate::docbuild::{DocumentBuilder, MediaBatch};
use crate::enrich::EnrichmentQueue;
use crate::index::{BlogWriter, IndexOptions};

/// Options for one synchronization run.
#[derive(Debug, Clone, Default)]
pub struct CrawlOptions {
    /// Only index posts published after this instant. Defaults to the
    /// newest committed timestamp (incremental sync).
    pub since: Option<i64>,
    /// Only index posts published before this instant; used to resume an
    /// interrupted backfill from a known point.
    pub until: Option<i64>,
    /// Walk the entire stream even if the index is non-empty. Re-indexing
    /// is replace-by-id, so this repairs as well as backfills.
    pub full: bool,
    /// Re-index exactly these posts instead of walking the stream.
    pub post_ids: Vec<u64>,
    /// Override the configured throttle default.
    pub throttle: Option<bool>,
    /// Stemming mode for the index's text analyzer.
    pub stemming: Option<Language>,
}

/// What a synchronization run did.
#[derive(Debug, Clone, Copy, Default)]
pub struct CrawlReport {
    /// Documents written (new or replaced).
    pub indexed: u64,
    /// Remote pages fetched.
    pub pages: u64,
    /// True when the remote reported no changes since the cursor and the
    /// run ended after the single metadata request.
    pub unchanged: bool,
    /// Pacing estimate for a full crawl, logged up front.
    pub estimated_duration: Option<Duration>,
}

/// Synchronizes blogs from a [`PostSource`] into per-blog indexes.
pub struct CrawlEngine<S> {
    config: AppConfig,
    source: S,
    queue: Option<EnrichmentQueue>,
}

impl<S: PostSource> CrawlEngine<S> {
    #[must_use]
    pub fn new(config: AppConfig, source: S, queue: Option<EnrichmentQueue>) -> Self {
        Self {
            config,
            source,
            queue,
        }
    }

    #[must_use]
    pub fn source(&self) -> &S {
        &self.source
    }

    /// Run one synchronization of `blog`.
    pub async fn run(&self, blog: &str, options: &CrawlOptions) -> CrawlResult<CrawlReport> {
        let index_options = IndexOptions {
            stemming: options.stemming,
        };
        let mut writer = BlogWriter::open(self.config.data_dir(), blog, &index_options)?;
        let builder = DocumentBuilder::new(writer.schema().clone());

        if !options.post_ids.is_empty() {
            return self
                .reindex_posts(&mut writer, &builder, blog, &options.post_ids)
                .await;
        }

        let full = options.full || writer.doc_count()? == 0;
        let since = if full {
            options.since
        } else {
            match options.since {
                Some(since) => Some(since),
                None => writer.latest_timestamp()?.map(|t| t as i64),
            }
        };

        let info = self.source.blog_info(blog).await?;

        // Nothing changed since the cursor: done after one request.
        if let Some(since) = since
            && info.updated <= since
        {
            tracing::info!(blog, since, updated = info.updated, "blog unchanged, skipping");
            return Ok(CrawlReport {
                unchanged: true,
                ..CrawlReport::default()
            });
        }

        let budget = RateBudget::from_config(&self.config);
        let (delay, estimated_duration) = if full {
            let plan = budget.plan_full(info.post_count, self.config.page_size());
            tracing::info!(
                blog,
                estimated_pages = plan.estimated_pages,
                estimated_secs = plan.estimated_duration.as_secs(),
                "planned full crawl"
            );
            (plan.delay, Some(plan.estimated_duration))
        } else {
            (budget.incremental_delay(), None)
        };
        let throttle = options.throttle.unwrap_or(self.config.throttle());

        let mut report = CrawlReport {
            estimated_duration,
            ..CrawlReport::default()
        };
        let mut media = MediaBatch::new();
        let mut cursor = options.until;
        let mut pages_since_commit = 0u32;

        'pages: loop {
            let page = self.source.page(blog, cursor).await?;
            if page.posts.is_empty() {
                break;
            }
            report.pages += 1;
            pages_since_commit += 1;

            for raw in &page.posts {
                let built = builder.build(raw)?;
                if let Some(since) = since
                    && built.timestamp <= since as f64
                {
                    // Everything older is already indexed.
                    break 'pages;
                }
                cursor = Some(built.timestamp as i64);
                writer.replace(&built.id_term, built.doc)?;
                media.absorb(built.media);
                report.indexed += 1;
            }

            if !page.has_next {
                break;
            }
            if pages_since_commit >= self.config.commit_every_pages() {
                self.flush(&mut writer, &builder, &mut media).await?;
                pages_since_commit = 0;
                tracing::info!(
                    blog,
                    pages = report.pages,
                    indexed = report.indexed,
                    "crawl checkpoint"
                );
            }
            if throttle {
                tokio::time::sleep(delay).await;
            }
        }

        self.flush(&mut writer, &builder, &mut media).await?;
        tracing::info!(
            blog,
            pages = report.pages,
            indexed = report.indexed,
            "crawl finished"
        );
        Ok(report)
    }

    /// Targeted re-index of specific posts, for repairing individual
    /// documents without a stream walk.
    async fn reindex_posts(
        &self,
        writer: &mut BlogWriter,
        builder: &DocumentBuilder,
        blog: &str,
        ids: &[u64],
    ) -> CrawlResult<CrawlReport> {
        let posts = self.source.posts_by_id(blog, ids).await?;
        let mut media = MediaBatch::new();
        let mut report = CrawlReport::default();
        for raw in &posts {
            let built = builder.build(raw)?;
            writer.replace(&built.id_term, built.doc)?;
            media.absorb(built.media);
            report.indexed += 1;
        }
        self.flush(writer, builder, &mut media).await?;
        tracing::info!(blog, requested = ids.len(), indexed = report.indexed, "re-indexed posts");
        Ok(report)
    }

    /// Commit indexed documents, then hand their media to the enrichment
    /// queue. Commit order matters: caption merge reads stored payloads
    /// through a committed snapshot, so the posts must land first. Merges
    /// are published with a second commit.
    async fn flush(
        &self,
        writer: &mut BlogWriter,
        builder: &DocumentBuilder,
        media: &mut MediaBatch,
    ) -> CrawlResult<()> {
        writer.commit()?;
        if let Some(queue) = &self.queue
            && !media.is_empty()
        {
            let now = chrono::Utc::now().timestamp();
            let merged = queue.ingest(writer, builder, media, now).await?;
            if merged > 0 {
                writer.commit()?;
            }
        }
        Ok(())
    }
}
