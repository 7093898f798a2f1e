//! The enrichment queue: media intake during crawls, work distribution to
//! captioning workers, and caption merge-back into blog indexes.

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::path::PathBuf;

use super::errors::EnrichResult;
use super::merge::merge_into_post;
use super::store::{AcceptOutcome, CaptionResult, CaptionStore, OfferBatch, QueueStats};
use crate::config::AppConfig;
use crate::docbuild::{DocumentBuilder, MediaBatch};
use crate::index::{BlogWriter, IndexError, IndexOptions};

/// Outcome of one accept call.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptReport {
    /// Captions applied to the side-store.
    pub captioned: u64,
    /// Images marked terminally uncaptionable.
    pub failed: u64,
    /// Late or duplicate submissions that changed nothing.
    pub dropped: u64,
    /// Documents rewritten with new caption text.
    pub merged_posts: u64,
    /// Blogs whose merge was deferred because their index was locked.
    pub deferred_blogs: u64,
}

/// Coordinates the caption side-store with per-blog indexes.
pub struct EnrichmentQueue {
    store: CaptionStore,
    data_dir: PathBuf,
    index_options: IndexOptions,
    batch_size: u32,
    lease_secs: u64,
}

impl EnrichmentQueue {
    #[must_use]
    pub fn new(store: CaptionStore, config: &AppConfig, index_options: IndexOptions) -> Self {
        Self {
            store,
            data_dir: config.data_dir().to_path_buf(),
            index_options,
            batch_size: config.caption_batch_size(),
            lease_secs: config.caption_lease_secs(),
        }
    }

    #[must_use]
    pub fn store(&self) -> &CaptionStore {
        &self.store
    }

    /// Register a crawl batch's media with the side-store and merge any
    /// already-known captions into the referencing documents.
    ///
    /// The caller's writer must have committed the batch's posts first:
    /// merge reads stored payloads through a committed snapshot. The
    /// caller commits again afterwards to publish the merges.
    pub async fn ingest(
        &self,
        writer: &mut BlogWriter,
        builder: &DocumentBuilder,
        batch: &mut MediaBatch,
        now: i64,
    ) -> EnrichResult<u64> {
        if batch.is_empty() {
            return Ok(0);
        }
        let entries = batch.drain();
        let blog = writer.blog().to_string();
        let captioned = self.store.ingest(&blog, &entries, now).await?;
        tracing::info!(
            blog = %blog,
            images = entries.len(),
            already_captioned = captioned.len(),
            "registered media batch"
        );

        if captioned.is_empty() {
            return Ok(0);
        }

        // Merge the post's full caption set, not just the new image's:
        // a rebuilt document may have lost captions from earlier merges.
        let mut affected: BTreeSet<u64> = BTreeSet::new();
        for image in &captioned {
            affected.extend(image.post_ids.iter().copied());
        }

        let searcher = writer.reader()?.searcher();
        let mut merged = 0;
        for post_id in affected {
            let captions = self.store.caption_texts_for_post(&blog, post_id).await?;
            if merge_into_post(writer, &searcher, builder, post_id, &captions)? {
                merged += 1;
            }
        }
        Ok(merged)
    }

    /// Lease a batch of uncaptioned images to `agent`.
    pub async fn offer(&self, agent: &str, now: i64) -> EnrichResult<OfferBatch> {
        self.store
            .offer(agent, self.batch_size, self.lease_secs, now)
            .await
    }

    /// Apply a worker's caption results and fold the new captions into
    /// every referencing document.
    ///
    /// A blog whose index is write-locked is skipped, not failed: the
    /// caption is durable in the side-store and reaches the index on the
    /// next ingest or rebuild touching those posts.
    pub async fn accept(
        &self,
        results: &[CaptionResult],
        now: i64,
    ) -> EnrichResult<AcceptReport> {
        let mut report = AcceptReport::default();

        // blog -> post ids needing a caption re-merge
        let mut pending: BTreeMap<String, BTreeSet<u64>> = BTreeMap::new();
        for result in results {
            match self.store.accept_one(result, now).await? {
                AcceptOutcome::Captioned(accepted) => {
                    report.captioned += 1;
                    for (blog, post_id) in accepted.associations {
                        pending.entry(blog).or_default().insert(post_id);
                    }
                }
                AcceptOutcome::Failed => report.failed += 1,
                AcceptOutcome::Dropped => report.dropped += 1,
            }
        }

        for (blog, post_ids) in pending {
            let mut writer = match BlogWriter::open(&self.data_dir, &blog, &self.index_options) {
                Ok(writer) => writer,
                Err(IndexError::Locked { .. }) => {
                    tracing::warn!(blog = %blog, "index locked; caption merge deferred");
                    report.deferred_blogs += 1;
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            let builder = DocumentBuilder::new(writer.schema().clone());
            let searcher = writer.reader()?.searcher();

            let mut merged_any = false;
            for post_id in post_ids {
                let captions = self.store.caption_texts_for_post(&blog, post_id).await?;
                if merge_into_post(&mut writer, &searcher, &builder, post_id, &captions)? {
                    report.merged_posts += 1;
                    merged_any = true;
                }
            }
            if merged_any {
                writer.commit()?;
            }
        }

        Ok(report)
    }

    /// Queue health counters.
    pub async fn stats(&self) -> EnrichResult<QueueStats> {
        self.store.stats().await
    }
}
