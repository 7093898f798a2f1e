//! Captioning worker: leases image batches, downloads media, runs a
//! caption model, and submits the results.
//!
//! Download and captioning run as a two-stage pipeline over a bounded
//! channel, so the next image downloads while the model works on the
//! previous one without buffering the whole batch in memory.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::errors::EnrichResult;
use super::queue::{AcceptReport, EnrichmentQueue};
use super::store::{CaptionResult, OfferedImage};

/// Images in flight between the download and caption stages.
const PIPELINE_DEPTH: usize = 4;

/// A caption model. `None` means the model produced nothing usable for
/// this image; the image is then marked terminally uncaptionable.
#[async_trait]
pub trait Captioner: Send + Sync {
    async fn caption(&self, media_key: &str, bytes: &[u8]) -> Option<String>;
}

/// Outcome of one worker pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct BatchReport {
    /// Images leased in this pass.
    pub offered: u64,
    /// Uncaptioned images remaining after this lease.
    pub remaining: u64,
    /// Images whose download failed; their leases expire and they are
    /// re-offered later.
    pub download_failures: u64,
    pub accept: AcceptReport,
}

impl BatchReport {
    /// Whether another pass is worth making immediately.
    #[must_use]
    pub fn has_more(&self) -> bool {
        self.remaining > 0
    }
}

/// Long-running caption worker over one enrichment queue.
pub struct CaptionWorker<C> {
    queue: EnrichmentQueue,
    captioner: C,
    http: reqwest::Client,
    agent: String,
}

impl<C: Captioner> CaptionWorker<C> {
    #[must_use]
    pub fn new(queue: EnrichmentQueue, captioner: C, agent: impl Into<String>) -> Self {
        Self {
            queue,
            captioner,
            http: reqwest::Client::new(),
            agent: agent.into(),
        }
    }

    /// Lease one batch, caption it, and submit the results.
    pub async fn run_once(&self) -> EnrichResult<BatchReport> {
        let now = chrono::Utc::now().timestamp();
        let batch = self.queue.offer(&self.agent, now).await?;
        let offered = batch.images.len() as u64;
        if offered == 0 {
            return Ok(BatchReport::default());
        }
        tracing::info!(
            agent = %self.agent,
            offered,
            available = batch.available,
            "leased caption batch"
        );

        let (results, download_failures) = self.caption_batch(batch.images).await;

        let now = chrono::Utc::now().timestamp();
        let accept = self.queue.accept(&results, now).await?;
        tracing::info!(
            agent = %self.agent,
            captioned = accept.captioned,
            failed = accept.failed,
            merged_posts = accept.merged_posts,
            "submitted caption batch"
        );

        Ok(BatchReport {
            offered,
            remaining: batch.available - offered.min(batch.available),
            download_failures,
            accept,
        })
    }

    /// Run until the queue drains, then poll on `idle_delay`.
    pub async fn run(&self, idle_delay: Duration) -> EnrichResult<()> {
        loop {
            let report = self.run_once().await?;
            if !report.has_more() {
                tokio::time::sleep(idle_delay).await;
            }
        }
    }

    async fn caption_batch(&self, images: Vec<OfferedImage>) -> (Vec<CaptionResult>, u64) {
        let (tx, mut rx) = mpsc::channel::<(OfferedImage, Vec<u8>)>(PIPELINE_DEPTH);

        let download_stage = async {
            let mut failures = 0u64;
            for image in images {
                match self.download(&image.url).await {
                    Ok(bytes) => {
                        if tx.send((image, bytes)).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        // Transient by assumption; the lease expires and
                        // the image is re-offered.
                        tracing::warn!(
                            media_url = %image.url,
                            error = %e,
                            "media download failed"
                        );
                        failures += 1;
                    }
                }
            }
            drop(tx);
            failures
        };

        let caption_stage = async {
            let mut results = Vec::new();
            while let Some((image, bytes)) = rx.recv().await {
                let caption = self.captioner.caption(&image.media_key, &bytes).await;
                if caption.is_none() {
                    tracing::warn!(media_key = %image.media_key, "model produced no caption");
                }
                results.push(CaptionResult {
                    image_id: image.id,
                    caption,
                });
            }
            results
        };

        let (failures, results) = tokio::join!(download_stage, caption_stage);
        (results, failures)
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, reqwest::Error> {
        let bytes = self
            .http
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;
        Ok(bytes.to_vec())
    }
}
