//! Process configuration.
//!
//! All knobs (credential, quotas, batch sizes) travel as an explicit
//! [`AppConfig`] value handed to each component at construction; nothing
//! reads ambient global state, so tests supply fixtures freely.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Configuration for crawling, indexing, and the enrichment queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Root directory holding per-blog indexes and the sqlite side-store.
    pub(crate) data_dir: PathBuf,
    /// Remote platform API credential. Checked before any fetch.
    pub(crate) api_key: Option<String>,
    pub(crate) api_base: String,
    /// Posts per remote page.
    pub(crate) page_size: u32,
    /// Documented hourly request quota of the remote API.
    pub(crate) hourly_quota: u32,
    /// Documented daily request quota of the remote API.
    pub(crate) daily_quota: u32,
    /// Pages between explicit index commits. Larger values trade a bigger
    /// at-most-N-pages-lost window on crash for write throughput.
    pub(crate) commit_every_pages: u32,
    /// Images handed to a captioning worker per offer.
    pub(crate) caption_batch_size: u32,
    /// Seconds before an assigned image is reclaimed from a stalled worker.
    pub(crate) caption_lease_secs: u64,
    /// Whether crawls sleep between page fetches by default.
    pub(crate) throttle: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("."),
            api_key: None,
            api_base: "https://api.tumblr.com".to_string(),
            page_size: 20,
            hourly_quota: 1_000,
            daily_quota: 5_000,
            commit_every_pages: 8,
            caption_batch_size: 30,
            caption_lease_secs: 3_600,
            throttle: true,
        }
    }
}

impl AppConfig {
    #[must_use]
    pub fn builder() -> AppConfigBuilder {
        AppConfigBuilder::default()
    }

    #[must_use]
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    #[must_use]
    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref()
    }

    #[must_use]
    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    #[must_use]
    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    #[must_use]
    pub fn hourly_quota(&self) -> u32 {
        self.hourly_quota
    }

    #[must_use]
    pub fn daily_quota(&self) -> u32 {
        self.daily_quota
    }

    #[must_use]
    pub fn commit_every_pages(&self) -> u32 {
        self.commit_every_pages
    }

    #[must_use]
    pub fn caption_batch_size(&self) -> u32 {
        self.caption_batch_size
    }

    #[must_use]
    pub fn caption_lease_secs(&self) -> u64 {
        self.caption_lease_secs
    }

    #[must_use]
    pub fn throttle(&self) -> bool {
        self.throttle
    }
}

/// Builder for [`AppConfig`].
#[derive(Debug, Default)]
pub struct AppConfigBuilder {
    config: Option<AppConfig>,
}

impl AppConfigBuilder {
    fn config(&mut self) -> &mut AppConfig {
        self.config.get_or_insert_with(AppConfig::default)
    }

    #[must_use]
    pub fn data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config().data_dir = dir.into();
        self
    }

    #[must_use]
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config().api_key = Some(key.into());
        self
    }

    #[must_use]
    pub fn api_base(mut self, base: impl Into<String>) -> Self {
        self.config().api_base = base.into();
        self
    }

    #[must_use]
    pub fn page_size(mut self, size: u32) -> Self {
        self.config().page_size = size.max(1);
        self
    }

    #[must_use]
    pub fn hourly_quota(mut self, quota: u32) -> Self {
        self.config().hourly_quota = quota.max(1);
        self
    }

    #[must_use]
    pub fn daily_quota(mut self, quota: u32) -> Self {
        self.config().daily_quota = quota.max(1);
        self
    }

    #[must_use]
    pub fn commit_every_pages(mut self, pages: u32) -> Self {
        self.config().commit_every_pages = pages.max(1);
        self
    }

    #[must_use]
    pub fn caption_batch_size(mut self, size: u32) -> Self {
        self.config().caption_batch_size = size.max(1);
        self
    }

    #[must_use]
    pub fn caption_lease_secs(mut self, secs: u64) -> Self {
        self.config().caption_lease_secs = secs;
        self
    }

    #[must_use]
    pub fn throttle(mut self, enabled: bool) -> Self {
        self.config().throttle = enabled;
        self
    }

    #[must_use]
    pub fn build(mut self) -> AppConfig {
        self.config.take().unwrap_or_default()
    }
}
