//! Request rate budgeting against the remote API's documented quotas.
//!
//! The thresholds are policy, not architecture: they live in configuration
//! and flow in through [`RateBudget`], so a platform with different quotas
//! only needs different numbers.

use std::time::Duration;

use crate::config::AppConfig;

const SECONDS_PER_HOUR: f64 = 3_600.0;
const SECONDS_PER_DAY: f64 = 86_400.0;

/// Per-invocation request budget derived from the platform quotas.
#[derive(Debug, Clone, Copy)]
pub struct RateBudget {
    hourly_quota: u32,
    daily_quota: u32,
}

/// Pacing plan for a full crawl.
#[derive(Debug, Clone, Copy)]
pub struct CrawlPlan {
    /// Pages the crawl is expected to fetch, from the blog's post count.
    pub estimated_pages: u64,
    /// Sleep between page fetches.
    pub delay: Duration,
    /// Estimated wall-clock time for the whole crawl.
    pub estimated_duration: Duration,
}

impl RateBudget {
    #[must_use]
    pub fn new(hourly_quota: u32, daily_quota: u32) -> Self {
        Self {
            hourly_quota: hourly_quota.max(1),
            daily_quota: daily_quota.max(1),
        }
    }

    #[must_use]
    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.hourly_quota(), config.daily_quota())
    }

    /// Delay that spreads requests evenly across the hourly quota. The
    /// default for incremental crawls.
    #[must_use]
    pub fn incremental_delay(&self) -> Duration {
        Duration::from_secs_f64(SECONDS_PER_HOUR / f64::from(self.hourly_quota))
    }

    /// Pacing for a full crawl of `post_count` posts. When the page
    /// estimate exceeds the daily quota, requests are spread across the
    /// full day instead of the hour.
    #[must_use]
    pub fn plan_full(&self, post_count: u64, page_size: u32) -> CrawlPlan {
        let estimated_pages = post_count.div_ceil(u64::from(page_size.max(1))).max(1);
        let delay = if estimated_pages > u64::from(self.daily_quota) {
            Duration::from_secs_f64(SECONDS_PER_DAY / f64::from(self.daily_quota))
        } else {
            self.incremental_delay()
        };
        let estimated_duration =
            Duration::from_secs_f64(delay.as_secs_f64() * estimated_pages as f64);

        CrawlPlan {
            estimated_pages,
            delay,
            estimated_duration,
        }
    }
}
