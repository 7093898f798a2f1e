//! Relational side-store for image caption state.
//!
//! Sqlite owns the Image/ImageInPost records and is the single source of
//! truth for caption text; indexes carry denormalized copies. Offer and
//! accept are the only mutating entry points workers touch, and both run
//! as single transactions so no image is ever assigned to two workers and
//! no caption is applied to a reclaimed image.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous,
};
use sqlx::{Row, SqlitePool};

use super::errors::EnrichResult;
use crate::docbuild::MediaRef;

/// SQL schema for the caption side-store.
const SCHEMA_SQL: &str = r#"
-- Images: one row per media key, unique across all blogs
CREATE TABLE IF NOT EXISTS images (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    media_key TEXT NOT NULL UNIQUE,
    url TEXT NOT NULL,
    state TEXT NOT NULL,
    created INTEGER NOT NULL,
    assigned INTEGER,
    agent TEXT,
    captioned INTEGER,
    caption TEXT
);

-- Offer scans: oldest AVAILABLE first
CREATE INDEX IF NOT EXISTS idx_images_state_created ON images(state, created);

-- Join table: which posts (per blog index) embed which image
CREATE TABLE IF NOT EXISTS images_in_posts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    image_id INTEGER NOT NULL REFERENCES images(id),
    post_id INTEGER NOT NULL,
    blog TEXT NOT NULL,
    UNIQUE(image_id, post_id, blog)
);

-- Caption merge lookups by document
CREATE INDEX IF NOT EXISTS idx_images_in_posts_doc ON images_in_posts(blog, post_id);
"#;

/// Image lifecycle. ERROR is terminal but retained for audit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, Serialize, Deserialize)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ImageState {
    Available,
    Assigned,
    Captioned,
    Error,
}

/// An image handed to a captioning worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OfferedImage {
    pub id: i64,
    pub media_key: String,
    pub url: String,
}

/// Result of one offer call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OfferBatch {
    /// Total AVAILABLE images at selection time, for worker back-off.
    pub available: u64,
    pub images: Vec<OfferedImage>,
}

/// A worker's verdict on one offered image. `None` marks the image as
/// unrecoverable (permanently unfetchable media, model produced nothing).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptionResult {
    pub image_id: i64,
    pub caption: Option<String>,
}

/// Outcome of a valid accept: the caption plus every document that must
/// receive it.
#[derive(Debug, Clone)]
pub struct AcceptedImage {
    pub caption: String,
    /// `(blog, post_id)` associations, deduplicated.
    pub associations: Vec<(String, u64)>,
}

/// What one submitted result did to the store.
#[derive(Debug)]
pub enum AcceptOutcome {
    /// Caption applied; merge it into the associated documents.
    Captioned(AcceptedImage),
    /// Image marked terminally uncaptionable.
    Failed,
    /// Late or duplicate submission; no state changed.
    Dropped,
}

/// A batch-ingested image that is already captioned, so its caption can be
/// merged into the referencing documents immediately.
#[derive(Debug, Clone)]
pub struct CaptionedImage {
    pub media_key: String,
    pub caption: String,
    pub post_ids: BTreeSet<u64>,
}

/// Per-state row counts.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct QueueStats {
    pub available: u64,
    pub assigned: u64,
    pub captioned: u64,
    pub error: u64,
}

/// Handle on the sqlite side-store.
#[derive(Clone)]
pub struct CaptionStore {
    pool: SqlitePool,
}

impl CaptionStore {
    /// Open (creating if missing) the store at `{data_dir}/blogmirror.sqlite3`.
    pub async fn open(data_dir: &Path) -> EnrichResult<Self> {
        tokio::fs::create_dir_all(data_dir).await.map_err(|e| {
            sqlx::Error::Io(e)
        })?;
        let db_path = data_dir.join("blogmirror.sqlite3");

        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(std::time::Duration::from_secs(30));

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;
        Self::from_pool(pool).await
    }

    /// In-memory store for tests. Single connection: each sqlite memory
    /// database is private to its connection.
    pub async fn open_in_memory() -> EnrichResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        Self::from_pool(pool).await
    }

    async fn from_pool(pool: SqlitePool) -> EnrichResult<Self> {
        sqlx::query(SCHEMA_SQL).execute(&pool).await?;
        Ok(Self { pool })
    }

    /// Record a batch of extracted media for `blog`.
    ///
    /// Unknown media keys become AVAILABLE images; known keys gain any new
    /// `(blog, post_id)` associations. Returns every image in the batch
    /// that is already CAPTIONED so the caller can merge captions into the
    /// affected documents without re-captioning.
    pub async fn ingest(
        &self,
        blog: &str,
        entries: &BTreeMap<String, MediaRef>,
        now: i64,
    ) -> EnrichResult<Vec<CaptionedImage>> {
        let mut tx = self.pool.begin().await?;
        let mut captioned = Vec::new();

        for (media_key, entry) in entries {
            sqlx::query(
                "INSERT INTO images (media_key, url, state, created) VALUES (?, ?, ?, ?) \
                 ON CONFLICT(media_key) DO NOTHING",
            )
            .bind(media_key)
            .bind(&entry.url)
            .bind(ImageState::Available)
            .bind(now)
            .execute(&mut *tx)
            .await?;

            let row = sqlx::query("SELECT id, state, caption FROM images WHERE media_key = ?")
                .bind(media_key)
                .fetch_one(&mut *tx)
                .await?;
            let image_id: i64 = row.get("id");
            let state: ImageState = row.get("state");
            let caption: Option<String> = row.get("caption");

            for post_id in &entry.post_ids {
                sqlx::query(
                    "INSERT OR IGNORE INTO images_in_posts (image_id, post_id, blog) \
                     VALUES (?, ?, ?)",
                )
                .bind(image_id)
                .bind(*post_id as i64)
                .bind(blog)
                .execute(&mut *tx)
                .await?;
            }

            if state == ImageState::Captioned
                && let Some(caption) = caption
            {
                captioned.push(CaptionedImage {
                    media_key: media_key.clone(),
                    caption,
                    post_ids: entry.post_ids.clone(),
                });
            }
        }

        tx.commit().await?;
        Ok(captioned)
    }

    /// Select up to `batch_size` AVAILABLE images (oldest created first)
    /// and assign them to `agent`, in one transaction.
    ///
    /// Any assignment older than `lease_secs` is first reclaimed back to
    /// AVAILABLE, which is how a crashed or abandoned worker's images
    /// re-enter circulation.
    pub async fn offer(
        &self,
        agent: &str,
        batch_size: u32,
        lease_secs: u64,
        now: i64,
    ) -> EnrichResult<OfferBatch> {
        let mut tx = self.pool.begin().await?;

        let cutoff = now - lease_secs as i64;
        let reclaimed = sqlx::query(
            "UPDATE images SET state = ?, assigned = NULL, agent = NULL \
             WHERE state = ? AND assigned <= ?",
        )
        .bind(ImageState::Available)
        .bind(ImageState::Assigned)
        .bind(cutoff)
        .execute(&mut *tx)
        .await?
        .rows_affected();
        if reclaimed > 0 {
            tracing::info!(reclaimed, "reclaimed expired image assignments");
        }

        let available: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM images WHERE state = ?")
            .bind(ImageState::Available)
            .fetch_one(&mut *tx)
            .await?;

        let rows = sqlx::query(
            "SELECT id, media_key, url FROM images WHERE state = ? \
             ORDER BY created, id LIMIT ?",
        )
        .bind(ImageState::Available)
        .bind(i64::from(batch_size))
        .fetch_all(&mut *tx)
        .await?;

        let mut images = Vec::with_capacity(rows.len());
        for row in rows {
            let id: i64 = row.get("id");
            sqlx::query("UPDATE images SET state = ?, agent = ?, assigned = ? WHERE id = ?")
                .bind(ImageState::Assigned)
                .bind(agent)
                .bind(now)
                .bind(id)
                .execute(&mut *tx)
                .await?;
            images.push(OfferedImage {
                id,
                media_key: row.get("media_key"),
                url: row.get("url"),
            });
        }

        tx.commit().await?;
        Ok(OfferBatch {
            available: available as u64,
            images,
        })
    }

    /// Apply one submitted caption, in one transaction.
    ///
    /// The transition fires only while the image is still ASSIGNED: a late
    /// submission for an image that was reclaimed and captioned by another
    /// worker reports [`AcceptOutcome::Dropped`] (first valid transition
    /// wins). A `None` caption marks the image as terminally failed; it
    /// never re-enters offer batches. A `None` for an image that already
    /// carries a caption is likewise dropped, not failed.
    pub async fn accept_one(
        &self,
        result: &CaptionResult,
        now: i64,
    ) -> EnrichResult<AcceptOutcome> {
        let mut tx = self.pool.begin().await?;

        let Some(caption) = &result.caption else {
            let rows = sqlx::query(
                "UPDATE images SET state = ?, assigned = NULL, agent = NULL \
                 WHERE id = ? AND state IN (?, ?)",
            )
            .bind(ImageState::Error)
            .bind(result.image_id)
            .bind(ImageState::Assigned)
            .bind(ImageState::Available)
            .execute(&mut *tx)
            .await?
            .rows_affected();
            tx.commit().await?;
            if rows == 0 {
                return Ok(AcceptOutcome::Dropped);
            }
            tracing::warn!(image_id = result.image_id, "image marked as uncaptionable");
            return Ok(AcceptOutcome::Failed);
        };

        let rows = sqlx::query(
            "UPDATE images SET state = ?, caption = ?, captioned = ?, \
             assigned = NULL, agent = NULL WHERE id = ? AND state = ?",
        )
        .bind(ImageState::Captioned)
        .bind(caption)
        .bind(now)
        .bind(result.image_id)
        .bind(ImageState::Assigned)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if rows == 0 {
            // Duplicate or late submission; the first valid one won.
            tx.commit().await?;
            return Ok(AcceptOutcome::Dropped);
        }

        let assoc_rows =
            sqlx::query("SELECT blog, post_id FROM images_in_posts WHERE image_id = ?")
                .bind(result.image_id)
                .fetch_all(&mut *tx)
                .await?;
        tx.commit().await?;

        let associations = assoc_rows
            .into_iter()
            .map(|row| {
                let blog: String = row.get("blog");
                let post_id: i64 = row.get("post_id");
                (blog, post_id as u64)
            })
            .collect();

        Ok(AcceptOutcome::Captioned(AcceptedImage {
            caption: caption.clone(),
            associations,
        }))
    }

    /// Every caption applying to one document: captions of all CAPTIONED
    /// images associated with `(blog, post_id)`.
    pub async fn caption_texts_for_post(
        &self,
        blog: &str,
        post_id: u64,
    ) -> EnrichResult<Vec<String>> {
        let rows = sqlx::query(
            "SELECT images.caption AS caption FROM images \
             JOIN images_in_posts ON images.id = images_in_posts.image_id \
             WHERE images_in_posts.blog = ? AND images_in_posts.post_id = ? \
             AND images.state = ? AND images.caption IS NOT NULL \
             ORDER BY images.id",
        )
        .bind(blog)
        .bind(post_id as i64)
        .bind(ImageState::Captioned)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|row| row.get("caption")).collect())
    }

    /// Per-state image counts.
    pub async fn stats(&self) -> EnrichResult<QueueStats> {
        let rows = sqlx::query("SELECT state, COUNT(*) AS n FROM images GROUP BY state")
            .fetch_all(&self.pool)
            .await?;
        let mut stats = QueueStats::default();
        for row in rows {
            let state: ImageState = row.get("state");
            let n: i64 = row.get("n");
            let n = n as u64;
            match state {
                ImageState::Available => stats.available = n,
                ImageState::Assigned => stats.assigned = n,
                ImageState::Captioned => stats.captioned = n,
                ImageState::Error => stats.error = n,
            }
        }
        Ok(stats)
    }

    /// Current state of one image, for diagnostics and tests.
    pub async fn image_state(&self, media_key: &str) -> EnrichResult<Option<ImageState>> {
        let row = sqlx::query("SELECT state FROM images WHERE media_key = ?")
            .bind(media_key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.get("state")))
    }
}
