//! Caption queue lifecycle: ingest deduplication, lease assignment and
//! reclaim, first-accept-wins races, terminal failures, and caption
//! merge-back into indexed documents.

use std::collections::BTreeMap;

use serde_json::{Value, json};
use tempfile::TempDir;

use blogmirror::config::AppConfig;
use blogmirror::docbuild::{DocumentBuilder, MediaBatch, MediaRef};
use blogmirror::enrich::{
    AcceptOutcome, CaptionResult, CaptionStore, EnrichmentQueue, ImageState,
};
use blogmirror::index::{BlogReader, BlogWriter, IndexOptions};
use blogmirror::query::{SearchRequest, SortOrder, search};

fn media_entries(entries: &[(&str, &str, &[u64])]) -> BTreeMap<String, MediaRef> {
    entries
        .iter()
        .map(|(key, url, posts)| {
            (
                key.to_string(),
                MediaRef {
                    url: url.to_string(),
                    post_ids: posts.iter().copied().collect(),
                },
            )
        })
        .collect()
}

#[tokio::test]
async fn ingest_deduplicates_and_unions_associations() {
    let store = CaptionStore::open_in_memory().await.unwrap();

    let first = media_entries(&[("mk1", "https://cdn/mk1.png", &[10])]);
    store.ingest("blog-a", &first, 1_000).await.unwrap();

    // Same key again from another post and another blog.
    let second = media_entries(&[("mk1", "https://cdn/mk1.png", &[11])]);
    store.ingest("blog-a", &second, 1_001).await.unwrap();
    store.ingest("blog-b", &second, 1_002).await.unwrap();

    let stats = store.stats().await.unwrap();
    assert_eq!(stats.available, 1);

    // The one image carries all three associations.
    let batch = store.offer("w1", 10, 3_600, 1_010).await.unwrap();
    let outcome = store
        .accept_one(
            &CaptionResult {
                image_id: batch.images[0].id,
                caption: Some("a red door".to_string()),
            },
            1_020,
        )
        .await
        .unwrap();
    let AcceptOutcome::Captioned(accepted) = outcome else {
        panic!("expected the caption to be applied");
    };
    let mut associations = accepted.associations;
    associations.sort();
    assert_eq!(
        associations,
        vec![
            ("blog-a".to_string(), 10),
            ("blog-a".to_string(), 11),
            ("blog-b".to_string(), 11),
        ]
    );
}

#[tokio::test]
async fn offer_assigns_oldest_first_and_reports_availability() {
    let store = CaptionStore::open_in_memory().await.unwrap();
    store
        .ingest("b", &media_entries(&[("old", "https://cdn/old", &[1])]), 100)
        .await
        .unwrap();
    store
        .ingest("b", &media_entries(&[("new", "https://cdn/new", &[2])]), 200)
        .await
        .unwrap();

    let batch = store.offer("w1", 1, 3_600, 300).await.unwrap();
    assert_eq!(batch.available, 2);
    assert_eq!(batch.images.len(), 1);
    assert_eq!(batch.images[0].media_key, "old");

    // The assigned image is excluded from the next offer.
    let batch = store.offer("w2", 10, 3_600, 301).await.unwrap();
    assert_eq!(batch.available, 1);
    assert_eq!(batch.images[0].media_key, "new");
}

#[tokio::test]
async fn expired_leases_are_reclaimed() {
    let store = CaptionStore::open_in_memory().await.unwrap();
    store
        .ingest("b", &media_entries(&[("mk1", "https://cdn/mk1", &[1])]), 100)
        .await
        .unwrap();

    let first = store.offer("w1", 10, 3_600, 1_000).await.unwrap();
    assert_eq!(first.images.len(), 1);

    // Within the lease window nothing is re-offered.
    let during = store.offer("w2", 10, 3_600, 2_000).await.unwrap();
    assert!(during.images.is_empty());

    // After the lease expires the image goes back into circulation.
    let after = store.offer("w2", 10, 3_600, 4_601).await.unwrap();
    assert_eq!(after.images.len(), 1);
    assert_eq!(after.images[0].media_key, "mk1");
}

#[tokio::test]
async fn late_accepts_after_reclaim_are_dropped() {
    let store = CaptionStore::open_in_memory().await.unwrap();
    store
        .ingest("b", &media_entries(&[("mk1", "https://cdn/mk1", &[1])]), 100)
        .await
        .unwrap();

    let first = store.offer("w1", 10, 3_600, 1_000).await.unwrap();
    let image_id = first.images[0].id;

    // Lease expires; a second worker captions the image.
    let second = store.offer("w2", 10, 3_600, 5_000).await.unwrap();
    assert_eq!(second.images[0].id, image_id);
    let winner = store
        .accept_one(
            &CaptionResult {
                image_id,
                caption: Some("by the second worker".to_string()),
            },
            5_100,
        )
        .await
        .unwrap();
    assert!(matches!(winner, AcceptOutcome::Captioned(_)));

    // The first worker's late submission is a silent no-op.
    let late = store
        .accept_one(
            &CaptionResult {
                image_id,
                caption: Some("by the first worker".to_string()),
            },
            5_200,
        )
        .await
        .unwrap();
    assert!(matches!(late, AcceptOutcome::Dropped));
    let texts = store.caption_texts_for_post("b", 1).await.unwrap();
    assert_eq!(texts, vec!["by the second worker"]);
}

#[tokio::test]
async fn failed_images_are_terminal_and_never_re_offered() {
    let store = CaptionStore::open_in_memory().await.unwrap();
    store
        .ingest("b", &media_entries(&[("mk1", "https://cdn/mk1", &[1])]), 100)
        .await
        .unwrap();

    let batch = store.offer("w1", 10, 3_600, 1_000).await.unwrap();
    let outcome = store
        .accept_one(
            &CaptionResult {
                image_id: batch.images[0].id,
                caption: None,
            },
            1_100,
        )
        .await
        .unwrap();
    assert!(matches!(outcome, AcceptOutcome::Failed));
    assert_eq!(store.image_state("mk1").await.unwrap(), Some(ImageState::Error));

    // Not even after every lease in the world expires.
    let batch = store.offer("w1", 10, 1, 1_000_000).await.unwrap();
    assert!(batch.images.is_empty());
    let stats = store.stats().await.unwrap();
    assert_eq!(stats.error, 1);
    assert_eq!(stats.available, 0);
}

#[tokio::test]
async fn late_failure_verdicts_for_captioned_images_are_dropped() {
    let store = CaptionStore::open_in_memory().await.unwrap();
    store
        .ingest("b", &media_entries(&[("mk1", "https://cdn/mk1", &[1])]), 100)
        .await
        .unwrap();

    let batch = store.offer("w1", 10, 3_600, 1_000).await.unwrap();
    let image_id = batch.images[0].id;
    let won = store
        .accept_one(
            &CaptionResult {
                image_id,
                caption: Some("a stone bridge".to_string()),
            },
            1_010,
        )
        .await
        .unwrap();
    assert!(matches!(won, AcceptOutcome::Captioned(_)));

    // A second worker's failure verdict arrives after the caption landed;
    // the image keeps its caption.
    let late = store
        .accept_one(&CaptionResult { image_id, caption: None }, 1_020)
        .await
        .unwrap();
    assert!(matches!(late, AcceptOutcome::Dropped));
    assert_eq!(
        store.image_state("mk1").await.unwrap(),
        Some(ImageState::Captioned)
    );
}

#[tokio::test]
async fn accept_report_distinguishes_failures_from_late_duplicates() {
    let dir = TempDir::new().unwrap();
    let config = AppConfig::builder().data_dir(dir.path()).build();
    let store = CaptionStore::open_in_memory().await.unwrap();
    let queue = EnrichmentQueue::new(store, &config, IndexOptions::default());

    queue
        .store()
        .ingest("b", &media_entries(&[("mk1", "https://cdn/mk1", &[1])]), 100)
        .await
        .unwrap();
    let batch = queue.offer("w1", 1_000).await.unwrap();
    let image_id = batch.images[0].id;

    let report = queue
        .accept(
            &[CaptionResult {
                image_id,
                caption: Some("a stone bridge".to_string()),
            }],
            1_010,
        )
        .await
        .unwrap();
    assert_eq!(report.captioned, 1);
    assert_eq!(report.failed, 0);

    // The same image reported as uncaptionable afterwards: no transition.
    let report = queue
        .accept(&[CaptionResult { image_id, caption: None }], 1_020)
        .await
        .unwrap();
    assert_eq!(report.failed, 0);
    assert_eq!(report.dropped, 1);
    assert_eq!(
        queue.store().image_state("mk1").await.unwrap(),
        Some(ImageState::Captioned)
    );
}

fn image_post(id: u64, timestamp: i64, media_key: &str) -> Value {
    json!({
        "id": id,
        "timestamp": timestamp,
        "blog": { "name": "caption-blog" },
        "tags": [],
        "content": [{
            "type": "image",
            "media": [
                { "media_key": media_key, "url": format!("https://cdn/{media_key}.png"), "type": "image/png" }
            ]
        }],
        "trail": []
    })
}

fn caption_query(reader: &BlogReader, text: &str) -> Vec<u64> {
    let response = search(
        reader,
        &SearchRequest {
            query: format!("image:{text}"),
            sort: SortOrder::Oldest,
            ..SearchRequest::default()
        },
    )
    .unwrap();
    response
        .posts
        .iter()
        .map(|p| p["id"].as_u64().unwrap())
        .collect()
}

/// Full round trip: crawl-style ingest, worker accept, and the caption
/// becoming searchable on every referencing document.
#[tokio::test]
async fn accepted_captions_reach_every_referencing_document() {
    let dir = TempDir::new().unwrap();
    let config = AppConfig::builder().data_dir(dir.path()).build();
    let options = IndexOptions::default();
    let store = CaptionStore::open_in_memory().await.unwrap();
    let queue = EnrichmentQueue::new(store, &config, options.clone());

    // Two posts share one image; a third has its own.
    let mut writer = BlogWriter::open(dir.path(), "caption-blog", &options).unwrap();
    let builder = DocumentBuilder::new(writer.schema().clone());
    let mut media = MediaBatch::new();
    for raw in [
        image_post(1, 100, "shared"),
        image_post(2, 200, "shared"),
        image_post(3, 300, "solo"),
    ] {
        let built = builder.build(&raw).unwrap();
        writer.replace(&built.id_term, built.doc).unwrap();
        media.absorb(built.media);
    }
    writer.commit().unwrap();
    queue.ingest(&mut writer, &builder, &mut media, 1_000).await.unwrap();

    let batch = queue.offer("w1", 1_010).await.unwrap();
    assert_eq!(batch.images.len(), 2);
    let results: Vec<CaptionResult> = batch
        .images
        .iter()
        .map(|img| CaptionResult {
            image_id: img.id,
            caption: Some(format!("caption for {}", img.media_key)),
        })
        .collect();
    drop(writer); // release the write lock so accept can merge

    let report = queue.accept(&results, 1_020).await.unwrap();
    assert_eq!(report.captioned, 2);
    assert_eq!(report.merged_posts, 3);
    assert_eq!(report.deferred_blogs, 0);

    let reader = BlogReader::open(dir.path(), "caption-blog", &options).unwrap();
    assert_eq!(caption_query(&reader, "shared"), vec![1, 2]);
    assert_eq!(caption_query(&reader, "solo"), vec![3]);
}

/// A crawl that indexes a new post embedding an already-captioned image
/// picks the caption up at ingest time, without worker involvement.
#[tokio::test]
async fn ingest_merges_known_captions_into_new_posts() {
    let dir = TempDir::new().unwrap();
    let config = AppConfig::builder().data_dir(dir.path()).build();
    let options = IndexOptions::default();
    let store = CaptionStore::open_in_memory().await.unwrap();
    let queue = EnrichmentQueue::new(store, &config, options.clone());

    let mut writer = BlogWriter::open(dir.path(), "caption-blog", &options).unwrap();
    let builder = DocumentBuilder::new(writer.schema().clone());

    // First post introduces the image; a worker captions it.
    let built = builder.build(&image_post(1, 100, "shared")).unwrap();
    writer.replace(&built.id_term, built.doc).unwrap();
    let mut media = MediaBatch::new();
    media.absorb(built.media);
    writer.commit().unwrap();
    queue.ingest(&mut writer, &builder, &mut media, 1_000).await.unwrap();

    let batch = queue.offer("w1", 1_010).await.unwrap();
    queue
        .store()
        .accept_one(
            &CaptionResult {
                image_id: batch.images[0].id,
                caption: Some("a tall lighthouse".to_string()),
            },
            1_020,
        )
        .await
        .unwrap();

    // A later crawl indexes a second post with the same image.
    let built = builder.build(&image_post(2, 200, "shared")).unwrap();
    writer.replace(&built.id_term, built.doc).unwrap();
    let mut media = MediaBatch::new();
    media.absorb(built.media);
    writer.commit().unwrap();
    let merged = queue.ingest(&mut writer, &builder, &mut media, 2_000).await.unwrap();
    assert_eq!(merged, 1);
    writer.commit().unwrap();
    drop(writer);

    let reader = BlogReader::open(dir.path(), "caption-blog", &options).unwrap();
    assert_eq!(caption_query(&reader, "lighthouse"), vec![2]);
}
