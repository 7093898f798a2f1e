//! Document builder: turns one post (plus its repost trail) into index terms,
//! a sortable publish timestamp, a stored payload, and extracted media.
//!
//! Building is deterministic and side-effect-free given the same post JSON.
//! That makes replace-by-id-term idempotent and lets the rebuild engine
//! re-derive every term from stored payloads alone.

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::collections::HashSet;

use serde::Deserialize;
use serde_json::Value;
use tantivy::TantivyDocument;
use thiserror::Error;
use url::Url;

use crate::index::{MAX_TERM_BYTES, PostSchema};
use crate::post::{ContentBlock, Post};

/// Host of the platform's link redirect wrapper; stripped before domain
/// terms are derived so links index under their real destination.
const REDIRECT_HOST: &str = "t.umblr.com";

/// Flag term emitted when a post carries an animated image.
const GIF_FLAG: &str = "gif";

/// Result type alias for document building.
pub type BuildResult<T> = Result<T, BuildError>;

/// Error types for document building.
#[derive(Debug, Error)]
pub enum BuildError {
    /// The post JSON is missing fields without a documented fallback
    /// (id, timestamp) or is not a post object at all.
    #[error("malformed post JSON: {0}")]
    Malformed(#[from] serde_json::Error),

    /// The stored payload could not be re-serialized.
    #[error("failed to serialize payload: {0}")]
    Payload(serde_json::Error),
}

/// Everything derived from one post.
pub struct BuiltPost {
    /// Stable replace key, `Q<post_id>`.
    pub id_term: String,
    pub doc: TantivyDocument,
    /// Publish timestamp as the index's sortable value.
    pub timestamp: f64,
    /// Media references found in the post and trail, for the enrichment
    /// queue. The builder itself never writes them anywhere.
    pub media: Vec<ExtractedMedia>,
}

/// One media asset reference extracted during building.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedMedia {
    pub media_key: String,
    pub url: String,
    pub post_id: u64,
}

/// Accumulates extracted media across a page of builds, deduplicating by
/// media key. The same asset reused across posts maps to one entry with
/// the union of referencing post ids.
#[derive(Debug, Default)]
pub struct MediaBatch {
    entries: BTreeMap<String, MediaRef>,
}

/// Deduplicated media reference with all posts that embed it.
#[derive(Debug, Clone)]
pub struct MediaRef {
    pub url: String,
    pub post_ids: BTreeSet<u64>,
}

impl MediaBatch {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one build's extracted media into the batch.
    pub fn absorb(&mut self, media: Vec<ExtractedMedia>) {
        for m in media {
            self.entries
                .entry(m.media_key)
                .or_insert_with(|| MediaRef {
                    url: m.url,
                    post_ids: BTreeSet::new(),
                })
                .post_ids
                .insert(m.post_id);
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &MediaRef)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Empty the batch, returning its contents.
    pub fn drain(&mut self) -> BTreeMap<String, MediaRef> {
        std::mem::take(&mut self.entries)
    }
}

/// Builds index documents against one schema instance.
pub struct DocumentBuilder {
    schema: PostSchema,
}

impl DocumentBuilder {
    #[must_use]
    pub fn new(schema: PostSchema) -> Self {
        Self { schema }
    }

    /// Convert one post's JSON into an index document.
    pub fn build(&self, raw: &Value) -> BuildResult<BuiltPost> {
        self.build_with_captions(raw, &[])
    }

    /// Like [`build`](Self::build) but with caption text merged into the
    /// document's caption field. Used by the enrichment queue when a
    /// referenced image is already captioned.
    pub fn build_with_captions(&self, raw: &Value, captions: &[String]) -> BuildResult<BuiltPost> {
        let post = Post::deserialize(raw)?;
        let s = &self.schema;

        let mut doc = TantivyDocument::default();
        let mut media = Vec::new();
        let mut seen_keys = HashSet::new();
        let mut has_gif = false;

        let id_term = format!("Q{}", post.id);
        doc.add_text(s.id, &id_term);

        // Author and original poster are computed once for the whole stack.
        doc.add_text(s.author, post.author());
        doc.add_text(s.op, post.original_poster());

        // Every block across the post and its full trail lands in the same
        // document: a reblog is searchable on everything visible in it.
        for item in &post.trail {
            for block in &item.content {
                self.index_block(&mut doc, block, post.id, &mut media, &mut seen_keys, &mut has_gif);
            }
        }
        for block in &post.content {
            self.index_block(&mut doc, block, post.id, &mut media, &mut seen_keys, &mut has_gif);
        }

        if has_gif {
            doc.add_text(s.has, GIF_FLAG);
        }

        for tag in &post.tags {
            doc.add_text(s.tag, &encode_tag(tag));
        }

        for caption in captions {
            doc.add_text(s.caption, caption);
        }

        let timestamp = post.timestamp as f64;
        doc.add_f64(s.timestamp, timestamp);

        let payload = serde_json::to_string(raw).map_err(BuildError::Payload)?;
        doc.add_text(s.payload, &payload);

        Ok(BuiltPost {
            id_term,
            doc,
            timestamp,
            media,
        })
    }

    fn index_block(
        &self,
        doc: &mut TantivyDocument,
        block: &ContentBlock,
        post_id: u64,
        media: &mut Vec<ExtractedMedia>,
        seen_keys: &mut HashSet<String>,
        has_gif: &mut bool,
    ) {
        let s = &self.schema;
        match block {
            ContentBlock::Text { text } => doc.add_text(s.text, text),
            ContentBlock::Link { url, description } => {
                let resolved = resolve_redirect(url);
                if let Some(host) = Url::parse(&resolved).ok().and_then(|u| {
                    u.host_str().map(str::to_string)
                }) {
                    for domain in domain_suffixes(&host) {
                        doc.add_text(s.link, &domain);
                    }
                }
                if let Some(description) = description {
                    doc.add_text(s.text, description);
                }
            }
            ContentBlock::Image { media: objects, alt_text } => {
                for object in objects {
                    if object.mime.as_deref() == Some("image/gif") {
                        *has_gif = true;
                    }
                    if let Some(key) = &object.media_key
                        && seen_keys.insert(key.clone())
                    {
                        doc.add_text(s.media, key);
                        media.push(ExtractedMedia {
                            media_key: key.clone(),
                            url: object.url.clone(),
                            post_id,
                        });
                    }
                }
                if let Some(alt_text) = alt_text {
                    doc.add_text(s.text, alt_text);
                }
            }
            ContentBlock::Poll { question, answers } => {
                doc.add_text(s.text, question);
                for answer in answers {
                    doc.add_text(s.text, &answer.answer_text);
                }
            }
            // Forward compatibility: block kinds this version does not know
            // are skipped without error.
            ContentBlock::Unknown => {}
        }
    }
}

/// Normalize a tag exactly as the query translator does: case-fold,
/// percent-encode, truncate to the engine's maximum term length.
#[must_use]
pub fn encode_tag(tag: &str) -> String {
    let mut encoded = urlencoding::encode(&tag.to_lowercase()).into_owned();
    if encoded.len() > MAX_TERM_BYTES {
        let mut cut = MAX_TERM_BYTES;
        while !encoded.is_char_boundary(cut) {
            cut -= 1;
        }
        encoded.truncate(cut);
    }
    encoded
}

/// Unwrap the platform's link redirect wrapper, returning the target URL.
/// Non-wrapper URLs pass through unchanged.
#[must_use]
pub fn resolve_redirect(raw_url: &str) -> String {
    if let Ok(url) = Url::parse(raw_url)
        && url.host_str() == Some(REDIRECT_HOST)
        && url.path() == "/redirect"
        && let Some((_, target)) = url.query_pairs().find(|(k, _)| k == "z")
    {
        return target.into_owned();
    }
    raw_url.to_string()
}

/// Every suffix level of a hostname, most specific first:
/// `a.b.com` yields `a.b.com`, `b.com`, `com`.
#[must_use]
pub fn domain_suffixes(host: &str) -> Vec<String> {
    let host = host.to_lowercase();
    let labels: Vec<&str> = host.split('.').filter(|l| !l.is_empty()).collect();
    (0..labels.len()).map(|i| labels[i..].join(".")).collect()
}
