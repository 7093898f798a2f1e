//! NPF-style post data model.
//!
//! Posts arrive from the remote platform as JSON and are treated as
//! read-only input: the indexer stores the verbatim JSON as the document
//! payload and only deserializes the fields it derives terms from. Content
//! blocks form a closed tagged union with an explicit `Unknown` variant so
//! block kinds added by the platform later are skipped without error.

use serde::Deserialize;

/// Author term recorded when a post carries neither a blog name nor a
/// broken-blog fallback. Malformed remote data is never fatal.
pub const FALLBACK_AUTHOR: &str = "[unknown]";

/// One post as returned by the remote platform (NPF layout).
#[derive(Debug, Clone, Deserialize)]
pub struct Post {
    pub id: u64,
    #[serde(default)]
    pub blog: Option<BlogRef>,
    /// Recorded by the platform when the original blog was deleted.
    #[serde(default)]
    pub broken_blog_name: Option<String>,
    pub timestamp: i64,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub content: Vec<ContentBlock>,
    #[serde(default)]
    pub trail: Vec<TrailItem>,
}

/// Minimal blog reference embedded in posts and trail entries.
#[derive(Debug, Clone, Deserialize)]
pub struct BlogRef {
    pub name: String,
}

/// One ancestor entry in a repost chain. Same shape as a post but only the
/// authorship and content matter for indexing.
#[derive(Debug, Clone, Deserialize)]
pub struct TrailItem {
    #[serde(default)]
    pub blog: Option<BlogRef>,
    #[serde(default)]
    pub broken_blog_name: Option<String>,
    #[serde(default)]
    pub content: Vec<ContentBlock>,
}

/// Typed content block. Unknown kinds deserialize to `Unknown` and are a
/// documented no-op during indexing.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    Image {
        #[serde(default)]
        media: Vec<MediaObject>,
        #[serde(default)]
        alt_text: Option<String>,
    },
    Link {
        url: String,
        #[serde(default)]
        description: Option<String>,
    },
    Poll {
        question: String,
        #[serde(default)]
        answers: Vec<PollAnswer>,
    },
    #[serde(other)]
    Unknown,
}

/// One variant of an attached media asset.
#[derive(Debug, Clone, Deserialize)]
pub struct MediaObject {
    #[serde(default)]
    pub media_key: Option<String>,
    pub url: String,
    /// MIME type, e.g. `image/gif` for animated images.
    #[serde(default, rename = "type")]
    pub mime: Option<String>,
}

/// One answer option of a poll block.
#[derive(Debug, Clone, Deserialize)]
pub struct PollAnswer {
    pub answer_text: String,
}

impl Post {
    /// The post's own author name with the broken-blog fallback applied.
    #[must_use]
    pub fn author(&self) -> &str {
        resolve_author(self.blog.as_ref(), self.broken_blog_name.as_deref())
    }

    /// The original poster: the author of the first trail entry for a
    /// reblog, the post's own author otherwise.
    #[must_use]
    pub fn original_poster(&self) -> &str {
        match self.trail.first() {
            Some(first) => first.author(),
            None => self.author(),
        }
    }
}

impl TrailItem {
    /// Trail entry author with the broken-blog fallback applied.
    #[must_use]
    pub fn author(&self) -> &str {
        resolve_author(self.blog.as_ref(), self.broken_blog_name.as_deref())
    }
}

fn resolve_author<'a>(blog: Option<&'a BlogRef>, broken: Option<&'a str>) -> &'a str {
    match blog {
        Some(blog) => &blog.name,
        None => broken.unwrap_or(FALLBACK_AUTHOR),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_block_kinds_deserialize_to_unknown() {
        let json = r#"{"type": "video", "url": "https://example.com/v.mp4"}"#;
        let block: ContentBlock = serde_json::from_str(json).expect("deserialize");
        assert!(matches!(block, ContentBlock::Unknown));
    }

    #[test]
    fn broken_blog_name_is_the_author_fallback() {
        let json = r#"{
            "id": 1, "timestamp": 100,
            "broken_blog_name": "gone-blog",
            "trail": [{"broken_blog_name": "gone-op"}]
        }"#;
        let post: Post = serde_json::from_str(json).expect("deserialize");
        assert_eq!(post.author(), "gone-blog");
        assert_eq!(post.original_poster(), "gone-op");
    }

    #[test]
    fn original_poster_of_a_non_reblog_is_the_author() {
        let json = r#"{"id": 1, "timestamp": 100, "blog": {"name": "me"}}"#;
        let post: Post = serde_json::from_str(json).expect("deserialize");
        assert_eq!(post.original_poster(), "me");
    }
}
