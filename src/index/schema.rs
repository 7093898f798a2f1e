//! Tantivy schema for indexed blog posts.
//!
//! The schema separates exact boolean term fields (author, original poster,
//! tag, link domain, media key, content-kind flags) from tokenized free-text
//! fields (post text, merged image captions). The publish timestamp is the
//! single sortable value: an f64 fast column whose native ordering matches
//! numeric ordering, so range queries and value sorts work directly. The
//! verbatim post JSON is stored unindexed as the document payload.

use tantivy::schema::{
    Field, IndexRecordOption, NumericOptions, STORED, Schema, TextFieldIndexing, TextOptions,
};
use tantivy::tokenizer::{
    Language, LowerCaser, SimpleTokenizer, Stemmer, TextAnalyzer, TokenizerManager,
};

/// Analyzer used for free-text fields. Always registered under this name;
/// the stemming mode chosen at handle open decides what it does.
pub const TEXT_ANALYZER: &str = "post_text";

/// Tantivy's built-in pass-through tokenizer, used for exact term fields.
const RAW_TOKENIZER: &str = "raw";

/// Maximum byte length of an indexable term. Longer terms are rejected
/// silently by the engine, so tags are truncated to this before indexing.
pub const MAX_TERM_BYTES: usize = 245;

/// Field handles for the post index.
#[derive(Debug, Clone)]
pub struct PostSchema {
    pub schema: Schema,
    /// Replace key, value `Q<post_id>`. At most one live document per post.
    pub id: Field,
    pub author: Field,
    pub op: Field,
    pub tag: Field,
    pub link: Field,
    pub media: Field,
    pub has: Field,
    pub text: Field,
    pub caption: Field,
    pub timestamp: Field,
    pub payload: Field,
}

impl PostSchema {
    /// Build the schema. Deterministic; every handle for a blog must use
    /// the same field layout or tantivy refuses to open the index.
    #[must_use]
    pub fn build() -> Self {
        let mut builder = Schema::builder();

        let exact = || {
            TextOptions::default().set_indexing_options(
                TextFieldIndexing::default()
                    .set_tokenizer(RAW_TOKENIZER)
                    .set_index_option(IndexRecordOption::Basic),
            )
        };
        let tokenized = || {
            TextOptions::default().set_indexing_options(
                TextFieldIndexing::default()
                    .set_tokenizer(TEXT_ANALYZER)
                    .set_index_option(IndexRecordOption::WithFreqsAndPositions),
            )
        };

        let id = builder.add_text_field("id", exact().set_stored());
        let author = builder.add_text_field("author", exact());
        let op = builder.add_text_field("op", exact());
        let tag = builder.add_text_field("tag", exact());
        let link = builder.add_text_field("link", exact());
        let media = builder.add_text_field("media", exact());
        let has = builder.add_text_field("has", exact());
        let text = builder.add_text_field("text", tokenized());
        let caption = builder.add_text_field("caption", tokenized());

        let timestamp = builder.add_f64_field(
            "timestamp",
            NumericOptions::default()
                .set_indexed()
                .set_fast()
                .set_stored(),
        );
        let payload = builder.add_text_field("payload", STORED);

        let schema = builder.build();
        PostSchema {
            schema,
            id,
            author,
            op,
            tag,
            link,
            media,
            has,
            text,
            caption,
            timestamp,
            payload,
        }
    }

    /// Register the free-text analyzer on an index's tokenizer manager.
    ///
    /// The query translator analyzes query terms with the same analyzer, so
    /// a stemmed index stays searchable as long as readers pass the same
    /// stemming mode the index was written with.
    pub fn register_analyzers(manager: &TokenizerManager, stemming: Option<Language>) {
        let analyzer = match stemming {
            Some(language) => TextAnalyzer::builder(SimpleTokenizer::default())
                .filter(LowerCaser)
                .filter(Stemmer::new(language))
                .build(),
            None => TextAnalyzer::builder(SimpleTokenizer::default())
                .filter(LowerCaser)
                .build(),
        };
        manager.register(TEXT_ANALYZER, analyzer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_is_deterministic() {
        let a = PostSchema::build();
        let b = PostSchema::build();
        assert_eq!(a.schema, b.schema);
    }

    #[test]
    fn timestamp_is_a_fast_field() {
        let s = PostSchema::build();
        let entry = s.schema.get_field_entry(s.timestamp);
        assert!(entry.is_fast());
        assert!(entry.is_indexed());
    }
}
