//! Document builder coverage: term derivation from post JSON, trail
//! handling, media extraction, and the author fallback chain.

use serde_json::{Value, json};
use tantivy::schema::{Field, Value as _};

use blogmirror::docbuild::DocumentBuilder;
use blogmirror::index::PostSchema;

fn builder() -> (DocumentBuilder, PostSchema) {
    let schema = PostSchema::build();
    (DocumentBuilder::new(schema.clone()), schema)
}

fn texts(doc: &tantivy::TantivyDocument, field: Field) -> Vec<String> {
    doc.get_all(field)
        .filter_map(|v| v.as_str().map(str::to_string))
        .collect()
}

fn sample_post() -> Value {
    json!({
        "id": 712,
        "timestamp": 1700000000,
        "blog": { "name": "alice" },
        "tags": ["Cool Art", "wip"],
        "content": [
            { "type": "text", "text": "finally finished this piece" },
            {
                "type": "image",
                "media": [
                    { "media_key": "mk1", "url": "https://cdn.example/mk1.png", "type": "image/png" }
                ],
                "alt_text": "a painted landscape"
            }
        ],
        "trail": []
    })
}

#[test]
fn id_term_and_author_terms() {
    let (builder, schema) = builder();
    let built = builder.build(&sample_post()).unwrap();

    assert_eq!(built.id_term, "Q712");
    assert_eq!(texts(&built.doc, schema.author), vec!["alice"]);
    // No trail, so the post's own author is the original poster.
    assert_eq!(texts(&built.doc, schema.op), vec!["alice"]);
    assert_eq!(built.timestamp, 1_700_000_000.0);
}

#[test]
fn original_poster_comes_from_first_trail_entry() {
    let mut post = sample_post();
    post["trail"] = json!([
        {
            "blog": { "name": "origin-blog" },
            "content": [ { "type": "text", "text": "the original text" } ]
        },
        {
            "blog": { "name": "middle-blog" },
            "content": [ { "type": "text", "text": "a commentary layer" } ]
        }
    ]);

    let (builder, schema) = builder();
    let built = builder.build(&post).unwrap();

    assert_eq!(texts(&built.doc, schema.op), vec!["origin-blog"]);
    // Reblogger stays the author.
    assert_eq!(texts(&built.doc, schema.author), vec!["alice"]);
    // Trail text is indexed into the same document.
    let all_text = texts(&built.doc, schema.text).join(" ");
    assert!(all_text.contains("the original text"));
    assert!(all_text.contains("a commentary layer"));
}

#[test]
fn missing_blog_falls_back_to_broken_name_then_sentinel() {
    let mut post = sample_post();
    post.as_object_mut().unwrap().remove("blog");
    post["broken_blog_name"] = json!("deleted-blog");
    let (builder, schema) = builder();
    let built = builder.build(&post).unwrap();
    assert_eq!(texts(&built.doc, schema.author), vec!["deleted-blog"]);

    post.as_object_mut().unwrap().remove("broken_blog_name");
    let built = builder.build(&post).unwrap();
    assert_eq!(texts(&built.doc, schema.author), vec!["[unknown]"]);
}

#[test]
fn tags_are_normalized() {
    let (builder, schema) = builder();
    let built = builder.build(&sample_post()).unwrap();
    let tags = texts(&built.doc, schema.tag);
    assert_eq!(tags, vec!["cool%20art", "wip"]);
}

#[test]
fn link_blocks_index_every_domain_suffix() {
    let mut post = sample_post();
    post["content"] = json!([
        {
            "type": "link",
            "url": "https://t.umblr.com/redirect?z=https%3A%2F%2Fnews.example.com%2Fstory",
            "description": "an interesting story"
        }
    ]);
    let (builder, schema) = builder();
    let built = builder.build(&post).unwrap();

    let links = texts(&built.doc, schema.link);
    assert_eq!(links, vec!["news.example.com", "example.com", "com"]);
    assert!(texts(&built.doc, schema.text).join(" ").contains("interesting story"));
}

#[test]
fn image_blocks_emit_media_terms_and_extracted_media() {
    let mut post = sample_post();
    post["content"] = json!([
        {
            "type": "image",
            "media": [
                { "media_key": "mk1", "url": "https://cdn.example/mk1.gif", "type": "image/gif" },
                { "media_key": "mk1", "url": "https://cdn.example/mk1-small.gif", "type": "image/gif" },
                { "media_key": "mk2", "url": "https://cdn.example/mk2.png", "type": "image/png" }
            ]
        }
    ]);
    let (builder, schema) = builder();
    let built = builder.build(&post).unwrap();

    // One media term per unique key, and a gif content flag.
    assert_eq!(texts(&built.doc, schema.media), vec!["mk1", "mk2"]);
    assert_eq!(texts(&built.doc, schema.has), vec!["gif"]);
    assert_eq!(built.media.len(), 2);
    assert!(built.media.iter().all(|m| m.post_id == 712));
}

#[test]
fn poll_blocks_index_question_and_answers() {
    let mut post = sample_post();
    post["content"] = json!([
        {
            "type": "poll",
            "question": "favorite season",
            "answers": [
                { "answer_text": "winter" },
                { "answer_text": "summer" }
            ]
        }
    ]);
    let (builder, schema) = builder();
    let built = builder.build(&post).unwrap();
    let text = texts(&built.doc, schema.text).join(" ");
    assert!(text.contains("favorite season"));
    assert!(text.contains("winter"));
    assert!(text.contains("summer"));
}

#[test]
fn unknown_block_kinds_are_skipped() {
    let mut post = sample_post();
    post["content"] = json!([
        { "type": "video", "url": "https://cdn.example/v.mp4" },
        { "type": "text", "text": "still indexed" }
    ]);
    let (builder, schema) = builder();
    let built = builder.build(&post).unwrap();
    assert_eq!(texts(&built.doc, schema.text), vec!["still indexed"]);
}

#[test]
fn captions_land_in_their_own_field() {
    let (builder, schema) = builder();
    let captions = vec!["a painting of hills".to_string()];
    let built = builder
        .build_with_captions(&sample_post(), &captions)
        .unwrap();
    assert_eq!(texts(&built.doc, schema.caption), vec!["a painting of hills"]);
}

#[test]
fn payload_is_the_verbatim_post() {
    let (builder, schema) = builder();
    let post = sample_post();
    let built = builder.build(&post).unwrap();
    let payload = texts(&built.doc, schema.payload);
    let decoded: Value = serde_json::from_str(&payload[0]).unwrap();
    assert_eq!(decoded, post);
}

#[test]
fn posts_without_id_are_malformed() {
    let (builder, _) = builder();
    assert!(builder.build(&json!({ "timestamp": 1 })).is_err());
}
