//! Compile parsed query atoms into index engine primitives and execute
//! them against a blog's read handle.

use std::ops::Bound;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tantivy::TantivyDocument;
use tantivy::collector::{Count, TopDocs};
use tantivy::query::{AllQuery, BooleanQuery, Occur, PhraseQuery, Query, RangeQuery, TermQuery};
use tantivy::schema::{Field, IndexRecordOption, Term, Value as _};
use tantivy::{DocAddress, Score, Searcher, SegmentReader};

use super::dates::parse_date_expr;
use super::errors::{QueryError, QueryResult};
use super::parser::{BoolField, QueryAtom, parse_query};
use crate::docbuild::encode_tag;
use crate::index::{BlogReader, IndexError, TEXT_ANALYZER};

/// Match ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    /// Timestamp descending, ties broken by relevance.
    #[default]
    Newest,
    /// Timestamp ascending, ties broken by relevance.
    Oldest,
    /// Engine default ranking, no timestamp tie-break.
    Relevance,
}

/// One search invocation.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub query: String,
    pub sort: SortOrder,
    pub offset: usize,
    pub limit: usize,
}

impl Default for SearchRequest {
    fn default() -> Self {
        Self {
            query: String::new(),
            sort: SortOrder::default(),
            offset: 0,
            limit: 50,
        }
    }
}

/// Match-set metadata returned alongside the payloads.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct SearchMeta {
    /// Estimated total matches across the whole index.
    pub matches: usize,
    pub offset: usize,
    pub limit: usize,
}

/// Decoded stored payloads plus match-set metadata. An empty result set
/// is a normal outcome, not an error.
#[derive(Debug, Clone)]
pub struct SearchResponse {
    pub meta: SearchMeta,
    pub posts: Vec<Value>,
}

/// Parse, compile, and execute `request` against `reader`'s snapshot.
pub fn search(reader: &BlogReader, request: &SearchRequest) -> QueryResult<SearchResponse> {
    let atoms = parse_query(&request.query)?;
    let query = compile(reader, &atoms, Utc::now())?;
    execute(reader, query.as_ref(), request)
}

/// Compile atoms into one boolean query. `now` anchors relative date
/// expressions.
pub fn compile(
    reader: &BlogReader,
    atoms: &[QueryAtom],
    now: DateTime<Utc>,
) -> QueryResult<Box<dyn Query>> {
    let schema = reader.schema();
    let mut clauses: Vec<(Occur, Box<dyn Query>)> = Vec::new();

    for atom in atoms {
        let clause: Box<dyn Query> = match atom {
            QueryAtom::Text(text) => text_query(reader, schema.text, text)?,
            QueryAtom::Phrase(phrase) => text_query(reader, schema.text, phrase)?,
            QueryAtom::Caption(text) => text_query(reader, schema.caption, text)?,
            QueryAtom::Field { field, value } => {
                let (field, value) = match field {
                    // Tags normalize exactly as at indexing time, so any
                    // case or encoding variant finds the indexed term.
                    BoolField::Tag => (schema.tag, encode_tag(value)),
                    BoolField::Author => (schema.author, value.clone()),
                    BoolField::Op => (schema.op, value.clone()),
                    BoolField::Link => (schema.link, value.clone()),
                    BoolField::Media => (schema.media, value.clone()),
                    BoolField::Has => (schema.has, value.clone()),
                };
                Box::new(TermQuery::new(
                    Term::from_field_text(field, &value),
                    IndexRecordOption::Basic,
                ))
            }
            QueryAtom::DateRange { start, end } => {
                let start = match start {
                    Some(raw) => parse_date_expr(raw, now)? as f64,
                    None => 0.0,
                };
                let end = match end {
                    Some(raw) => parse_date_expr(raw, now)? as f64,
                    None => now.timestamp() as f64,
                };
                Box::new(RangeQuery::new(
                    Bound::Included(Term::from_field_f64(schema.timestamp, start)),
                    Bound::Included(Term::from_field_f64(schema.timestamp, end)),
                ))
            }
        };
        clauses.push((Occur::Must, clause));
    }

    Ok(match clauses.len() {
        0 => Box::new(AllQuery),
        1 => clauses.pop().map(|(_, q)| q).unwrap_or(Box::new(AllQuery)),
        _ => Box::new(BooleanQuery::new(clauses)),
    })
}

/// Analyze free text with the index's own analyzer, so query terms line
/// up with indexed terms under any stemming mode. Multiple tokens form a
/// positional phrase.
fn text_query(reader: &BlogReader, field: Field, text: &str) -> QueryResult<Box<dyn Query>> {
    let mut analyzer = reader
        .index()
        .tokenizers()
        .get(TEXT_ANALYZER)
        .ok_or_else(|| QueryError::Parse("text analyzer not registered".to_string()))?;

    let mut terms = Vec::new();
    let mut stream = analyzer.token_stream(text);
    while let Some(token) = stream.next() {
        terms.push(Term::from_field_text(field, &token.text));
    }

    Ok(match terms.len() {
        0 => Box::new(AllQuery),
        1 => Box::new(TermQuery::new(
            terms.remove(0),
            IndexRecordOption::WithFreqs,
        )),
        _ => Box::new(PhraseQuery::new(terms)),
    })
}

fn execute(
    reader: &BlogReader,
    query: &dyn Query,
    request: &SearchRequest,
) -> QueryResult<SearchResponse> {
    let searcher = reader.searcher();

    // A zero limit is a pure count request; TopDocs requires limit >= 1.
    if request.limit == 0 {
        let count = searcher.search(query, &Count).map_err(IndexError::from)?;
        return collect(&searcher, reader.schema().payload, count, Vec::new(), request);
    }

    let (count, addresses) = match request.sort {
        SortOrder::Relevance => {
            let top = TopDocs::with_limit(request.limit).and_offset(request.offset);
            let (count, hits) = searcher
                .search(query, &(Count, top))
                .map_err(IndexError::from)?;
            (count, hits.into_iter().map(|(_, a)| a).collect())
        }
        SortOrder::Newest => timestamp_sorted(&searcher, query, request, true)?,
        SortOrder::Oldest => timestamp_sorted(&searcher, query, request, false)?,
    };
    collect(&searcher, reader.schema().payload, count, addresses, request)
}

/// Timestamp ordering over the `timestamp` fast column; the query's
/// relevance score breaks ties between equal timestamps. Timestamps stay
/// f64 end to end; a float downcast would collapse close values.
fn timestamp_sorted(
    searcher: &Searcher,
    query: &dyn Query,
    request: &SearchRequest,
    newest: bool,
) -> QueryResult<(usize, Vec<DocAddress>)> {
    let top = TopDocs::with_limit(request.limit)
        .and_offset(request.offset)
        .tweak_score(move |segment_reader: &SegmentReader| {
            let col: Option<tantivy::columnar::Column<f64>> = segment_reader
                .fast_fields()
                .column_opt("timestamp")
                .ok()
                .flatten();
            move |doc_id: tantivy::DocId, relevance: Score| {
                let missing = if newest { f64::MIN } else { f64::MAX };
                let value = col
                    .as_ref()
                    .and_then(|c| c.first(doc_id))
                    .unwrap_or(missing);
                (if newest { value } else { -value }, relevance)
            }
        });

    let (count, hits) = searcher
        .search(query, &(Count, top))
        .map_err(IndexError::from)?;
    Ok((count, hits.into_iter().map(|(_, a)| a).collect()))
}

fn collect(
    searcher: &Searcher,
    payload_field: Field,
    count: usize,
    addresses: Vec<DocAddress>,
    request: &SearchRequest,
) -> QueryResult<SearchResponse> {
    let mut posts = Vec::new();
    for address in addresses {
        let doc: TantivyDocument = searcher.doc(address).map_err(IndexError::from)?;
        let Some(payload) = doc.get_first(payload_field).and_then(|v| v.as_str()) else {
            continue;
        };
        let value: Value = serde_json::from_str(payload).map_err(IndexError::Payload)?;
        posts.push(value);
    }

    Ok(SearchResponse {
        meta: SearchMeta {
            matches: count,
            offset: request.offset,
            limit: request.limit,
        },
        posts,
    })
}
