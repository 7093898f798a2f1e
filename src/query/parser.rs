//! Query language parser.
//!
//! Whitespace-separated terms, implicit AND. Bare words and quoted
//! phrases are free text; `field:value` restricts to a boolean field;
//! `image:` searches merged captions; `date:START..END` is a timestamp
//! range with independently parsed bounds.

use super::errors::{QueryError, QueryResult};

/// Boolean (exact-term) fields exposed by the query language.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoolField {
    Author,
    Op,
    Tag,
    Link,
    Media,
    Has,
}

impl BoolField {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "author" => Some(BoolField::Author),
            "op" => Some(BoolField::Op),
            "tag" => Some(BoolField::Tag),
            "link" => Some(BoolField::Link),
            "media" => Some(BoolField::Media),
            "has" => Some(BoolField::Has),
            _ => None,
        }
    }
}

/// One parsed query term.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryAtom {
    /// Free-text word, analyzed like indexed post text.
    Text(String),
    /// Quoted phrase; tokens must appear adjacent and in order.
    Phrase(String),
    /// Exact match on a boolean field.
    Field { field: BoolField, value: String },
    /// Free-text match against merged image captions.
    Caption(String),
    /// Inclusive timestamp range. `None` bounds are unbounded; the raw
    /// bound text is parsed later, against a caller-supplied clock.
    DateRange {
        start: Option<String>,
        end: Option<String>,
    },
}

/// Replace spaces with underscores inside unquoted `date:` range tokens
/// (`date:2 days ago..now`) so the whitespace tokenizer cannot split a
/// bound into unrelated terms. The date parser reads underscores as
/// spaces. Range words are absorbed until the next `field:` term or
/// quoted phrase, so bare text following an unquoted spaced range is
/// read as part of the bound; quoting the bound avoids the ambiguity.
fn protect_date_ranges(input: &str) -> String {
    let mut out: Vec<String> = Vec::new();
    let mut range: Option<Vec<&str>> = None;

    for word in input.split_whitespace() {
        if let Some(words) = &mut range {
            if word.contains(':') || word.starts_with('"') {
                out.push(words.join("_"));
                range = None;
            } else {
                words.push(word);
                continue;
            }
        }
        if word.starts_with("date:") && !word.contains('"') {
            range = Some(vec![word]);
        } else {
            out.push(word.to_string());
        }
    }
    if let Some(words) = range {
        out.push(words.join("_"));
    }
    out.join(" ")
}

/// Parse one query line into atoms.
pub fn parse_query(input: &str) -> QueryResult<Vec<QueryAtom>> {
    let protected = protect_date_ranges(input);
    let mut atoms = Vec::new();
    for token in tokenize(&protected)? {
        atoms.push(atom_from_token(token)?);
    }
    Ok(atoms)
}

#[derive(Debug)]
enum Token {
    Word(String),
    Quoted(String),
}

/// Split on whitespace, keeping double-quoted spans (optionally preceded
/// by a `field:` prefix) intact.
fn tokenize(input: &str) -> QueryResult<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut saw_quotes = false;

    for ch in input.chars() {
        match ch {
            '"' => {
                in_quotes = !in_quotes;
                saw_quotes = true;
            }
            c if c.is_whitespace() && !in_quotes => {
                if !current.is_empty() {
                    tokens.push(finish_token(std::mem::take(&mut current), saw_quotes));
                    saw_quotes = false;
                }
            }
            c => current.push(c),
        }
    }
    if in_quotes {
        return Err(QueryError::Parse("unterminated quote".to_string()));
    }
    if !current.is_empty() {
        tokens.push(finish_token(current, saw_quotes));
    }
    Ok(tokens)
}

fn finish_token(text: String, quoted: bool) -> Token {
    if quoted && !text.contains(':') {
        Token::Quoted(text)
    } else {
        Token::Word(text)
    }
}

fn atom_from_token(token: Token) -> QueryResult<QueryAtom> {
    let word = match token {
        Token::Quoted(phrase) => return Ok(QueryAtom::Phrase(phrase)),
        Token::Word(word) => word,
    };

    let Some((field, value)) = word.split_once(':') else {
        return Ok(QueryAtom::Text(word));
    };

    match field {
        "date" => {
            let Some((start, end)) = value.split_once("..") else {
                return Err(QueryError::Parse(format!(
                    "malformed date range '{word}' (expected date:START..END)"
                )));
            };
            let bound = |raw: &str| {
                let raw = raw.trim_matches('"');
                (!raw.is_empty()).then(|| raw.to_string())
            };
            Ok(QueryAtom::DateRange {
                start: bound(start),
                end: bound(end),
            })
        }
        "image" => Ok(QueryAtom::Caption(value.trim_matches('"').to_string())),
        name => match BoolField::from_name(name) {
            Some(field) => Ok(QueryAtom::Field {
                field,
                value: value.trim_matches('"').to_string(),
            }),
            // Unknown prefixes read as plain text, colon and all.
            None => Ok(QueryAtom::Text(word)),
        },
    }
}
