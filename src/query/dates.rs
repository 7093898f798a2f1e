//! Human-readable date expressions for `date:` range bounds.
//!
//! Accepted forms: raw unix timestamps, `now`/`today`/`yesterday`,
//! `N <unit> ago`, calendar dates with optional time of day, and RFC 3339.
//! Underscores read as spaces, because the range pre-pass replaces spaces
//! with underscores to survive whitespace tokenization.

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, TimeZone, Utc};

use super::errors::{QueryError, QueryResult};

const CALENDAR_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"];

/// Parse one date expression relative to `now`.
pub fn parse_date_expr(raw: &str, now: DateTime<Utc>) -> QueryResult<i64> {
    let expr = raw.replace('_', " ");
    let expr = expr.trim().trim_matches('"').trim();
    if expr.is_empty() {
        return Err(QueryError::Date(raw.to_string()));
    }

    if let Ok(timestamp) = expr.parse::<i64>() {
        return Ok(timestamp);
    }

    match expr.to_ascii_lowercase().as_str() {
        "now" => return Ok(now.timestamp()),
        "today" => return Ok(midnight(now)),
        "yesterday" => return Ok(midnight(now) - 86_400),
        _ => {}
    }

    if let Some(timestamp) = parse_relative(expr, now) {
        return Ok(timestamp);
    }

    if let Ok(date) = NaiveDate::parse_from_str(expr, "%Y-%m-%d") {
        let dt = date
            .and_hms_opt(0, 0, 0)
            .ok_or_else(|| QueryError::Date(raw.to_string()))?;
        return Ok(Utc.from_utc_datetime(&dt).timestamp());
    }
    for format in CALENDAR_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(expr, format) {
            return Ok(Utc.from_utc_datetime(&dt).timestamp());
        }
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(expr) {
        return Ok(dt.timestamp());
    }

    Err(QueryError::Date(raw.to_string()))
}

/// `N <unit> ago`, with months and years as fixed-length approximations.
fn parse_relative(expr: &str, now: DateTime<Utc>) -> Option<i64> {
    let words: Vec<&str> = expr.split_whitespace().collect();
    let [count, unit, "ago"] = words.as_slice() else {
        return None;
    };
    let count: i64 = count.parse().ok()?;
    let seconds = match unit.trim_end_matches('s') {
        "second" | "sec" => 1,
        "minute" | "min" => 60,
        "hour" => 3_600,
        "day" => 86_400,
        "week" => 604_800,
        "month" => 2_592_000,
        "year" => 31_536_000,
        _ => return None,
    };
    Some(now.timestamp() - count * seconds)
}

fn midnight(now: DateTime<Utc>) -> i64 {
    let date = now.date_naive();
    let dt = NaiveDate::from_ymd_opt(date.year(), date.month(), date.day())
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or_else(|| now.naive_utc());
    Utc.from_utc_datetime(&dt).timestamp()
}
