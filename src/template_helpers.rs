//! Date filters available to every template.
//!
//! | Filter | Example | Output |
//! |--------|---------|--------|
//! | `time_ago` | `{{ article.published_at \| time_ago }}` | `about 3 hours` |
//! | `time_between` | `{{ a \| time_between(until=b) }}` | `2 days` |
//! | `rfc3339_utc` | `{{ article.published_at \| rfc3339_utc }}` | `2024-03-01T09:00:00Z` |
//! | `simple_date` | `{{ article.published_at \| simple_date }}` | `March 1, 2024` |
//!
//! Formatted dates use non-breaking spaces so they never wrap mid-date.
//! Values are the RFC 3339 strings that serialized `DateTime`s become, or
//! bare `YYYY-MM-DD` dates taken as midnight UTC.

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use std::collections::HashMap;
use tera::{Tera, Value};

const MINUTES_IN_DAY: i64 = 24 * 60;
const MINUTES_IN_MONTH: i64 = 30 * MINUTES_IN_DAY;
const MINUTES_IN_YEAR: i64 = 365 * MINUTES_IN_DAY;

pub fn register(tera: &mut Tera) {
    tera.register_filter("time_ago", time_ago);
    tera.register_filter("time_between", time_between);
    tera.register_filter("rfc3339_utc", rfc3339_utc);
    tera.register_filter("simple_date", simple_date);
}

/// Rough English description of the time between two instants, in either
/// order.
pub fn distance_in_words(from: DateTime<Utc>, to: DateTime<Utc>) -> String {
    let seconds = (to - from).num_seconds().abs() as f64;
    let minutes = round(seconds / 60.0);
    let hours = seconds / 3600.0;

    match minutes {
        0 => "less than 1 minute".into(),
        1 => "1 minute".into(),
        2..=44 => format!("{minutes} minutes"),
        45..=89 => "about 1 hour".into(),
        m if m < MINUTES_IN_DAY => format!("about {} hours", round(hours)),
        m if m < 2 * MINUTES_IN_DAY => "about 1 day".into(),
        m if m < MINUTES_IN_MONTH => format!("{} days", round(hours / 24.0)),
        m if m < 2 * MINUTES_IN_MONTH => "about 1 month".into(),
        m if m < MINUTES_IN_YEAR => format!("{} months", round(hours / 24.0 / 30.0)),
        m if m < MINUTES_IN_YEAR + 3 * MINUTES_IN_MONTH => "about 1 year".into(),
        m if m < MINUTES_IN_YEAR + 9 * MINUTES_IN_MONTH => "over 1 year".into(),
        m if m < 2 * MINUTES_IN_YEAR => "almost 2 years".into(),
        _ => format!("{} years", round(hours / 24.0 / 365.0)),
    }
}

/// `t` as `2024-03-01T09:00:00Z`.
pub fn format_rfc3339_utc(t: DateTime<Utc>) -> String {
    non_breaking(&t.to_rfc3339_opts(SecondsFormat::Secs, true))
}

/// `t` as `March 1, 2024`.
pub fn format_simple_date(t: DateTime<Utc>) -> String {
    non_breaking(&t.format("%B %-d, %Y").to_string())
}

// ============================================================================
// Tera adapters
// ============================================================================

fn time_ago(value: &Value, _: &HashMap<String, Value>) -> tera::Result<Value> {
    let at = datetime_arg("time_ago", value)?;
    Ok(Value::String(distance_in_words(at, Utc::now())))
}

fn time_between(value: &Value, args: &HashMap<String, Value>) -> tera::Result<Value> {
    let from = datetime_arg("time_between", value)?;
    let until = args
        .get("until")
        .ok_or_else(|| tera::Error::msg("filter `time_between` expects an `until` argument"))?;
    let until = datetime_arg("time_between", until)?;
    Ok(Value::String(distance_in_words(from, until)))
}

fn rfc3339_utc(value: &Value, _: &HashMap<String, Value>) -> tera::Result<Value> {
    Ok(Value::String(format_rfc3339_utc(datetime_arg("rfc3339_utc", value)?)))
}

fn simple_date(value: &Value, _: &HashMap<String, Value>) -> tera::Result<Value> {
    Ok(Value::String(format_simple_date(datetime_arg("simple_date", value)?)))
}

fn datetime_arg(filter: &str, value: &Value) -> tera::Result<DateTime<Utc>> {
    let text = value
        .as_str()
        .ok_or_else(|| tera::Error::msg(format!("filter `{filter}` expects a date string, got {value}")))?;
    parse_datetime(text)
        .ok_or_else(|| tera::Error::msg(format!("filter `{filter}`: cannot parse date {text:?}")))
}

fn parse_datetime(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

fn round(f: f64) -> i64 {
    (f + 0.5).floor() as i64
}

fn non_breaking(s: &str) -> String {
    s.replace(' ', "\u{a0}")
}
