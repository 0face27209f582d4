//! TOML frontmatter.
//!
//! A source file may start with a TOML block fenced by `+++` lines:
//!
//! ```text
//! +++
//! title = "Hello"
//! published_at = 2024-03-01T09:00:00Z
//! tags = ["rust"]
//! +++
//!
//! Markdown starts here.
//! ```
//!
//! A file that does not start with `+++` has empty frontmatter and is all
//! body. An opening fence without a closing one is a parse error.

use crate::error::BuildError;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::de::DeserializeOwned;
use std::path::Path;

const FENCE: &str = "+++";

/// Split `text` into frontmatter and body.
pub fn split<'a>(path: &Path, text: &'a str) -> Result<(&'a str, &'a str), BuildError> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let Some(rest) = strip_fence_line(text) else {
        return Ok(("", text));
    };

    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end() == FENCE {
            let front = &rest[..offset];
            let body = &rest[offset + line.len()..];
            return Ok((front, body));
        }
        offset += line.len();
    }

    Err(BuildError::parse(path, "frontmatter opened with `+++` is never closed"))
}

/// Parse the frontmatter of `text` into `T` and return it with the body.
pub fn parse<'a, T: DeserializeOwned>(path: &Path, text: &'a str) -> Result<(T, &'a str), BuildError> {
    let (front, body) = split(path, text)?;
    let meta = toml::from_str(front).map_err(|e| BuildError::parse(path, e.to_string()))?;
    Ok((meta, body))
}

/// Convert a TOML datetime into UTC.
///
/// Offset datetimes keep their instant; local datetimes and bare dates are
/// taken as UTC. A bare time has no date and is rejected.
pub fn to_utc(value: &toml::value::Datetime) -> Result<DateTime<Utc>, String> {
    let text = value.to_string();
    if let Ok(dt) = DateTime::parse_from_rfc3339(&text) {
        return Ok(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(&text, "%Y-%m-%dT%H:%M:%S%.f") {
        return Ok(naive.and_utc());
    }
    if let Ok(date) = NaiveDate::parse_from_str(&text, "%Y-%m-%d") {
        return Ok(date.and_hms_opt(0, 0, 0).unwrap_or_default().and_utc());
    }
    Err(format!("`{text}` is not a date or datetime"))
}

fn strip_fence_line(text: &str) -> Option<&str> {
    let rest = text.strip_prefix(FENCE)?;
    let rest = rest.trim_start_matches([' ', '\t']);
    if rest.is_empty() {
        return Some(rest);
    }
    rest.strip_prefix("\r\n").or_else(|| rest.strip_prefix('\n'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Default, Deserialize)]
    #[serde(default)]
    struct Meta {
        title: Option<String>,
        tags: Vec<String>,
    }

    fn p() -> &'static Path {
        Path::new("content/articles/a.md")
    }

    #[test]
    fn splits_fenced_block() {
        let (front, body) = split(p(), "+++\ntitle = \"x\"\n+++\n\nBody\n").unwrap();
        assert_eq!(front, "title = \"x\"\n");
        assert_eq!(body, "\nBody\n");
    }

    #[test]
    fn no_fence_is_all_body() {
        let (front, body) = split(p(), "Just text\n").unwrap();
        assert_eq!(front, "");
        assert_eq!(body, "Just text\n");
    }

    #[test]
    fn unclosed_fence_is_parse_error() {
        let err = split(p(), "+++\ntitle = \"x\"\nBody\n").unwrap_err();
        assert!(matches!(err, BuildError::Parse { .. }));
    }

    #[test]
    fn crlf_fences() {
        let (front, body) = split(p(), "+++\r\ntitle = \"x\"\r\n+++\r\nBody").unwrap();
        assert_eq!(front, "title = \"x\"\r\n");
        assert_eq!(body, "Body");
    }

    #[test]
    fn fence_must_be_whole_line() {
        let (front, body) = split(p(), "+++ not a fence\n").unwrap();
        assert_eq!(front, "");
        assert_eq!(body, "+++ not a fence\n");
    }

    #[test]
    fn parse_fills_struct() {
        let (meta, body): (Meta, _) =
            parse(p(), "+++\ntitle = \"Hello\"\ntags = [\"b\", \"a\"]\n+++\nText").unwrap();
        assert_eq!(meta.title.as_deref(), Some("Hello"));
        assert_eq!(meta.tags, ["b", "a"]);
        assert_eq!(body, "Text");
    }

    #[test]
    fn parse_empty_frontmatter_uses_defaults() {
        let (meta, _): (Meta, _) = parse(p(), "Text").unwrap();
        assert!(meta.title.is_none());
        assert!(meta.tags.is_empty());
    }

    #[test]
    fn parse_bad_toml_is_parse_error() {
        let err = parse::<Meta>(p(), "+++\ntitle = \n+++\n").unwrap_err();
        assert!(matches!(err, BuildError::Parse { .. }));
        assert_eq!(err.path(), p());
    }

    #[test]
    fn datetime_conversions() {
        let offset: toml::value::Datetime = "2024-03-01T09:00:00+02:00".parse().unwrap();
        assert_eq!(to_utc(&offset).unwrap().to_rfc3339(), "2024-03-01T07:00:00+00:00");

        let local: toml::value::Datetime = "2024-03-01T09:00:00".parse().unwrap();
        assert_eq!(to_utc(&local).unwrap().to_rfc3339(), "2024-03-01T09:00:00+00:00");

        let date: toml::value::Datetime = "2024-03-01".parse().unwrap();
        assert_eq!(to_utc(&date).unwrap().to_rfc3339(), "2024-03-01T00:00:00+00:00");

        let time: toml::value::Datetime = "09:00:00".parse().unwrap();
        assert!(to_utc(&time).is_err());
    }
}
